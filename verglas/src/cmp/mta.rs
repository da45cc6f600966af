//! Multiplicative-to-additive share conversion
//!
//! One MtA instance turns the product `secret·k_j` into additive shares: the
//! sender keeps `β` and the recipient decrypts `α = secret·k_j − β` from the
//! `D` ciphertext. The accompanying `aff-g` proof binds `D`, `F` and the
//! public point of `secret` together, so the recipient never learns `secret`
//! and the sender cannot shift the product undetected.

use generic_ec::{hash_to_curve::FromHash, Curve, Point, Scalar};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext, EncryptionKey};
use paillier_zk::{
    paillier_affine_operation_in_range as pi_aff, Aux, BigNumberExt, SafePaillierEncryptionExt,
};
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;

use crate::round::Bug;

use super::zk::ELL_PRIME;

/// Sender's output of one MtA instance
pub(super) struct MtaOutput<E: Curve> {
    /// Additive share `β`
    pub beta: BigNumber,
    /// `D = (secret ⊙ K_j) ⊕ Enc_j(−β; s)`
    pub D: Ciphertext,
    /// `F = Enc_i(−β; r)`
    pub F: Ciphertext,
    /// Paillier nonce of `D`
    pub s: BigNumber,
    /// Paillier nonce of `F`
    pub r: BigNumber,
    /// `aff-g` proof bound to the recipient's Pedersen parameters
    pub proof: (pi_aff::Commitment<E>, pi_aff::Proof),
}

#[allow(clippy::too_many_arguments)]
pub(super) fn prove_affine<E: Curve, R: RngCore + CryptoRng>(
    rng: &mut R,
    shared_state: Sha256,
    secret: &BigNumber,
    secret_point: Point<E>,
    K_j: &Ciphertext,
    enc_i: &EncryptionKey,
    enc_j: &EncryptionKey,
    aux_j: &Aux,
    params: &pi_aff::SecurityParams,
) -> Result<MtaOutput<E>, Bug>
where
    Scalar<E>: FromHash,
{
    let range = BigNumber::one() << ELL_PRIME;
    let beta = BigNumber::from_rng_pm(&range, rng);
    // nonces must be fresh per ciphertext; reuse breaks both correctness and
    // privacy of the conversion
    let r = BigNumber::from_rng(enc_i.n(), rng);
    let s = BigNumber::from_rng(enc_j.n(), rng);

    let D = {
        let secret_times_K = enc_j.omul(secret, K_j).map_err(|_| Bug::PaillierOp)?;
        let neg_beta = enc_j
            .encrypt_with(&-&beta, &s)
            .map_err(|_| Bug::PaillierEncrypt)?;
        enc_j
            .oadd(&secret_times_K, &neg_beta)
            .map_err(|_| Bug::PaillierOp)?
    };
    let F = enc_i
        .encrypt_with(&-&beta, &r)
        .map_err(|_| Bug::PaillierEncrypt)?;

    let proof = pi_aff::non_interactive::prove(
        shared_state,
        aux_j,
        &pi_aff::Data {
            key0: enc_j.clone(),
            key1: enc_i.clone(),
            c: K_j.clone(),
            d: D.clone(),
            y: F.clone(),
            x: secret_point,
        },
        &pi_aff::PrivateData {
            x: secret.clone(),
            y: -&beta,
            nonce: s.clone(),
            nonce_y: r.clone(),
        },
        params,
        &mut *rng,
    )
    .map_err(|_| Bug::Prove("aff-g"))?;

    Ok(MtaOutput {
        beta,
        D,
        F,
        s,
        r,
        proof,
    })
}
