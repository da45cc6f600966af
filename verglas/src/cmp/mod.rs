//! CMP threshold ECDSA signing
//!
//! Five rounds produce an ECDSA signature `(r, s)` under the group public key
//! without ever assembling the signing key in one place:
//!
//! 1. every signer samples a nonce share `k_i` and a mask `γ_i`, broadcasts
//!    their Paillier encryptions `K_i`, `G_i` and proves to every peer that
//!    `K_i` encrypts a value in the admissible range;
//! 2. every pair of signers runs two multiplicative-to-additive (MtA)
//!    conversions — one for `γ_i·k_j`, one for `x_i·k_j` — exchanging
//!    Paillier-affine ciphertexts with `aff-g` proofs, plus a `log*` proof
//!    binding `Γ_i` to `G_i`; an echo hash guards broadcast consistency;
//! 3. every signer decrypts its additive shares and broadcasts
//!    `(δ_i, Δ_i = k_i·Γ)` with a `log*` proof;
//! 4. the signers check `δ·G = ΣΔ_j`, derive the nonce point `R` and
//!    broadcast their signature shares `σ_i = k_i·m + r·χ_i`;
//! 5. the shares are summed and the signature is verified.
//!
//! A failed consistency gate (step 4 or 5) transitions into an identifiable
//! abort round: every signer reveals its MtA transcript, the equations are
//! replayed, and the session terminates naming the inconsistent parties.

mod abort;
mod config;
mod mta;
mod round1;
mod round2;
mod round3;
mod round4;
mod round5;
mod zk;

use std::collections::BTreeMap;
use std::fmt;

use digest::Digest;
use generic_ec::{
    coords::AlwaysHasAffineX, hash_to_curve::FromHash, Curve, NonZero, Point, Scalar, SecretScalar,
};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext, DecryptionKey, EncryptionKey};
use paillier_zk::{
    group_element_vs_paillier_encryption_in_range as pi_log,
    paillier_affine_operation_in_range as pi_aff, paillier_encryption_in_range as pi_enc, Aux,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::helper::{Helper, Info};
use crate::party::PartyId;
use crate::round::{Delivery, Round, RoundMsg, RoundNumber, StartError};
use crate::utils::lagrange_at_zero;

pub use config::{KeyConfig, PartyPublic};

use round1::Round1;
use zk::ZkParams;

/// Protocol identifier of CMP threshold signing
pub const PROTOCOL_ID: &str = "cmp/sign";

const FINAL_ROUND: RoundNumber = 5;

/// A prehashed message to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataToSign([u8; 32]);

impl DataToSign {
    /// Hashes `data` with algorithm `D`
    pub fn digest<D>(data: &[u8]) -> Self
    where
        D: Digest<OutputSize = digest::typenum::U32>,
    {
        Self(D::digest(data).into())
    }

    /// Wraps an already-finalized digest
    pub fn from_digest<D>(hash: D) -> Self
    where
        D: Digest<OutputSize = digest::typenum::U32>,
    {
        Self(hash.finalize().into())
    }

    /// Wraps a 32-byte hash of the message
    ///
    /// `hash` must be the output of a cryptographic hash function.
    pub fn from_slice(hash: &[u8]) -> Result<Self, InvalidDataToSign> {
        hash.try_into().map(Self).or(Err(InvalidDataToSign))
    }

    /// Byte representation
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn to_scalar<E: Curve>(&self) -> Scalar<E> {
        Scalar::from_be_bytes_mod_order(self.0)
    }
}

/// Message to sign is not a 32-byte hash
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("message to sign is not valid")]
pub struct InvalidDataToSign;

/// ECDSA signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Signature<E: Curve> {
    /// `r` component
    pub r: NonZero<Scalar<E>>,
    /// `s` component
    pub s: NonZero<Scalar<E>>,
}

impl<E: Curve> Signature<E>
where
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    /// Verifies the signature against a public key and a message
    pub fn verify(&self, public_key: &Point<E>, data: &DataToSign) -> Result<(), InvalidSignature> {
        let r = (Point::generator() * data.to_scalar::<E>() + public_key * self.r)
            * self.s.invert();
        let r = NonZero::from_point(r).ok_or(InvalidSignature)?;

        if *self.r == r.x().to_scalar() {
            Ok(())
        } else {
            Err(InvalidSignature)
        }
    }
}

impl<E: Curve> Signature<E> {
    /// Given that `(r, s)` is a valid signature, `(r, -s)` is valid as well.
    /// Some applications (like Bitcoin) remove the ambiguity by requiring `s`
    /// to be in the lower half; this method picks that representative.
    pub fn normalize_s(self) -> Self {
        let neg_s = -self.s;
        if neg_s < self.s {
            Signature { s: neg_s, ..self }
        } else {
            self
        }
    }

    /// Writes the serialized signature (`r ∥ s`, big-endian) to `out`
    ///
    /// `out` must be at least [`Signature::serialized_len`] bytes, otherwise
    /// the content of the buffer is unspecified.
    pub fn write_to_slice(&self, out: &mut [u8]) {
        if out.len() < Self::serialized_len() {
            return;
        }
        let scalar_size = Scalar::<E>::serialized_len();
        out[0..scalar_size].copy_from_slice(&self.r.to_be_bytes());
        out[scalar_size..2 * scalar_size].copy_from_slice(&self.s.to_be_bytes());
    }

    /// Reads a signature (`r ∥ s`, big-endian) back from a bytes buffer
    ///
    /// Returns `None` if the buffer is too short or does not contain two
    /// non-zero scalars.
    pub fn read_from_slice(bytes: &[u8]) -> Option<Self> {
        let scalar_size = Scalar::<E>::serialized_len();
        if bytes.len() < Self::serialized_len() {
            return None;
        }
        let r = Scalar::from_be_bytes(&bytes[0..scalar_size]).ok()?;
        let s = Scalar::from_be_bytes(&bytes[scalar_size..2 * scalar_size]).ok()?;
        Option::zip(NonZero::from_scalar(r), NonZero::from_scalar(s))
            .map(|(r, s)| Signature { r, s })
    }

    /// Size of the serialized signature in bytes
    pub fn serialized_len() -> usize {
        2 * Scalar::<E>::serialized_len()
    }
}

/// Signature verification failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSignature;

impl fmt::Display for InvalidSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid signature")
    }
}

impl std::error::Error for InvalidSignature {}

/// Message of the CMP signing protocol
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
#[allow(clippy::large_enum_variant)]
pub enum Msg<E: Curve> {
    /// Nonce and mask ciphertexts, consumed by round 2
    Round2Bcast(MsgRound2Bcast),
    /// Range proof for `K_i`, consumed by round 2
    Round2Direct(MsgRound2Direct),
    /// Echo hash over round-2 broadcasts, consumed by round 3
    Round3Bcast(MsgRound3Bcast),
    /// MtA ciphertexts and proofs, consumed by round 3
    Round3Direct(MsgRound3Direct<E>),
    /// Delta share, consumed by round 4
    Round4Bcast(MsgRound4Bcast<E>),
    /// `log*` proof for `Δ_i`, consumed by round 4
    Round4Direct(MsgRound4Direct<E>),
    /// Signature share, consumed by round 5
    Round5Bcast(MsgRound5Bcast<E>),
    /// Delta-path abort reveal
    AbortDelta(MsgAbortDelta<E>),
    /// Sigma-path abort reveal
    AbortSigma(MsgAbortSigma<E>),
}

impl<E: Curve> RoundMsg for Msg<E> {
    fn round(&self) -> RoundNumber {
        match self {
            Msg::Round2Bcast(_) | Msg::Round2Direct(_) => 2,
            Msg::Round3Bcast(_) | Msg::Round3Direct(_) => 3,
            Msg::Round4Bcast(_) | Msg::Round4Direct(_) => 4,
            Msg::Round5Bcast(_) => 5,
            Msg::AbortDelta(_) => 6,
            Msg::AbortSigma(_) => 7,
        }
    }

    fn kind(&self) -> Delivery {
        match self {
            Msg::Round2Bcast(_)
            | Msg::Round3Bcast(_)
            | Msg::Round4Bcast(_)
            | Msg::Round5Bcast(_)
            | Msg::AbortDelta(_)
            | Msg::AbortSigma(_) => Delivery::Broadcast,
            Msg::Round2Direct(_) | Msg::Round3Direct(_) | Msg::Round4Direct(_) => Delivery::Direct,
        }
    }
}

/// `K_i = Enc_i(k_i)` and `G_i = Enc_i(γ_i)`
#[derive(Clone, Serialize, Deserialize)]
pub struct MsgRound2Bcast {
    /// Encrypted nonce share
    pub K: Ciphertext,
    /// Encrypted mask share
    pub G: Ciphertext,
}

/// Range proof that `K_i` encrypts an admissible value, bound to the
/// recipient's Pedersen parameters
#[derive(Clone, Serialize, Deserialize)]
pub struct MsgRound2Direct {
    /// `ψ⁰` proof
    pub psi0: (pi_enc::Commitment, pi_enc::Proof),
}

/// Echo hash binding the round-2 broadcasts every party observed
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct MsgRound3Bcast {
    /// Transcript hash after absorbing all round-2 broadcasts
    pub echo: [u8; 32],
}

/// MtA ciphertexts and their proofs for one recipient
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgRound3Direct<E: Curve> {
    /// `Γ_i = γ_i·G`
    pub Gamma: Point<E>,
    /// Delta-MtA ciphertext `D_{i,j}`
    pub D: Ciphertext,
    /// Delta-MtA ciphertext `F_{i,j}`
    pub F: Ciphertext,
    /// Chi-MtA ciphertext `D̂_{i,j}`
    pub hat_D: Ciphertext,
    /// Chi-MtA ciphertext `F̂_{i,j}`
    pub hat_F: Ciphertext,
    /// `aff-g` proof for the delta MtA
    pub psi: (pi_aff::Commitment<E>, pi_aff::Proof),
    /// `aff-g` proof for the chi MtA
    pub hat_psi: (pi_aff::Commitment<E>, pi_aff::Proof),
    /// `log*` proof binding `Γ_i` to `G_i`
    pub psi_prime: (pi_log::Commitment<E>, pi_log::Proof),
}

/// Delta share and the auxiliary group element
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgRound4Bcast<E: Curve> {
    /// `δ_i`
    pub delta: Scalar<E>,
    /// `Δ_i = k_i·Γ`
    pub Delta: Point<E>,
}

/// `log*` proof that `Δ_i = k_i·Γ` under `K_i`
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgRound4Direct<E: Curve> {
    /// `ψ″` proof
    pub psi_prime_prime: (pi_log::Commitment<E>, pi_log::Proof),
}

/// Signature share
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgRound5Bcast<E: Curve> {
    /// `σ_i = k_i·m + r·χ_i`
    pub sigma: Scalar<E>,
}

/// One MtA instance as its sender reveals it during an abort
#[derive(Clone, Serialize, Deserialize)]
pub struct MtaReveal {
    /// Additive share `β`
    pub beta: BigNumber,
    /// Paillier nonce of the `D` ciphertext
    pub s: BigNumber,
    /// Paillier nonce of the `F` ciphertext
    pub r: BigNumber,
    /// `D` as it was sent
    pub D: Ciphertext,
    /// `F` as it was sent
    pub F: Ciphertext,
}

/// Reveal broadcast after the `δ·G ≠ ΣΔ` gate failed
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgAbortDelta<E: Curve> {
    /// Nonce share `k_i`
    pub k: Scalar<E>,
    /// Paillier nonce of `K_i`
    pub rho: BigNumber,
    /// Mask share `γ_i`
    pub gamma: Scalar<E>,
    /// Paillier nonce of `G_i`
    pub nu: BigNumber,
    /// Delta-MtA transcript per recipient
    pub deltas: BTreeMap<PartyId, MtaReveal>,
    /// Decrypted `α` values per sender
    pub alphas: BTreeMap<PartyId, Scalar<E>>,
}

/// Reveal broadcast after the signature failed to verify
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgAbortSigma<E: Curve> {
    /// Nonce share `k_i`
    pub k: Scalar<E>,
    /// Paillier nonce of `K_i`
    pub rho: BigNumber,
    /// Chi share `χ_i`
    pub chi: Scalar<E>,
    /// Chi-MtA transcript per recipient
    pub hats: BTreeMap<PartyId, MtaReveal>,
}

/// Per-party Paillier and Pedersen material used by the zero-knowledge layer
pub(crate) struct PartyZk {
    pub enc: EncryptionKey,
    pub s: BigNumber,
    pub t: BigNumber,
}

impl PartyZk {
    pub fn aux(&self) -> Aux {
        Aux {
            s: self.s.clone(),
            t: self.t.clone(),
            rsa_modulo: self.enc.n().clone(),
        }
    }
}

/// Immutable session data threaded through every round
pub(crate) struct Context<E: Curve> {
    pub helper: Helper,
    pub data: DataToSign,
    pub Y: Point<E>,
    /// Lagrange-weighted secret share
    pub x_i: SecretScalar<E>,
    /// Lagrange-weighted public shares; sums to `Y`
    pub X: BTreeMap<PartyId, Point<E>>,
    pub dec: DecryptionKey,
    pub enc_i: EncryptionKey,
    /// Own Pedersen parameters; peers bind their proofs to these
    pub aux_i: Aux,
    pub parties: BTreeMap<PartyId, PartyZk>,
    pub params: ZkParams,
}

impl<E: Curve> Context<E> {
    pub fn m(&self) -> Scalar<E> {
        self.data.to_scalar()
    }

    /// Fiat-Shamir shared state for proofs authored by `id`
    pub fn digest_for(&self, id: &PartyId) -> Sha256 {
        self.helper.hash_for_id(id).into_digest()
    }
}

/// Starts CMP signing of `data` over the signers in `signers`
///
/// `signers` must contain at least `threshold + 1` parties, all of them known
/// to the key config, including the local party. The signature is produced
/// with low-S normalization.
pub fn sign<'a, E>(
    key: &'a KeyConfig<E>,
    signers: &'a [PartyId],
    data: DataToSign,
) -> impl FnOnce() -> Result<(Box<dyn Round<Msg = Msg<E>, Output = Signature<E>>>, Info), StartError> + 'a
where
    E: Curve,
    Scalar<E>: FromHash,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    move || {
        let required = usize::from(key.threshold) + 1;
        if signers.len() < required {
            return Err(StartError::InsufficientSigners {
                n: signers.len(),
                required,
            });
        }
        let roster = crate::party::Roster::new(signers)?;

        // Convert the polynomial shares of the signer set into additive ones
        let xs = roster.scalars::<E>();
        let mut X = BTreeMap::new();
        let mut parties = BTreeMap::new();
        for id in roster.iter() {
            let public = key
                .parties
                .get(id)
                .ok_or(StartError::InvalidKeyConfig("signer has no key material"))?;
            let lambda = lagrange_at_zero(&xs, &id.to_scalar())
                .ok_or(StartError::InvalidKeyConfig("signer set admits no interpolation"))?;
            X.insert(id.clone(), public.ecdsa * lambda);
            parties.insert(
                id.clone(),
                PartyZk {
                    enc: public.paillier.clone(),
                    s: public.pedersen_s.clone(),
                    t: public.pedersen_t.clone(),
                },
            );
        }
        debug_assert_eq!(
            X.values().copied().sum::<Point<E>>(),
            key.public_key,
            "weighted shares must sum to the group key"
        );

        let lambda_i = lagrange_at_zero(&xs, &key.self_id.to_scalar())
            .ok_or(StartError::InvalidKeyConfig("signer set admits no interpolation"))?;
        let x_i = SecretScalar::new(&mut (lambda_i * &key.ecdsa));

        let dec = DecryptionKey::with_primes(&key.paillier_p, &key.paillier_q)
            .ok_or(StartError::InvalidKeyConfig("invalid paillier primes"))?;
        let enc_i = EncryptionKey::from(&dec);
        let own = parties
            .get(&key.self_id)
            .ok_or(StartError::SelfNotInRoster)?;
        if own.enc.n() != enc_i.n() {
            return Err(StartError::InvalidKeyConfig(
                "paillier primes do not match the published modulus",
            ));
        }
        let aux_i = own.aux();

        let mut helper = Helper::new(
            PROTOCOL_ID,
            E::CURVE_NAME,
            FINAL_ROUND,
            key.threshold,
            key.self_id.clone(),
            roster,
            key.config_hash(),
            None,
        )?;
        helper.transcript_mut().write("message", data.as_bytes());
        let info = helper.info();

        let round1 = Round1::new(Context {
            helper,
            data,
            Y: key.public_key,
            x_i,
            X,
            dec,
            enc_i,
            aux_i,
            parties,
            params: ZkParams::new::<E>(),
        });
        Ok((Box::new(round1), info))
    }
}
