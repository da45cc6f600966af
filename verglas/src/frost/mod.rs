//! FROST threshold Schnorr signing
//!
//! Three rounds produce a Schnorr signature under the group public key:
//!
//! 1. every signer broadcasts commitments to two fresh nonces;
//! 2. after collecting all commitments, every signer derives per-signer
//!    binding factors, the group commitment `R` and the challenge, and
//!    broadcasts its signature share;
//! 3. every share is verified individually (a bad share aborts the session
//!    naming its sender) and the shares are summed into the signature.
//!
//! [`sign`] produces a plain Schnorr signature; [`sign_taproot`] produces a
//! BIP-340 compatible signature over secp256k1, normalizing the parity of both
//! the nonce point and the group key.

mod round1;
mod round2;
mod round3;
mod taproot;

use std::collections::BTreeMap;
use std::fmt;

use generic_ec::{curves::Secp256k1, Curve, Point, Scalar, SecretScalar};
use serde::{Deserialize, Serialize};

use crate::helper::{Helper, Info};
use crate::party::{PartyId, Roster};
use crate::round::{Delivery, Round, RoundMsg, RoundNumber, StartError};
use crate::transcript::Transcript;
use crate::utils::lagrange_at_zero;

use round1::Round1;

/// Protocol identifier of FROST threshold signing
pub const PROTOCOL_ID: &str = "frost/sign-threshold";

const FINAL_ROUND: RoundNumber = 3;

/// Key material of one FROST signer
///
/// Produced by an external DKG (or a trusted dealer in tests); this crate only
/// consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct KeyResult<E: Curve> {
    /// Threshold `t`; any `t + 1` signers can sign
    pub threshold: u16,
    /// The local party
    pub self_id: PartyId,
    /// Secret share of the group key
    pub private_share: SecretScalar<E>,
    /// Group public key
    pub public_key: Point<E>,
    /// Public verification share of every party
    pub verification_shares: BTreeMap<PartyId, Point<E>>,
}

/// Key material of one FROST signer for Taproot signing
///
/// The group key is carried in BIP-340 x-only form; the start function lifts
/// it to the even-Y point and fails if the lift does not match the shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaprootKeyResult {
    /// Threshold `t`; any `t + 1` signers can sign
    pub threshold: u16,
    /// The local party
    pub self_id: PartyId,
    /// Secret share of the group key
    pub private_share: SecretScalar<Secp256k1>,
    /// X-only group public key
    pub public_key: [u8; 32],
    /// Public verification share of every party
    pub verification_shares: BTreeMap<PartyId, Point<Secp256k1>>,
}

/// Message of the FROST signing protocol
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Msg<E: Curve> {
    /// Nonce commitments, consumed by round 2
    Round2(MsgRound2<E>),
    /// Signature share, consumed by round 3
    Round3(MsgRound3<E>),
}

impl<E: Curve> RoundMsg for Msg<E> {
    fn round(&self) -> RoundNumber {
        match self {
            Msg::Round2(_) => 2,
            Msg::Round3(_) => 3,
        }
    }

    fn kind(&self) -> Delivery {
        Delivery::Broadcast
    }
}

/// Commitments to the two nonces of one signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgRound2<E: Curve> {
    /// `D_i = d_i·G`
    pub hiding_comm: Point<E>,
    /// `E_i = e_i·G`
    pub binding_comm: Point<E>,
}

/// Signature share of one signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MsgRound3<E: Curve> {
    /// `z_i`
    pub sig_share: Scalar<E>,
}

/// Schnorr signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Signature<E: Curve> {
    /// Group commitment `R`
    pub r: Point<E>,
    /// Response `z`
    pub z: Scalar<E>,
}

impl<E: Curve> Signature<E> {
    /// Verifies the signature against a public key and a message
    pub fn verify(&self, public_key: &Point<E>, msg: &[u8]) -> Result<(), InvalidSignature> {
        let c = challenge(&self.r, public_key, msg);
        if Point::generator() * self.z == self.r + public_key * c {
            Ok(())
        } else {
            Err(InvalidSignature)
        }
    }
}

impl Signature<Secp256k1> {
    /// Serializes the signature in BIP-340 form: `xonly(R) ∥ z`
    pub fn to_taproot_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&taproot::xonly(&self.r));
        out[32..].copy_from_slice(self.z.to_be_bytes().as_ref());
        out
    }

    /// Verifies the signature as a BIP-340 signature against an x-only key
    pub fn verify_taproot(&self, public_key: &[u8; 32], msg: &[u8]) -> Result<(), InvalidSignature> {
        let pk = taproot::lift_x(public_key).ok_or(InvalidSignature)?;
        if !taproot::has_even_y(&self.r) {
            return Err(InvalidSignature);
        }
        let c = taproot::challenge(&self.r, &pk, msg);
        if Point::generator() * self.z == self.r + pk * c {
            Ok(())
        } else {
            Err(InvalidSignature)
        }
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

/// Schnorr challenge `c = H(R, Y, m)`
///
/// Deliberately not bound to the session id: the signature must stay
/// verifiable by parties that know nothing about the session. Session binding
/// is carried by the binding factors instead.
fn challenge<E: Curve>(r: &Point<E>, public_key: &Point<E>, msg: &[u8]) -> Scalar<E> {
    let mut t = Transcript::tagged("verglas/schnorr-challenge");
    t.write_point("R", r);
    t.write_point("Y", public_key);
    t.write("message", msg);
    t.challenge("schnorr")
}

/// Per-round state shared through the whole signing session
pub(crate) struct SignCtx<E: Curve> {
    pub helper: Helper,
    pub taproot: bool,
    pub msg: Vec<u8>,
    /// Effective group key: `Y` for plain signing, the even-Y lift for taproot
    pub group_key: Point<E>,
    /// `±λ_j·Y_j` per signer; sums to `group_key`
    pub eff_shares: BTreeMap<PartyId, Point<E>>,
    /// `±λ_i·s_i`
    pub eff_secret: SecretScalar<E>,
}

/// Starts plain FROST signing over the signers in `signers`
///
/// `msg_hash` is the (pre-hashed) message to sign. Fails if the signer list is
/// smaller than `threshold + 1`, contains duplicates, or misses the local
/// party or a verification share.
pub fn sign<'a, E: Curve>(
    key: &'a KeyResult<E>,
    signers: &'a [PartyId],
    msg_hash: &'a [u8],
) -> impl FnOnce() -> Result<(Box<dyn Round<Msg = Msg<E>, Output = Signature<E>>>, Info), StartError> + 'a
{
    move || {
        start_common(
            key.threshold,
            key.self_id.clone(),
            &key.private_share,
            key.public_key,
            &key.verification_shares,
            signers,
            msg_hash,
            false,
            false,
        )
    }
}

/// Starts Taproot / BIP-340 FROST signing over the signers in `signers`
///
/// Like [`sign`], but the resulting signature is valid under the x-only group
/// key per BIP-340. Additionally fails when the x-only key has no lift
/// consistent with the verification shares.
pub fn sign_taproot<'a>(
    key: &'a TaprootKeyResult,
    signers: &'a [PartyId],
    msg_hash: &'a [u8],
) -> impl FnOnce() -> Result<
    (
        Box<dyn Round<Msg = Msg<Secp256k1>, Output = Signature<Secp256k1>>>,
        Info,
    ),
    StartError,
> + 'a {
    move || {
        let lifted = taproot::lift_x(&key.public_key).ok_or(StartError::InvalidTaprootKey)?;

        // The x-only encoding loses the parity of the key the shares actually
        // interpolate to. Recover it from the verification shares.
        let roster = Roster::new(signers)?;
        let xs = roster.scalars::<Secp256k1>();
        let mut implied = Point::zero();
        for id in roster.iter() {
            let share = key
                .verification_shares
                .get(id)
                .ok_or_else(|| StartError::MissingVerificationShare(id.clone()))?;
            let lambda = lagrange_at_zero(&xs, &id.to_scalar())
                .ok_or(StartError::InvalidKeyConfig("signer set admits no interpolation"))?;
            implied = implied + share * lambda;
        }
        let negate_shares = if implied == lifted {
            false
        } else if implied == -lifted {
            true
        } else {
            return Err(StartError::InvalidTaprootKey);
        };

        start_common(
            key.threshold,
            key.self_id.clone(),
            &key.private_share,
            lifted,
            &key.verification_shares,
            signers,
            msg_hash,
            true,
            negate_shares,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn start_common<E: Curve>(
    threshold: u16,
    self_id: PartyId,
    private_share: &SecretScalar<E>,
    public_key: Point<E>,
    verification_shares: &BTreeMap<PartyId, Point<E>>,
    signers: &[PartyId],
    msg_hash: &[u8],
    taproot: bool,
    negate_shares: bool,
) -> Result<(Box<dyn Round<Msg = Msg<E>, Output = Signature<E>>>, Info), StartError> {
    let roster = Roster::new(signers)?;
    let required = usize::from(threshold) + 1;
    if roster.len() < required {
        return Err(StartError::InsufficientSigners {
            n: roster.len(),
            required,
        });
    }

    let mut config = Transcript::tagged("frost/config");
    config.write("threshold", &threshold.to_be_bytes());
    config.write_point("public key", &public_key);
    for id in roster.iter() {
        let share = verification_shares
            .get(id)
            .ok_or_else(|| StartError::MissingVerificationShare(id.clone()))?;
        config.write("signer", id.as_bytes());
        config.write_point("verification share", share);
    }

    let sign = if negate_shares {
        -Scalar::<E>::one()
    } else {
        Scalar::one()
    };
    let xs = roster.scalars::<E>();
    let mut eff_shares = BTreeMap::new();
    for id in roster.iter() {
        let lambda = lagrange_at_zero(&xs, &id.to_scalar())
            .ok_or(StartError::InvalidKeyConfig("signer set admits no interpolation"))?;
        // share presence was checked above
        let share = verification_shares
            .get(id)
            .ok_or_else(|| StartError::MissingVerificationShare(id.clone()))?;
        eff_shares.insert(id.clone(), share * (lambda * sign));
    }
    debug_assert_eq!(
        eff_shares.values().copied().sum::<Point<E>>(),
        public_key,
        "verification shares must interpolate to the group key"
    );

    let lambda_i = lagrange_at_zero(&xs, &self_id.to_scalar())
        .ok_or(StartError::InvalidKeyConfig("signer set admits no interpolation"))?;
    let eff_secret = SecretScalar::new(&mut ((lambda_i * sign) * private_share));

    let tag: Option<(&'static str, &[u8])> = taproot.then_some(("Taproot Flag", &[1u8][..]));
    let mut helper = Helper::new(
        PROTOCOL_ID,
        E::CURVE_NAME,
        FINAL_ROUND,
        threshold,
        self_id,
        roster,
        config.sum(),
        tag,
    )?;
    helper.transcript_mut().write("message", msg_hash);
    let info = helper.info();

    let round1 = Round1::new(SignCtx {
        helper,
        taproot,
        msg: msg_hash.to_vec(),
        group_key: public_key,
        eff_shares,
        eff_secret,
    });
    Ok((Box::new(round1), info))
}
