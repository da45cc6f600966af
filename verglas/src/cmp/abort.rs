//! Identifiable abort
//!
//! Entered when one of the two consistency gates fails: `δ·G ≠ ΣΔ_j` after
//! round 4, or an invalid signature after round 5. Every party broadcasts the
//! secrets of the failed computation — nonce shares, Paillier randomness and
//! MtA transcripts — and every party replays the equations against the
//! ciphertexts exchanged earlier. Parties whose claims do not replay are the
//! culprits. The subprotocol is terminal: it burns the revealed nonces (and,
//! on the sigma path, the key) and never outputs a signature.

use std::collections::{BTreeMap, BTreeSet};

use generic_ec::{
    coords::AlwaysHasAffineX, Curve, NonZero, Point, Scalar,
};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext, EncryptionKey};
use paillier_zk::{BigNumberExt, SafePaillierEncryptionExt};
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::round::{
    Abort, AbortReason, Expects, InternalError, Message, MessageError, Outbox, Round, RoundNumber,
    Session, Transition,
};

use super::zk::scalar_to_bignumber;
use super::{Context, Msg, MsgAbortDelta, MsgAbortSigma, Signature};

/// `Enc(plaintext; nonce) == expected`, tolerating encryption failures
fn replays_to(
    enc: &EncryptionKey,
    plaintext: &BigNumber,
    nonce: &BigNumber,
    expected: &Ciphertext,
) -> bool {
    matches!(enc.encrypt_with(plaintext, nonce), Ok(ct) if ct == *expected)
}

/// Delta-path abort: replays the delta MtA instances and recomputes every
/// party's `δ_j` from the revealed values
pub(super) struct AbortDelta<E: Curve> {
    ctx: Context<E>,
    K: BTreeMap<PartyId, Ciphertext>,
    G: BTreeMap<PartyId, Ciphertext>,
    Gamma: BTreeMap<PartyId, Point<E>>,
    /// `δ_j` as each party claimed it in round 4
    claimed: BTreeMap<PartyId, Scalar<E>>,
    /// `(D, F)` delta ciphertexts addressed to us, by sender
    received: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    reveals: BTreeMap<PartyId, MsgAbortDelta<E>>,
}

impl<E: Curve> AbortDelta<E> {
    pub(super) fn new(
        ctx: Context<E>,
        K: BTreeMap<PartyId, Ciphertext>,
        G: BTreeMap<PartyId, Ciphertext>,
        Gamma: BTreeMap<PartyId, Point<E>>,
        claimed: BTreeMap<PartyId, Scalar<E>>,
        received: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
        own_reveal: MsgAbortDelta<E>,
    ) -> Self {
        let mut reveals = BTreeMap::new();
        reveals.insert(ctx.helper.self_id().clone(), own_reveal);
        Self {
            ctx,
            K,
            G,
            Gamma,
            claimed,
            received,
            reveals,
        }
    }

    fn culprits(&self) -> Vec<PartyId> {
        let ctx = &self.ctx;
        let self_id = ctx.helper.self_id();
        let mut culprits = BTreeSet::new();

        // Phase 1: every reveal must replay the ciphertexts it explains
        for (j, reveal) in &self.reveals {
            let Some(party_j) = ctx.parties.get(j) else {
                culprits.insert(j.clone());
                continue;
            };
            let consistent = self.K.get(j).is_some_and(|K_j| {
                replays_to(&party_j.enc, &scalar_to_bignumber(&reveal.k), &reveal.rho, K_j)
            }) && self.G.get(j).is_some_and(|G_j| {
                replays_to(
                    &party_j.enc,
                    &scalar_to_bignumber(&reveal.gamma),
                    &reveal.nu,
                    G_j,
                )
            }) && self.Gamma.get(j) == Some(&(Point::generator() * reveal.gamma));
            if !consistent {
                culprits.insert(j.clone());
                continue;
            }

            if ctx
                .helper
                .roster()
                .others(j)
                .any(|l| !reveal.deltas.contains_key(l) || !reveal.alphas.contains_key(l))
            {
                culprits.insert(j.clone());
                continue;
            }

            for (l, mta) in &reveal.deltas {
                let Some(party_l) = ctx.parties.get(l) else {
                    culprits.insert(j.clone());
                    continue;
                };
                let Some(K_l) = self.K.get(l) else {
                    culprits.insert(j.clone());
                    continue;
                };
                // F_{j,l} = Enc_j(−β; r)
                if !replays_to(&party_j.enc, &-&mta.beta, &mta.r, &mta.F) {
                    culprits.insert(j.clone());
                }
                // D_{j,l} = (γ_j ⊙ K_l) ⊕ Enc_l(−β; s)
                let replay = party_l
                    .enc
                    .omul(&scalar_to_bignumber(&reveal.gamma), K_l)
                    .and_then(|product| {
                        let mask = party_l.enc.encrypt_with(&-&mta.beta, &mta.s)?;
                        party_l.enc.oadd(&product, &mask)
                    });
                if !matches!(replay, Ok(ct) if ct == mta.D) {
                    culprits.insert(j.clone());
                }
            }

            // the copy this party actually sent us must match its claim
            if let (Some((D_recv, F_recv)), Some(claim)) =
                (self.received.get(j), reveal.deltas.get(self_id))
            {
                if claim.D != *D_recv || claim.F != *F_recv {
                    culprits.insert(j.clone());
                }
            }
        }

        // Phase 2: recompute every δ_j from the reveals and compare with the
        // claims. Skipped for parties whose counterparties already failed the
        // replay, since their inputs cannot be trusted.
        for (j, reveal_j) in &self.reveals {
            if culprits.contains(j) {
                continue;
            }
            let mut expected = reveal_j.gamma * reveal_j.k;
            let mut attributable = true;
            for l in ctx.helper.roster().others(j) {
                if culprits.contains(l) {
                    attributable = false;
                    break;
                }
                let Some(reveal_l) = self.reveals.get(l) else {
                    attributable = false;
                    break;
                };
                let (Some(beta_lj), Some(beta_jl)) =
                    (reveal_l.deltas.get(j), reveal_j.deltas.get(l))
                else {
                    attributable = false;
                    break;
                };
                // α_{j,l} is the plaintext of D_{l,j} = Enc_j(γ_l·k_j − β_{l,j})
                let alpha_expected = reveal_l.gamma * reveal_j.k - beta_lj.beta.to_scalar();
                if reveal_j.alphas.get(l) != Some(&alpha_expected) {
                    culprits.insert(j.clone());
                }
                expected = expected + alpha_expected + beta_jl.beta.to_scalar();
            }
            if attributable && self.claimed.get(j) != Some(&expected) {
                culprits.insert(j.clone());
            }
        }

        culprits.into_iter().collect()
    }
}

impl<E> Round for AbortDelta<E>
where
    E: Curve,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        6
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: false,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        match &msg.content {
            Msg::AbortDelta(_) => Ok(()),
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::AbortDelta(body) => {
                self.reveals.insert(msg.from, body);
                Ok(())
            }
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        _out: &mut Outbox<Self::Msg>,
    ) -> Result<Transition<Self::Msg, Self::Output>, InternalError> {
        let mut culprits = self.culprits();
        if culprits.is_empty() {
            // nothing replayable failed; without honest majority no single
            // party can be blamed
            culprits = self.ctx.helper.roster().iter().cloned().collect();
        }
        Ok(Transition::Final(Session::Aborted(Abort {
            culprits,
            reason: AbortReason::DeltaInconsistency,
        })))
    }
}

/// Sigma-path abort: replays the chi MtA instances and checks every `σ_j`
/// against the revealed `k_j` and `χ_j`
pub(super) struct AbortSigma<E: Curve> {
    ctx: Context<E>,
    K: BTreeMap<PartyId, Ciphertext>,
    /// `σ_j` as each party claimed it in round 5
    claimed: BTreeMap<PartyId, Scalar<E>>,
    r: Scalar<E>,
    /// `(D̂, F̂)` chi ciphertexts addressed to us, by sender
    received: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    reveals: BTreeMap<PartyId, MsgAbortSigma<E>>,
}

impl<E: Curve> AbortSigma<E> {
    pub(super) fn new(
        ctx: Context<E>,
        K: BTreeMap<PartyId, Ciphertext>,
        claimed: BTreeMap<PartyId, Scalar<E>>,
        r: Scalar<E>,
        received: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
        own_reveal: MsgAbortSigma<E>,
    ) -> Self {
        let mut reveals = BTreeMap::new();
        reveals.insert(ctx.helper.self_id().clone(), own_reveal);
        Self {
            ctx,
            K,
            claimed,
            r,
            received,
            reveals,
        }
    }

    fn culprits(&self) -> Vec<PartyId> {
        let ctx = &self.ctx;
        let self_id = ctx.helper.self_id();
        let m = ctx.m();
        let mut culprits = BTreeSet::new();

        // Phase 1: K replay, F̂ replay, reveal completeness. D̂ cannot be
        // replayed without the sender's secret share; its correctness was
        // already established by the aff-g proofs of round 3.
        for (j, reveal) in &self.reveals {
            let Some(party_j) = ctx.parties.get(j) else {
                culprits.insert(j.clone());
                continue;
            };
            let k_replays = self.K.get(j).is_some_and(|K_j| {
                replays_to(&party_j.enc, &scalar_to_bignumber(&reveal.k), &reveal.rho, K_j)
            });
            if !k_replays {
                culprits.insert(j.clone());
                continue;
            }
            if ctx
                .helper
                .roster()
                .others(j)
                .any(|l| !reveal.hats.contains_key(l))
            {
                culprits.insert(j.clone());
                continue;
            }
            for mta in reveal.hats.values() {
                if !replays_to(&party_j.enc, &-&mta.beta, &mta.r, &mta.F) {
                    culprits.insert(j.clone());
                }
            }
            if let (Some((hat_D_recv, hat_F_recv)), Some(claim)) =
                (self.received.get(j), reveal.hats.get(self_id))
            {
                if claim.D != *hat_D_recv || claim.F != *hat_F_recv {
                    culprits.insert(j.clone());
                }
            }
        }

        // Phase 2: χ_j·G = k_j·Y + Σ(β̂_{j,l} − β̂_{l,j})·G and
        // σ_j = k_j·m + r·χ_j
        for (j, reveal_j) in &self.reveals {
            if culprits.contains(j) {
                continue;
            }
            let mut diff = Scalar::<E>::zero();
            let mut attributable = true;
            for l in ctx.helper.roster().others(j) {
                if culprits.contains(l) {
                    attributable = false;
                    break;
                }
                let Some(reveal_l) = self.reveals.get(l) else {
                    attributable = false;
                    break;
                };
                let (Some(hat_jl), Some(hat_lj)) =
                    (reveal_j.hats.get(l), reveal_l.hats.get(j))
                else {
                    attributable = false;
                    break;
                };
                diff = diff + hat_jl.beta.to_scalar::<E>() - hat_lj.beta.to_scalar::<E>();
            }
            if !attributable {
                continue;
            }
            let chi_consistent = Point::generator() * reveal_j.chi
                == ctx.Y * reveal_j.k + Point::generator() * diff;
            let sigma_consistent =
                self.claimed.get(j) == Some(&(reveal_j.k * m + self.r * reveal_j.chi));
            if !chi_consistent || !sigma_consistent {
                culprits.insert(j.clone());
            }
        }

        culprits.into_iter().collect()
    }
}

impl<E> Round for AbortSigma<E>
where
    E: Curve,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        7
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: false,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        match &msg.content {
            Msg::AbortSigma(_) => Ok(()),
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::AbortSigma(body) => {
                self.reveals.insert(msg.from, body);
                Ok(())
            }
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        _out: &mut Outbox<Self::Msg>,
    ) -> Result<Transition<Self::Msg, Self::Output>, InternalError> {
        let mut culprits = self.culprits();
        if culprits.is_empty() {
            culprits = self.ctx.helper.roster().iter().cloned().collect();
        }
        Ok(Transition::Final(Session::Aborted(Abort {
            culprits,
            reason: AbortReason::SigmaInconsistency,
        })))
    }
}
