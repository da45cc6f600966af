//! Round 4: delta consistency gate and signature shares

use std::collections::BTreeMap;

use generic_ec::{
    coords::AlwaysHasAffineX, hash_to_curve::FromHash, Curve, NonZero, Point, Scalar, SecretScalar,
};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext};
use paillier_zk::group_element_vs_paillier_encryption_in_range as pi_log;
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::round::{
    Abort, AbortReason, Bug, Expects, InternalError, Message, MessageError, Outbox, Round,
    RoundNumber, Session, Transition,
};

use super::abort::AbortDelta;
use super::round5::Round5;
use super::{
    Context, Msg, MsgAbortDelta, MsgRound4Bcast, MsgRound5Bcast, MtaReveal, Signature,
};

pub(super) struct Round4<E: Curve> {
    ctx: Context<E>,
    k_i: SecretScalar<E>,
    gamma_i: SecretScalar<E>,
    rho_i: BigNumber,
    nu_i: BigNumber,
    K_i: Ciphertext,
    G_i: Ciphertext,
    K: BTreeMap<PartyId, Ciphertext>,
    G: BTreeMap<PartyId, Ciphertext>,
    Gamma: Point<E>,
    Gamma_map: BTreeMap<PartyId, Point<E>>,
    Delta_i: Point<E>,
    delta_i: Scalar<E>,
    chi_i: SecretScalar<E>,
    alpha_delta: BTreeMap<PartyId, Scalar<E>>,
    delta_secrets: BTreeMap<PartyId, MtaReveal>,
    chi_secrets: BTreeMap<PartyId, MtaReveal>,
    received_delta: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    received_chi: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    bcasts: BTreeMap<PartyId, MsgRound4Bcast<E>>,
    psis: BTreeMap<PartyId, (pi_log::Commitment<E>, pi_log::Proof)>,
}

impl<E: Curve> Round4<E> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        ctx: Context<E>,
        k_i: SecretScalar<E>,
        gamma_i: SecretScalar<E>,
        rho_i: BigNumber,
        nu_i: BigNumber,
        K_i: Ciphertext,
        G_i: Ciphertext,
        K: BTreeMap<PartyId, Ciphertext>,
        G: BTreeMap<PartyId, Ciphertext>,
        Gamma: Point<E>,
        Gamma_map: BTreeMap<PartyId, Point<E>>,
        Delta_i: Point<E>,
        delta_i: Scalar<E>,
        chi_i: SecretScalar<E>,
        alpha_delta: BTreeMap<PartyId, Scalar<E>>,
        delta_secrets: BTreeMap<PartyId, MtaReveal>,
        chi_secrets: BTreeMap<PartyId, MtaReveal>,
        received_delta: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
        received_chi: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    ) -> Self {
        Self {
            ctx,
            k_i,
            gamma_i,
            rho_i,
            nu_i,
            K_i,
            G_i,
            K,
            G,
            Gamma,
            Gamma_map,
            Delta_i,
            delta_i,
            chi_i,
            alpha_delta,
            delta_secrets,
            chi_secrets,
            received_delta,
            received_chi,
            bcasts: BTreeMap::new(),
            psis: BTreeMap::new(),
        }
    }
}

impl<E> Round for Round4<E>
where
    E: Curve,
    Scalar<E>: FromHash,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        4
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: true,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        match &msg.content {
            Msg::Round4Bcast(body) => {
                if body.Delta.is_zero() {
                    return Err(MessageError::NilFields);
                }
                Ok(())
            }
            // ψ″ references the Δ_j broadcast of the same round; checked at
            // the finalize gate
            Msg::Round4Direct(_) => Ok(()),
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::Round4Bcast(body) => {
                self.bcasts.insert(msg.from, body);
                Ok(())
            }
            Msg::Round4Direct(body) => {
                self.psis.insert(msg.from, body.psi_prime_prime);
                Ok(())
            }
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn finalize(
        self: Box<Self>,
        _rng: &mut dyn CryptoRngCore,
        out: &mut Outbox<Self::Msg>,
    ) -> Result<Transition<Self::Msg, Self::Output>, InternalError> {
        let Self {
            mut ctx,
            k_i,
            gamma_i,
            rho_i,
            nu_i,
            K_i,
            G_i,
            K,
            G,
            Gamma,
            Gamma_map,
            Delta_i,
            delta_i,
            chi_i,
            alpha_delta,
            delta_secrets,
            chi_secrets,
            received_delta,
            received_chi,
            bcasts,
            psis,
        } = *self;

        // Step 1: check every peer's ψ″
        let peers = ctx.helper.others().cloned().collect::<Vec<_>>();
        let culprits = ctx
            .helper
            .pool()
            .map(peers, |j| {
                let (Some(party), Some(K_j), Some(bcast), Some(proof)) = (
                    ctx.parties.get(&j),
                    K.get(&j),
                    bcasts.get(&j),
                    psis.get(&j),
                ) else {
                    return Some(j);
                };
                let valid = pi_log::non_interactive::verify(
                    ctx.digest_for(&j),
                    &ctx.aux_i,
                    &pi_log::Data {
                        key0: party.enc.clone(),
                        c: K_j.clone(),
                        x: bcast.Delta,
                        b: Gamma,
                    },
                    &proof.0,
                    &ctx.params.pi_log,
                    &proof.1,
                )
                .is_ok();
                (!valid).then_some(j)
            })
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        if !culprits.is_empty() {
            return Ok(Transition::Final(Session::Aborted(Abort {
                culprits,
                reason: AbortReason::ProofFailure("log*"),
            })));
        }

        // Step 2: absorb the round broadcasts and reconstruct delta
        let self_id = ctx.helper.self_id().clone();
        let mut shares = BTreeMap::new();
        shares.insert(
            self_id.clone(),
            MsgRound4Bcast {
                delta: delta_i,
                Delta: Delta_i,
            },
        );
        for (j, bcast) in &bcasts {
            shares.insert(j.clone(), *bcast);
        }
        for (id, share) in &shares {
            let transcript = ctx.helper.transcript_mut();
            transcript.write("party", id.as_bytes());
            transcript.write_scalar("delta", &share.delta);
            transcript.write_point("Delta", &share.Delta);
        }

        let delta = shares.values().map(|share| share.delta).sum::<Scalar<E>>();
        let Delta = shares.values().map(|share| share.Delta).sum::<Point<E>>();

        if Point::generator() * delta != Delta {
            // Someone lied about its delta share. Reveal the MtA transcript
            // and let every party replay the equations.
            tracing::warn!("delta shares are inconsistent, entering identifiable abort");
            let reveal = MsgAbortDelta {
                k: *k_i.as_ref(),
                rho: rho_i.clone(),
                gamma: *gamma_i.as_ref(),
                nu: nu_i.clone(),
                deltas: delta_secrets.clone(),
                alphas: alpha_delta.clone(),
            };
            out.broadcast(Msg::AbortDelta(reveal.clone()));

            let claimed = shares
                .iter()
                .map(|(id, share)| (id.clone(), share.delta))
                .collect::<BTreeMap<_, _>>();
            let mut all_K = K;
            all_K.insert(self_id.clone(), K_i);
            let mut all_G = G;
            all_G.insert(self_id.clone(), G_i);
            return Ok(Transition::Next(Box::new(AbortDelta::new(
                ctx,
                all_K,
                all_G,
                Gamma_map,
                claimed,
                received_delta,
                reveal,
            ))));
        }

        // Step 3: nonce point and own signature share
        let R = Gamma * delta.invert().ok_or(Bug::ZeroDelta)?;
        let R = NonZero::from_point(R).ok_or(Bug::ZeroR)?;
        let r = R.x().to_scalar();
        let sigma_i = k_i.as_ref() * ctx.m() + r * chi_i.as_ref();

        out.broadcast(Msg::Round5Bcast(MsgRound5Bcast { sigma: sigma_i }));

        let mut all_K = K;
        all_K.insert(self_id, K_i);
        Ok(Transition::Next(Box::new(Round5::new(
            ctx,
            k_i,
            rho_i,
            chi_i,
            all_K,
            r,
            sigma_i,
            chi_secrets,
            received_chi,
        ))))
    }
}
