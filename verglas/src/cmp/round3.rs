//! Round 3: MtA verification, share decryption, delta shares

use std::collections::BTreeMap;

use generic_ec::{
    coords::AlwaysHasAffineX, hash_to_curve::FromHash, Curve, NonZero, Point, Scalar, SecretScalar,
};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext};
use paillier_zk::{
    group_element_vs_paillier_encryption_in_range as pi_log,
    paillier_affine_operation_in_range as pi_aff, BigNumberExt, SafePaillierDecryptionExt,
};
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::pool::fork_rng;
use crate::round::{
    Abort, AbortReason, Bug, Expects, InternalError, Message, MessageError, Outbox, Round,
    RoundNumber, Session, Transition,
};

use super::round4::Round4;
use super::zk::scalar_to_bignumber;
use super::{Context, Msg, MsgRound3Direct, MsgRound4Bcast, MsgRound4Direct, MtaReveal, Signature};

pub(super) struct Round3<E: Curve> {
    ctx: Context<E>,
    k_i: SecretScalar<E>,
    gamma_i: SecretScalar<E>,
    rho_i: BigNumber,
    nu_i: BigNumber,
    K_i: Ciphertext,
    G_i: Ciphertext,
    Gamma_i: Point<E>,
    K: BTreeMap<PartyId, Ciphertext>,
    G: BTreeMap<PartyId, Ciphertext>,
    /// Own echo hash; peers must have derived the same one
    echo: [u8; 32],
    delta_secrets: BTreeMap<PartyId, MtaReveal>,
    chi_secrets: BTreeMap<PartyId, MtaReveal>,
    msgs: BTreeMap<PartyId, MsgRound3Direct<E>>,
    echoes: BTreeMap<PartyId, [u8; 32]>,
}

impl<E: Curve> Round3<E> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        ctx: Context<E>,
        k_i: SecretScalar<E>,
        gamma_i: SecretScalar<E>,
        rho_i: BigNumber,
        nu_i: BigNumber,
        K_i: Ciphertext,
        G_i: Ciphertext,
        Gamma_i: Point<E>,
        K: BTreeMap<PartyId, Ciphertext>,
        G: BTreeMap<PartyId, Ciphertext>,
        echo: [u8; 32],
        delta_secrets: BTreeMap<PartyId, MtaReveal>,
        chi_secrets: BTreeMap<PartyId, MtaReveal>,
    ) -> Self {
        Self {
            ctx,
            k_i,
            gamma_i,
            rho_i,
            nu_i,
            K_i,
            G_i,
            Gamma_i,
            K,
            G,
            echo,
            delta_secrets,
            chi_secrets,
            msgs: BTreeMap::new(),
            echoes: BTreeMap::new(),
        }
    }
}

impl<E> Round for Round3<E>
where
    E: Curve,
    Scalar<E>: FromHash,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        3
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: true,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        let body = match &msg.content {
            Msg::Round3Bcast(_) => return Ok(()),
            Msg::Round3Direct(body) => body,
            _ => return Err(MessageError::InvalidContent),
        };
        let from = &msg.from;

        if [&body.D, &body.F, &body.hat_D, &body.hat_F]
            .iter()
            .any(|c| **c == BigNumber::zero())
        {
            return Err(MessageError::NilFields);
        }

        let party = self
            .ctx
            .parties
            .get(from)
            .ok_or(MessageError::UnknownSender)?;
        let X_j = self.ctx.X.get(from).ok_or(MessageError::UnknownSender)?;
        let G_j = self.G.get(from).ok_or(MessageError::UnknownSender)?;
        let digest = self.ctx.digest_for(from);

        pi_aff::non_interactive::verify(
            digest.clone(),
            &self.ctx.aux_i,
            &pi_aff::Data {
                key0: self.ctx.enc_i.clone(),
                key1: party.enc.clone(),
                c: self.K_i.clone(),
                d: body.D.clone(),
                y: body.F.clone(),
                x: body.Gamma,
            },
            &body.psi.0,
            &self.ctx.params.pi_aff,
            &body.psi.1,
        )
        .map_err(|_| MessageError::ProofFailure {
            kind: "aff-g",
            from: from.clone(),
        })?;

        pi_aff::non_interactive::verify(
            digest.clone(),
            &self.ctx.aux_i,
            &pi_aff::Data {
                key0: self.ctx.enc_i.clone(),
                key1: party.enc.clone(),
                c: self.K_i.clone(),
                d: body.hat_D.clone(),
                y: body.hat_F.clone(),
                x: *X_j,
            },
            &body.hat_psi.0,
            &self.ctx.params.pi_aff,
            &body.hat_psi.1,
        )
        .map_err(|_| MessageError::ProofFailure {
            kind: "aff-g",
            from: from.clone(),
        })?;

        pi_log::non_interactive::verify(
            digest,
            &self.ctx.aux_i,
            &pi_log::Data {
                key0: party.enc.clone(),
                c: G_j.clone(),
                x: body.Gamma,
                b: Point::<E>::generator().to_point(),
            },
            &body.psi_prime.0,
            &self.ctx.params.pi_log,
            &body.psi_prime.1,
        )
        .map_err(|_| MessageError::ProofFailure {
            kind: "log*",
            from: from.clone(),
        })?;

        Ok(())
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::Round3Bcast(body) => {
                self.echoes.insert(msg.from, body.echo);
                Ok(())
            }
            Msg::Round3Direct(body) => {
                self.msgs.insert(msg.from, body);
                Ok(())
            }
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
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
            Gamma_i,
            K,
            G,
            echo,
            delta_secrets,
            chi_secrets,
            msgs,
            echoes,
        } = *self;

        // Broadcast consistency gate. There is no reliable-broadcast channel
        // underneath, so on mismatch no single culprit can be named.
        if echoes.values().any(|peer_echo| *peer_echo != echo) {
            tracing::warn!("peers observed different round-2 broadcasts");
            return Ok(Transition::Final(Session::Aborted(Abort {
                culprits: ctx.helper.roster().iter().cloned().collect(),
                reason: AbortReason::EchoMismatch,
            })));
        }

        // Decrypt the additive shares addressed to us
        let mut alpha_delta = BTreeMap::new();
        let mut alpha_chi = BTreeMap::new();
        for (j, body) in &msgs {
            let alpha: Scalar<E> = ctx
                .dec
                .decrypt_to_bigint(&body.D)
                .map_err(|_| Bug::PaillierDecrypt)?
                .to_scalar();
            let hat_alpha: Scalar<E> = ctx
                .dec
                .decrypt_to_bigint(&body.hat_D)
                .map_err(|_| Bug::PaillierDecrypt)?
                .to_scalar();
            alpha_delta.insert(j.clone(), alpha);
            alpha_chi.insert(j.clone(), hat_alpha);
        }

        let beta_delta_sum: Scalar<E> = delta_secrets.values().map(|s| s.beta.to_scalar()).sum();
        let beta_chi_sum: Scalar<E> = chi_secrets.values().map(|s| s.beta.to_scalar()).sum();
        let alpha_delta_sum: Scalar<E> = alpha_delta.values().copied().sum();
        let alpha_chi_sum: Scalar<E> = alpha_chi.values().copied().sum();

        let delta_i =
            gamma_i.as_ref() * k_i.as_ref() + alpha_delta_sum + beta_delta_sum;
        let mut chi_i_raw =
            ctx.x_i.as_ref() * k_i.as_ref() + alpha_chi_sum + beta_chi_sum;
        let chi_i = SecretScalar::new(&mut chi_i_raw);

        let Gamma = Gamma_i + msgs.values().map(|body| body.Gamma).sum::<Point<E>>();
        let Delta_i = Gamma * &k_i;

        // Keep the individual Γ_j and the ciphertexts we received; the abort
        // subprotocol replays them
        let mut Gamma_map = BTreeMap::new();
        Gamma_map.insert(ctx.helper.self_id().clone(), Gamma_i);
        for (j, body) in &msgs {
            Gamma_map.insert(j.clone(), body.Gamma);
        }
        let received_delta = msgs
            .iter()
            .map(|(j, body)| (j.clone(), (body.D.clone(), body.F.clone())))
            .collect::<BTreeMap<_, _>>();
        let received_chi = msgs
            .iter()
            .map(|(j, body)| (j.clone(), (body.hat_D.clone(), body.hat_F.clone())))
            .collect::<BTreeMap<_, _>>();

        // Prove Δ_i = k_i·Γ under K_i, once per recipient
        let mut rng = fork_rng(rng);
        let self_id = ctx.helper.self_id().clone();
        let digest = ctx.digest_for(&self_id);
        let k_int = scalar_to_bignumber(k_i.as_ref());
        let tasks = ctx
            .helper
            .others()
            .cloned()
            .map(|j| (j, fork_rng(&mut rng)))
            .collect::<Vec<_>>();
        let proofs = ctx.helper.pool().map(tasks, |(j, mut prng)| {
            let party = ctx.parties.get(&j).ok_or(Bug::MissingParty)?;
            let psi_prime_prime = pi_log::non_interactive::prove(
                digest.clone(),
                &party.aux(),
                &pi_log::Data {
                    key0: ctx.enc_i.clone(),
                    c: K_i.clone(),
                    x: Delta_i,
                    b: Gamma,
                },
                &pi_log::PrivateData {
                    x: k_int.clone(),
                    nonce: rho_i.clone(),
                },
                &ctx.params.pi_log,
                &mut prng,
            )
            .map_err(|_| Bug::Prove("log*"))?;
            Ok::<_, Bug>((j, psi_prime_prime))
        });

        out.broadcast(Msg::Round4Bcast(MsgRound4Bcast {
            delta: delta_i,
            Delta: Delta_i,
        }));
        for proof in proofs {
            let (j, psi_prime_prime) = proof?;
            out.send(&j, Msg::Round4Direct(MsgRound4Direct { psi_prime_prime }));
        }

        Ok(Transition::Next(Box::new(Round4::new(
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
        ))))
    }
}
