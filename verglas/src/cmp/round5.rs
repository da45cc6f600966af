//! Round 5: signature assembly

use std::collections::BTreeMap;

use generic_ec::{
    coords::AlwaysHasAffineX, Curve, NonZero, Point, Scalar, SecretScalar,
};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext};
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::round::{
    Expects, InternalError, Message, MessageError, Outbox, Round, RoundNumber, Session, Transition,
};

use super::abort::AbortSigma;
use super::{Context, Msg, MsgAbortSigma, MsgRound5Bcast, MtaReveal, Signature};

pub(super) struct Round5<E: Curve> {
    ctx: Context<E>,
    k_i: SecretScalar<E>,
    rho_i: BigNumber,
    chi_i: SecretScalar<E>,
    K: BTreeMap<PartyId, Ciphertext>,
    r: Scalar<E>,
    sigma_i: Scalar<E>,
    chi_secrets: BTreeMap<PartyId, MtaReveal>,
    received_chi: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    sigmas: BTreeMap<PartyId, Scalar<E>>,
}

impl<E: Curve> Round5<E> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        ctx: Context<E>,
        k_i: SecretScalar<E>,
        rho_i: BigNumber,
        chi_i: SecretScalar<E>,
        K: BTreeMap<PartyId, Ciphertext>,
        r: Scalar<E>,
        sigma_i: Scalar<E>,
        chi_secrets: BTreeMap<PartyId, MtaReveal>,
        received_chi: BTreeMap<PartyId, (Ciphertext, Ciphertext)>,
    ) -> Self {
        Self {
            ctx,
            k_i,
            rho_i,
            chi_i,
            K,
            r,
            sigma_i,
            chi_secrets,
            received_chi,
            sigmas: BTreeMap::new(),
        }
    }
}

impl<E> Round for Round5<E>
where
    E: Curve,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        5
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: false,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        match &msg.content {
            Msg::Round5Bcast(_) => Ok(()),
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::Round5Bcast(body) => {
                self.sigmas.insert(msg.from, body.sigma);
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
            rho_i,
            chi_i,
            K,
            r,
            sigma_i,
            chi_secrets,
            received_chi,
            mut sigmas,
        } = *self;

        let self_id = ctx.helper.self_id().clone();
        sigmas.insert(self_id, sigma_i);
        for (id, sigma) in &sigmas {
            let transcript = ctx.helper.transcript_mut();
            transcript.write("party", id.as_bytes());
            transcript.write_scalar("sigma", sigma);
        }

        let sigma = sigmas.values().copied().sum::<Scalar<E>>();
        let signature = Option::zip(NonZero::from_scalar(r), NonZero::from_scalar(sigma))
            .map(|(r, s)| Signature { r, s }.normalize_s());

        match signature {
            Some(signature) if signature.verify(&ctx.Y, &ctx.data).is_ok() => Ok(
                Transition::Final(Session::Completed(signature)),
            ),
            _ => {
                // A signature share does not match the presignature. Reveal
                // the chi-side MtA transcript and replay the shares.
                tracing::warn!("signature failed to verify, entering identifiable abort");
                let reveal = MsgAbortSigma {
                    k: *k_i.as_ref(),
                    rho: rho_i.clone(),
                    chi: *chi_i.as_ref(),
                    hats: chi_secrets.clone(),
                };
                out.broadcast(Msg::AbortSigma(reveal.clone()));
                Ok(Transition::Next(Box::new(AbortSigma::new(
                    ctx,
                    K,
                    sigmas,
                    r,
                    received_chi,
                    reveal,
                ))))
            }
        }
    }
}
