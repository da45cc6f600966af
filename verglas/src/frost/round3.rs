//! Round 3: share verification and aggregation

use std::collections::BTreeMap;

use generic_ec::{Curve, Point, Scalar};
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::round::{
    Bug, Expects, InternalError, Message, MessageError, Outbox, Round, RoundNumber, Session,
    Transition,
};

use super::{Msg, MsgRound2, SignCtx, Signature};

pub(super) struct Round3<E: Curve> {
    ctx: SignCtx<E>,
    commitments: BTreeMap<PartyId, MsgRound2<E>>,
    rho: BTreeMap<PartyId, Scalar<E>>,
    challenge: Scalar<E>,
    group_commitment: Point<E>,
    flip_r: bool,
    shares: BTreeMap<PartyId, Scalar<E>>,
}

impl<E: Curve> Round3<E> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        ctx: SignCtx<E>,
        commitments: BTreeMap<PartyId, MsgRound2<E>>,
        rho: BTreeMap<PartyId, Scalar<E>>,
        challenge: Scalar<E>,
        group_commitment: Point<E>,
        flip_r: bool,
        shares: BTreeMap<PartyId, Scalar<E>>,
    ) -> Self {
        Self {
            ctx,
            commitments,
            rho,
            challenge,
            group_commitment,
            flip_r,
            shares,
        }
    }
}

impl<E: Curve> Round for Round3<E> {
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        3
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: false,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        let Msg::Round3(share) = &msg.content else {
            return Err(MessageError::InvalidContent);
        };
        let comm = self
            .commitments
            .get(&msg.from)
            .ok_or(MessageError::UnknownSender)?;
        let rho_j = self.rho.get(&msg.from).ok_or(MessageError::UnknownSender)?;
        let eff_share = self
            .ctx
            .eff_shares
            .get(&msg.from)
            .ok_or(MessageError::UnknownSender)?;

        let mut nonce_pub = comm.hiding_comm + comm.binding_comm * rho_j;
        if self.flip_r {
            nonce_pub = -nonce_pub;
        }
        if Point::generator() * share.sig_share != nonce_pub + eff_share * self.challenge {
            return Err(MessageError::ProofFailure {
                kind: "signature share",
                from: msg.from.clone(),
            });
        }
        Ok(())
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::Round3(share) => {
                self.shares.insert(msg.from, share.sig_share);
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
        let Self {
            mut ctx,
            shares,
            challenge,
            group_commitment,
            ..
        } = *self;

        for (id, share) in &shares {
            let transcript = ctx.helper.transcript_mut();
            transcript.write("signer", id.as_bytes());
            transcript.write_scalar("signature share", share);
        }

        let z = shares.values().copied().sum::<Scalar<E>>();
        // every share was verified individually, so the sum cannot fail to
        // verify unless the state itself is corrupted
        if Point::generator() * z != group_commitment + ctx.group_key * challenge {
            return Err(Bug::InvalidAggregate.into());
        }

        Ok(Transition::Final(Session::Completed(Signature {
            r: group_commitment,
            z,
        })))
    }
}
