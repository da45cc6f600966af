//! Round 2: binding factors, group commitment, challenge and signature share

use std::collections::BTreeMap;

use generic_ec::{Curve, Point, Scalar, SecretScalar};
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::round::{
    Bug, Expects, InternalError, Message, MessageError, Outbox, Round, RoundNumber, Transition,
};

use super::{round3::Round3, taproot, Msg, MsgRound2, MsgRound3, SignCtx, Signature};

pub(super) struct Round2<E: Curve> {
    ctx: SignCtx<E>,
    hiding_nonce: SecretScalar<E>,
    binding_nonce: SecretScalar<E>,
    commitments: BTreeMap<PartyId, MsgRound2<E>>,
}

impl<E: Curve> Round2<E> {
    pub(super) fn new(
        ctx: SignCtx<E>,
        hiding_nonce: SecretScalar<E>,
        binding_nonce: SecretScalar<E>,
        commitments: BTreeMap<PartyId, MsgRound2<E>>,
    ) -> Self {
        Self {
            ctx,
            hiding_nonce,
            binding_nonce,
            commitments,
        }
    }
}

impl<E: Curve> Round for Round2<E> {
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        2
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: false,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        match &msg.content {
            Msg::Round2(comm) => {
                if comm.hiding_comm.is_zero() || comm.binding_comm.is_zero() {
                    return Err(MessageError::NilFields);
                }
                Ok(())
            }
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::Round2(comm) => {
                self.commitments.insert(msg.from, comm);
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
            hiding_nonce,
            binding_nonce,
            commitments,
        } = *self;

        // Absorb the commitment list in canonical roster order. BTreeMap
        // iteration already is that order.
        for (id, comm) in &commitments {
            let transcript = ctx.helper.transcript_mut();
            transcript.write("committer", id.as_bytes());
            transcript.write_point("hiding commitment", &comm.hiding_comm);
            transcript.write_point("binding commitment", &comm.binding_comm);
        }

        // Per-signer binding factors over the full commitment list
        let rho = commitments
            .keys()
            .map(|id| {
                let factor = ctx.helper.hash_for_id(id).challenge::<E>("binding factor");
                (id.clone(), factor)
            })
            .collect::<BTreeMap<_, _>>();

        let mut group_commitment = Point::zero();
        for (id, comm) in &commitments {
            let rho_j = rho.get(id).ok_or(Bug::IncompleteRound)?;
            group_commitment = group_commitment + comm.hiding_comm + comm.binding_comm * rho_j;
        }

        // BIP-340 only admits an even-Y nonce point; flipping R requires every
        // signer to flip its nonce contribution as well.
        let flip_r = ctx.taproot && !taproot::has_even_y(&group_commitment);
        if flip_r {
            group_commitment = -group_commitment;
        }

        let challenge = if ctx.taproot {
            taproot::challenge(&group_commitment, &ctx.group_key, &ctx.msg)
        } else {
            super::challenge(&group_commitment, &ctx.group_key, &ctx.msg)
        };

        let self_id = ctx.helper.self_id().clone();
        let own_rho = rho.get(&self_id).ok_or(Bug::IncompleteRound)?;
        let mut nonce_part: Scalar<E> =
            hiding_nonce.as_ref() + binding_nonce.as_ref() * own_rho;
        if flip_r {
            nonce_part = -nonce_part;
        }
        let sig_share = nonce_part + challenge * &ctx.eff_secret;

        out.broadcast(Msg::Round3(MsgRound3 { sig_share }));

        let mut shares = BTreeMap::new();
        shares.insert(self_id, sig_share);

        // hiding_nonce and binding_nonce are dropped (and wiped) here; they
        // must never survive the round that used them
        Ok(Transition::Next(Box::new(Round3::new(
            ctx,
            commitments,
            rho,
            challenge,
            group_commitment,
            flip_r,
            shares,
        ))))
    }
}
