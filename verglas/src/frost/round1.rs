//! Round 1: nonce generation and commitment

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use generic_ec::{Curve, Point, SecretScalar};
use rand_core::CryptoRngCore;

use crate::round::{
    Expects, InternalError, Message, MessageError, Outbox, Round, RoundNumber, Transition,
};
use crate::transcript::Transcript;

use super::{round2::Round2, Msg, MsgRound2, SignCtx, Signature};

/// Distinguishes start invocations within one process, so a caller that
/// (wrongly) reuses a seeded RNG across sessions still gets fresh nonces.
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Samples a nonce from RNG output, an invocation counter and the secret share
///
/// Nonce reuse across sessions leaks the secret share, so the nonce never
/// depends on the RNG alone.
fn generate_nonce<E: Curve>(
    rng: &mut dyn CryptoRngCore,
    share: &SecretScalar<E>,
) -> SecretScalar<E> {
    let mut random = [0u8; 32];
    rng.fill_bytes(&mut random);

    let mut t = Transcript::tagged("verglas/nonce");
    t.write("random", &random);
    t.write(
        "invocation",
        &NONCE_COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes(),
    );
    t.write_scalar("share", share.as_ref());

    let mut nonce = t.challenge::<E>("nonce");
    SecretScalar::new(&mut nonce)
}

pub(super) struct Round1<E: Curve> {
    ctx: SignCtx<E>,
}

impl<E: Curve> Round1<E> {
    pub(super) fn new(ctx: SignCtx<E>) -> Self {
        Self { ctx }
    }
}

impl<E: Curve> Round for Round1<E> {
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        1
    }

    fn expects(&self) -> Expects {
        Expects::default()
    }

    fn verify_message(&self, _msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        Err(MessageError::InvalidContent)
    }

    fn store_message(&mut self, _msg: Message<Self::Msg>) -> Result<(), MessageError> {
        Err(MessageError::InvalidContent)
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Outbox<Self::Msg>,
    ) -> Result<Transition<Self::Msg, Self::Output>, InternalError> {
        let ctx = self.ctx;

        let hiding_nonce = generate_nonce(rng, &ctx.eff_secret);
        let binding_nonce = generate_nonce(rng, &ctx.eff_secret);

        let commitments = MsgRound2 {
            hiding_comm: Point::generator() * &hiding_nonce,
            binding_comm: Point::generator() * &binding_nonce,
        };
        out.broadcast(Msg::Round2(commitments));

        let mut all_commitments = BTreeMap::new();
        all_commitments.insert(ctx.helper.self_id().clone(), commitments);

        Ok(Transition::Next(Box::new(Round2::new(
            ctx,
            hiding_nonce,
            binding_nonce,
            all_commitments,
        ))))
    }
}
