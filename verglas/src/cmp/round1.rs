//! Round 1: nonce and mask sampling, `K_i`/`G_i` encryption, range proofs

use generic_ec::{
    coords::AlwaysHasAffineX, hash_to_curve::FromHash, Curve, NonZero, Point, Scalar, SecretScalar,
};
use paillier_zk::libpaillier::unknown_order::BigNumber;
use paillier_zk::{
    paillier_encryption_in_range as pi_enc, BigNumberExt, SafePaillierEncryptionExt,
};
use rand_core::CryptoRngCore;

use crate::pool::fork_rng;
use crate::round::{
    Bug, Expects, InternalError, Message, MessageError, Outbox, Round, RoundNumber, Transition,
};

use super::round2::Round2;
use super::zk::scalar_to_bignumber;
use super::{Context, Msg, MsgRound2Bcast, MsgRound2Direct, Signature};

pub(super) struct Round1<E: Curve> {
    ctx: Context<E>,
}

impl<E: Curve> Round1<E> {
    pub(super) fn new(ctx: Context<E>) -> Self {
        Self { ctx }
    }
}

impl<E> Round for Round1<E>
where
    E: Curve,
    Scalar<E>: FromHash,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
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
        let mut rng = fork_rng(rng);

        let gamma_i = SecretScalar::<E>::random(&mut rng);
        let k_i = SecretScalar::<E>::random(&mut rng);

        let nu_i = BigNumber::gen_inversible(ctx.enc_i.n(), &mut rng);
        let rho_i = BigNumber::gen_inversible(ctx.enc_i.n(), &mut rng);

        let G_i = ctx
            .enc_i
            .encrypt_with(&scalar_to_bignumber(gamma_i.as_ref()), &nu_i)
            .map_err(|_| Bug::PaillierEncrypt)?;
        let K_i = ctx
            .enc_i
            .encrypt_with(&scalar_to_bignumber(k_i.as_ref()), &rho_i)
            .map_err(|_| Bug::PaillierEncrypt)?;

        out.broadcast(Msg::Round2Bcast(MsgRound2Bcast {
            K: K_i.clone(),
            G: G_i.clone(),
        }));

        // The range proof for K_i is bound to each recipient's Pedersen
        // parameters, so there is one proof per peer.
        let digest = ctx.digest_for(ctx.helper.self_id());
        let k_int = scalar_to_bignumber(k_i.as_ref());
        let tasks = ctx
            .helper
            .others()
            .cloned()
            .map(|j| (j, fork_rng(&mut rng)))
            .collect::<Vec<_>>();
        let proofs = ctx.helper.pool().map(tasks, |(j, mut prng)| {
            let party = ctx.parties.get(&j).ok_or(Bug::MissingParty)?;
            let psi0 = pi_enc::non_interactive::prove(
                digest.clone(),
                &party.aux(),
                &pi_enc::Data {
                    key: ctx.enc_i.clone(),
                    ciphertext: K_i.clone(),
                },
                &pi_enc::PrivateData {
                    plaintext: k_int.clone(),
                    nonce: rho_i.clone(),
                },
                &ctx.params.pi_enc,
                &mut prng,
            )
            .map_err(|_| Bug::Prove("enc"))?;
            Ok::<_, Bug>((j, psi0))
        });
        for task in proofs {
            let (j, psi0) = task?;
            out.send(&j, Msg::Round2Direct(MsgRound2Direct { psi0 }));
        }

        let Gamma_i = Point::generator() * &gamma_i;
        Ok(Transition::Next(Box::new(Round2::new(
            ctx,
            k_i,
            gamma_i,
            rho_i,
            nu_i,
            K_i,
            G_i,
            Gamma_i,
        ))))
    }
}
