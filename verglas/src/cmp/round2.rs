//! Round 2: range-proof checks, echo hash, MtA fan-out

use std::collections::BTreeMap;

use generic_ec::{
    coords::AlwaysHasAffineX, hash_to_curve::FromHash, Curve, NonZero, Point, Scalar, SecretScalar,
};
use paillier_zk::libpaillier::{unknown_order::BigNumber, Ciphertext};
use paillier_zk::{
    group_element_vs_paillier_encryption_in_range as pi_log, paillier_encryption_in_range as pi_enc,
};
use rand_core::CryptoRngCore;

use crate::party::PartyId;
use crate::pool::fork_rng;
use crate::round::{
    Abort, AbortReason, Bug, Expects, InternalError, Message, MessageError, Outbox, Round,
    RoundNumber, Session, Transition,
};

use super::round3::Round3;
use super::zk::scalar_to_bignumber;
use super::{mta, Context, Msg, MsgRound3Bcast, MsgRound3Direct, MtaReveal, Signature};

pub(super) struct Round2<E: Curve> {
    ctx: Context<E>,
    k_i: SecretScalar<E>,
    gamma_i: SecretScalar<E>,
    rho_i: BigNumber,
    nu_i: BigNumber,
    K_i: Ciphertext,
    G_i: Ciphertext,
    Gamma_i: Point<E>,
    /// `K_j` of every peer
    K: BTreeMap<PartyId, Ciphertext>,
    /// `G_j` of every peer
    G: BTreeMap<PartyId, Ciphertext>,
    /// `ψ⁰` proof of every peer
    psi0: BTreeMap<PartyId, (pi_enc::Commitment, pi_enc::Proof)>,
}

impl<E: Curve> Round2<E> {
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
            K: BTreeMap::new(),
            G: BTreeMap::new(),
            psi0: BTreeMap::new(),
        }
    }
}

impl<E> Round for Round2<E>
where
    E: Curve,
    Scalar<E>: FromHash,
    NonZero<Point<E>>: AlwaysHasAffineX<E>,
{
    type Msg = Msg<E>;
    type Output = Signature<E>;

    fn number(&self) -> RoundNumber {
        2
    }

    fn expects(&self) -> Expects {
        Expects {
            broadcast: true,
            direct: true,
        }
    }

    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError> {
        match &msg.content {
            Msg::Round2Bcast(body) => {
                if body.K == BigNumber::zero() || body.G == BigNumber::zero() {
                    return Err(MessageError::NilFields);
                }
                Ok(())
            }
            // The proof references the K_j broadcast of the same round, which
            // may not have arrived yet; it is checked at the finalize gate.
            Msg::Round2Direct(_) => Ok(()),
            _ => Err(MessageError::InvalidContent),
        }
    }

    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError> {
        match msg.content {
            Msg::Round2Bcast(body) => {
                self.K.insert(msg.from.clone(), body.K);
                self.G.insert(msg.from, body.G);
                Ok(())
            }
            Msg::Round2Direct(body) => {
                self.psi0.insert(msg.from, body.psi0);
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
            psi0,
        } = *self;
        let mut rng = fork_rng(rng);

        // Step 1: check every peer's range proof for K_j
        let peers = ctx.helper.others().cloned().collect::<Vec<_>>();
        let culprits = ctx
            .helper
            .pool()
            .map(peers, |j| {
                let (Some(party), Some(K_j), Some(proof)) =
                    (ctx.parties.get(&j), K.get(&j), psi0.get(&j))
                else {
                    return Some(j);
                };
                let valid = pi_enc::non_interactive::verify(
                    ctx.digest_for(&j),
                    &ctx.aux_i,
                    &pi_enc::Data {
                        key: party.enc.clone(),
                        ciphertext: K_j.clone(),
                    },
                    &proof.0,
                    &ctx.params.pi_enc,
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
                reason: AbortReason::ProofFailure("enc"),
            })));
        }

        // Step 2: absorb the round broadcasts in roster order and derive the
        // echo hash every party must agree on
        let order = ctx.helper.roster().iter().cloned().collect::<Vec<_>>();
        let self_id = ctx.helper.self_id().clone();
        for id in &order {
            let (K_j, G_j) = if *id == self_id {
                (&K_i, &G_i)
            } else {
                (
                    K.get(id).ok_or(Bug::IncompleteRound)?,
                    G.get(id).ok_or(Bug::IncompleteRound)?,
                )
            };
            let transcript = ctx.helper.transcript_mut();
            transcript.write("party", id.as_bytes());
            transcript.write("K", &K_j.to_bytes());
            transcript.write("G", &G_j.to_bytes());
        }
        let echo = ctx.helper.transcript().sum();
        out.broadcast(Msg::Round3Bcast(MsgRound3Bcast { echo }));

        // Step 3: two MtA instances and a log* proof per peer
        let digest = ctx.digest_for(&self_id);
        let gamma_int = scalar_to_bignumber(gamma_i.as_ref());
        let x_int = scalar_to_bignumber(ctx.x_i.as_ref());
        let X_i = *ctx.X.get(&self_id).ok_or(Bug::MissingParty)?;

        let tasks = ctx
            .helper
            .others()
            .cloned()
            .map(|j| (j, fork_rng(&mut rng)))
            .collect::<Vec<_>>();
        let outputs = ctx.helper.pool().map(tasks, |(j, mut prng)| {
            let party = ctx.parties.get(&j).ok_or(Bug::MissingParty)?;
            let K_j = K.get(&j).ok_or(Bug::IncompleteRound)?;
            let aux_j = party.aux();

            let delta = mta::prove_affine(
                &mut prng,
                digest.clone(),
                &gamma_int,
                Gamma_i,
                K_j,
                &ctx.enc_i,
                &party.enc,
                &aux_j,
                &ctx.params.pi_aff,
            )?;
            let chi = mta::prove_affine(
                &mut prng,
                digest.clone(),
                &x_int,
                X_i,
                K_j,
                &ctx.enc_i,
                &party.enc,
                &aux_j,
                &ctx.params.pi_aff,
            )?;
            let psi_prime = pi_log::non_interactive::prove(
                digest.clone(),
                &aux_j,
                &pi_log::Data {
                    key0: ctx.enc_i.clone(),
                    c: G_i.clone(),
                    x: Gamma_i,
                    b: Point::<E>::generator().to_point(),
                },
                &pi_log::PrivateData {
                    x: gamma_int.clone(),
                    nonce: nu_i.clone(),
                },
                &ctx.params.pi_log,
                &mut prng,
            )
            .map_err(|_| Bug::Prove("log*"))?;

            Ok::<_, Bug>((j, delta, chi, psi_prime))
        });

        let mut delta_secrets = BTreeMap::new();
        let mut chi_secrets = BTreeMap::new();
        for output in outputs {
            let (j, delta, chi, psi_prime) = output?;
            out.send(
                &j,
                Msg::Round3Direct(MsgRound3Direct {
                    Gamma: Gamma_i,
                    D: delta.D.clone(),
                    F: delta.F.clone(),
                    hat_D: chi.D.clone(),
                    hat_F: chi.F.clone(),
                    psi: delta.proof,
                    hat_psi: chi.proof,
                    psi_prime,
                }),
            );
            delta_secrets.insert(
                j.clone(),
                MtaReveal {
                    beta: delta.beta,
                    s: delta.s,
                    r: delta.r,
                    D: delta.D,
                    F: delta.F,
                },
            );
            chi_secrets.insert(
                j,
                MtaReveal {
                    beta: chi.beta,
                    s: chi.s,
                    r: chi.r,
                    D: chi.D,
                    F: chi.F,
                },
            );
        }

        Ok(Transition::Next(Box::new(Round3::new(
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
        ))))
    }
}
