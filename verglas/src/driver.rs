//! Dispatch loop driving a session
//!
//! One [`Driver`] exists per party per session. The caller feeds inbound
//! messages with [`Driver::handle`] and ships the messages drained from
//! [`Driver::outgoing`] over its transport. The driver buffers messages that
//! arrive ahead of the current round, drops stale and duplicate traffic, and
//! finalizes a round once every expected peer message has been verified and
//! stored.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use rand_core::CryptoRngCore;
use thiserror::Error;

use crate::helper::Info;
use crate::party::PartyId;
use crate::round::{
    Abort, AbortReason, Delivery, InternalError, Message, MessageError, Outbox, Round, RoundMsg,
    RoundNumber, Session, StartError, Transition,
};

/// Rounds past `Info::final_round` reserved for abort subprotocols.
const ABORT_EXTENSION: RoundNumber = 2;

/// Drives one party through a protocol session
pub struct Driver<M: RoundMsg, O> {
    info: Info,
    round: Option<Box<dyn Round<Msg = M, Output = O>>>,
    buffered: BTreeMap<RoundNumber, Vec<Message<M>>>,
    received: BTreeSet<(PartyId, Delivery)>,
    outgoing: Vec<Message<M>>,
    finished: Option<Session<O>>,
    rng: Box<dyn CryptoRngCore>,
}

impl<M: RoundMsg, O> Driver<M, O> {
    /// Invokes a protocol start function and advances through any round that
    /// expects no messages
    ///
    /// ```rust,ignore
    /// let mut driver = Driver::start(frost::sign(&key, &signers, &msg), OsRng)?;
    /// ```
    pub fn start<F>(start: F, rng: impl CryptoRngCore + 'static) -> Result<Self, Error>
    where
        F: FnOnce() -> Result<(Box<dyn Round<Msg = M, Output = O>>, Info), StartError>,
    {
        let (round, info) = start().map_err(Error::Start)?;
        let mut driver = Self {
            info,
            round: Some(round),
            buffered: BTreeMap::new(),
            received: BTreeSet::new(),
            outgoing: Vec::new(),
            finished: None,
            rng: Box::new(rng),
        };
        driver.advance()?;
        Ok(driver)
    }

    /// Descriptor of the running protocol
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Terminal state, once the session completed or aborted
    pub fn session(&self) -> Option<&Session<O>> {
        self.finished.as_ref()
    }

    /// Whether the session reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Number of the round currently waiting for messages
    pub fn current_round(&self) -> Option<RoundNumber> {
        self.round.as_ref().map(|round| round.number())
    }

    /// Drains the messages emitted since the last call
    pub fn outgoing(&mut self) -> Vec<Message<M>> {
        mem::take(&mut self.outgoing)
    }

    /// Cooperative shutdown: stop accepting messages and drop round state
    ///
    /// Secrets owned by the current round are wiped when the round is dropped.
    pub fn cancel(&mut self) {
        if self.finished.is_none() {
            self.round = None;
            self.buffered.clear();
            self.finished = Some(Session::Aborted(Abort {
                culprits: Vec::new(),
                reason: AbortReason::Cancelled,
            }));
        }
    }

    /// Feeds one inbound message
    ///
    /// Structural rejections (stale round, duplicate, unknown sender, …) are
    /// returned as [`Error::Message`] and leave the session running. A failed
    /// cryptographic check terminates the session as aborted with the sender
    /// as culprit and returns `Ok`.
    pub fn handle(&mut self, msg: Message<M>) -> Result<(), Error> {
        if self.finished.is_some() {
            return Err(Error::Finished);
        }
        let Some(round) = self.round.as_ref() else {
            return Err(Error::Finished);
        };
        let current = round.number();

        self.check_envelope(&msg).map_err(Error::Message)?;

        let n = msg.round();
        if n < current {
            return Err(Error::Message(MessageError::Stale { round: n, current }));
        }
        if n > current {
            if n > self.info.final_round + ABORT_EXTENSION {
                return Err(Error::Message(MessageError::OutOfProtocol { round: n }));
            }
            tracing::debug!(round = n, current, from = %msg.from, "buffering message for a future round");
            self.buffered.entry(n).or_default().push(msg);
            return Ok(());
        }

        self.deliver(msg).map_err(Error::Message)?;
        self.advance()
    }

    /// Roster, recipient and duplicate checks that do not depend on round state
    fn check_envelope(&self, msg: &Message<M>) -> Result<(), MessageError> {
        if msg.from == self.info.self_id {
            return Err(MessageError::OwnMessage);
        }
        if !self.info.other_ids.contains(&msg.from) {
            tracing::warn!(from = %msg.from, "dropping message from a party outside of the roster");
            return Err(MessageError::UnknownSender);
        }
        match (&msg.to, msg.content.kind()) {
            (None, Delivery::Broadcast) => Ok(()),
            (Some(to), Delivery::Direct) if *to == self.info.self_id => Ok(()),
            (Some(_), Delivery::Direct) => Err(MessageError::WrongRecipient),
            _ => Err(MessageError::InvalidContent),
        }
    }

    /// Verifies and stores a message for the current round
    fn deliver(&mut self, msg: Message<M>) -> Result<(), MessageError> {
        let Some(round) = self.round.as_mut() else {
            return Err(MessageError::Stale {
                round: msg.round(),
                current: 0,
            });
        };
        let key = (msg.from.clone(), msg.content.kind());
        if self.received.contains(&key) {
            return Err(MessageError::Duplicate { round: msg.round() });
        }

        if let Err(err) = round.verify_message(&msg) {
            if err.is_fault() {
                tracing::warn!(from = %msg.from, %err, "cryptographic check failed, aborting session");
                self.round = None;
                self.buffered.clear();
                self.finished = Some(Session::Aborted(Abort {
                    culprits: vec![msg.from],
                    reason: match err {
                        MessageError::ProofFailure { kind, .. } => AbortReason::ProofFailure(kind),
                        _ => AbortReason::ProofFailure("message"),
                    },
                }));
                return Ok(());
            }
            return Err(err);
        }

        round.store_message(msg)?;
        self.received.insert(key);
        Ok(())
    }

    /// Whether every expected message of the current round arrived
    fn gate_complete(&self) -> bool {
        let Some(round) = self.round.as_ref() else {
            return false;
        };
        let expects = round.expects();
        self.info.other_ids.iter().all(|peer| {
            (!expects.broadcast || self.received.contains(&(peer.clone(), Delivery::Broadcast)))
                && (!expects.direct || self.received.contains(&(peer.clone(), Delivery::Direct)))
        })
    }

    /// Finalizes rounds for as long as their completeness gates are satisfied
    fn advance(&mut self) -> Result<(), Error> {
        while self.finished.is_none() && self.gate_complete() {
            let Some(round) = self.round.take() else {
                break;
            };
            let mut out = Outbox::new(self.info.self_id.clone());
            match round.finalize(self.rng.as_mut(), &mut out) {
                Ok(Transition::Next(next)) => {
                    let n = next.number();
                    tracing::debug!(round = n, "advanced to the next round");
                    self.received.clear();
                    self.round = Some(next);
                    self.outgoing.append(&mut out.into_messages());
                    for msg in self.buffered.remove(&n).unwrap_or_default() {
                        if let Err(err) = self.deliver(msg) {
                            tracing::warn!(%err, "dropping buffered message");
                        }
                        if self.finished.is_some() {
                            return Ok(());
                        }
                    }
                }
                Ok(Transition::Final(session)) => {
                    tracing::debug!("session reached a terminal state");
                    self.buffered.clear();
                    self.outgoing.append(&mut out.into_messages());
                    self.finished = Some(session);
                }
                Err(err) => {
                    self.buffered.clear();
                    return Err(Error::Internal(err));
                }
            }
        }
        Ok(())
    }
}

/// Error surfaced by the driver
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol failed to start; no round was created
    #[error("failed to start the protocol")]
    Start(#[source] StartError),
    /// Inbound message was dropped; the session keeps running
    #[error("message rejected")]
    Message(#[source] MessageError),
    /// Session is terminal and accepts no further messages
    #[error("session already finished")]
    Finished,
    /// Bug or broken key material; the session is dead without culprit
    /// attribution
    #[error("internal error")]
    Internal(#[source] InternalError),
}
