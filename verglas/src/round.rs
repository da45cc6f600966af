//! Round, message and session abstractions
//!
//! A protocol is an ordered sequence of rounds. Each round consumes the
//! messages addressed to it, is frozen by [`Round::finalize`] and either hands
//! over to the next round or terminates the session. The [driver](crate::driver)
//! owns the current round and shepherds messages into it.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::party::{DuplicateParty, PartyId};

/// Monotonic round counter, starting at 1
pub type RoundNumber = u16;

/// How a message travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Delivery {
    /// Sent to every other party
    Broadcast,
    /// Sent to a single party
    Direct,
}

/// Protocol message content, tagged by the round that consumes it
pub trait RoundMsg: Clone {
    /// Number of the round this content belongs to
    fn round(&self) -> RoundNumber;
    /// Whether this content is broadcast or sent directly
    fn kind(&self) -> Delivery;
}

/// A message in flight between two parties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<M> {
    /// Sender
    pub from: PartyId,
    /// Recipient; `None` means broadcast
    pub to: Option<PartyId>,
    /// Round-tagged payload
    pub content: M,
}

impl<M: RoundMsg> Message<M> {
    /// Number of the round this message belongs to
    pub fn round(&self) -> RoundNumber {
        self.content.round()
    }

    /// Whether the message is a broadcast
    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }
}

/// Message kinds a round waits for from every peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expects {
    /// One broadcast message per peer
    pub broadcast: bool,
    /// One direct message per peer
    pub direct: bool,
}

/// Collects the messages a round emits while finalizing
#[derive(Debug)]
pub struct Outbox<M> {
    from: PartyId,
    messages: Vec<Message<M>>,
}

impl<M> Outbox<M> {
    pub(crate) fn new(from: PartyId) -> Self {
        Self {
            from,
            messages: Vec::new(),
        }
    }

    /// Emits a message to every other party
    pub fn broadcast(&mut self, content: M) {
        self.messages.push(Message {
            from: self.from.clone(),
            to: None,
            content,
        });
    }

    /// Emits a message to a single party
    pub fn send(&mut self, to: &PartyId, content: M) {
        self.messages.push(Message {
            from: self.from.clone(),
            to: Some(to.clone()),
            content,
        });
    }

    pub(crate) fn into_messages(self) -> Vec<Message<M>> {
        self.messages
    }
}

/// What a finalized round turns into
pub enum Transition<M, O> {
    /// Protocol continues with the next round
    Next(Box<dyn Round<Msg = M, Output = O>>),
    /// Protocol terminated
    Final(Session<O>),
}

/// Terminal state of a session
///
/// Once a session is terminal, no further messages are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session<O> {
    /// Protocol produced its output
    Completed(O),
    /// Protocol detected misbehavior or was cancelled
    Aborted(Abort),
}

impl<O> Session<O> {
    /// Output of a completed session
    pub fn completed(&self) -> Option<&O> {
        match self {
            Session::Completed(output) => Some(output),
            Session::Aborted(_) => None,
        }
    }

    /// Abort evidence of an aborted session
    pub fn aborted(&self) -> Option<&Abort> {
        match self {
            Session::Completed(_) => None,
            Session::Aborted(abort) => Some(abort),
        }
    }
}

/// Evidence attached to an aborted session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abort {
    /// Parties identified as misbehaving
    ///
    /// When attribution is impossible (diverging broadcasts without a reliable
    /// broadcast channel underneath), the whole roster is listed as suspect and
    /// the caller decides how to proceed.
    pub culprits: Vec<PartyId>,
    /// Why the session aborted
    pub reason: AbortReason,
}

/// Reason of a session abort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// A zero-knowledge proof or a signature share failed to verify
    #[error("{0} verification failed")]
    ProofFailure(&'static str),
    /// Parties observed different broadcasts in the same round
    #[error("broadcast echoes diverged")]
    EchoMismatch,
    /// Revealed delta shares do not match the transcript
    #[error("delta shares are inconsistent")]
    DeltaInconsistency,
    /// Revealed sigma shares do not match the transcript
    #[error("sigma shares are inconsistent")]
    SigmaInconsistency,
    /// The caller cancelled the session
    #[error("session cancelled")]
    Cancelled,
}

/// A single round of a protocol
///
/// `verify_message` is a pure predicate over the round state; `store_message`
/// is the only mutation point and is called once per accepted message;
/// `finalize` runs when the [completeness gate](Round::expects) is satisfied.
pub trait Round {
    /// Protocol message type
    type Msg: RoundMsg;
    /// Protocol output type
    type Output;

    /// Number of this round
    fn number(&self) -> RoundNumber;

    /// Message kinds this round waits for from every peer
    fn expects(&self) -> Expects;

    /// Checks a message without mutating the round
    fn verify_message(&self, msg: &Message<Self::Msg>) -> Result<(), MessageError>;

    /// Stores a verified message
    fn store_message(&mut self, msg: Message<Self::Msg>) -> Result<(), MessageError>;

    /// Freezes the round, emits outgoing messages and yields the successor
    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
        out: &mut Outbox<Self::Msg>,
    ) -> Result<Transition<Self::Msg, Self::Output>, InternalError>;
}

/// Why a message was rejected
#[derive(Debug, Error)]
pub enum MessageError {
    /// Content variant does not match the round or the delivery kind
    #[error("message content does not belong to this round")]
    InvalidContent,
    /// A required field is absent or degenerate (zero value, identity point)
    #[error("a required field is missing or zero")]
    NilFields,
    /// A cryptographic check failed; fatal, attributes the sender
    #[error("{kind} verification failed for message from {from}")]
    ProofFailure {
        /// Which proof system rejected the message
        kind: &'static str,
        /// The sender of the failing message
        from: PartyId,
    },
    /// Sender is not part of the signing roster
    #[error("sender is not in the roster")]
    UnknownSender,
    /// Direct message addressed to a different party
    #[error("message addressed to another party")]
    WrongRecipient,
    /// A party fed its own message back
    #[error("message sent by this party itself")]
    OwnMessage,
    /// Message belongs to a round that already completed
    #[error("round {round} message arrived while round {current} is active")]
    Stale {
        /// Round of the rejected message
        round: RoundNumber,
        /// Round currently active
        current: RoundNumber,
    },
    /// Second message of the same kind from the same party
    #[error("duplicate round {round} message")]
    Duplicate {
        /// Round of the rejected message
        round: RoundNumber,
    },
    /// Round number can never occur in this protocol
    #[error("round {round} is outside of the protocol")]
    OutOfProtocol {
        /// Round of the rejected message
        round: RoundNumber,
    },
}

impl MessageError {
    /// Whether this error identifies the sender as a cheater
    ///
    /// Fault errors terminate the session with the sender as culprit; all other
    /// errors only drop the message.
    pub fn is_fault(&self) -> bool {
        matches!(self, MessageError::ProofFailure { .. })
    }
}

/// Error preventing a protocol from starting
#[derive(Debug, Error)]
pub enum StartError {
    /// Signer list is smaller than the threshold requires
    #[error("signer list contains {n} parties, at least {required} required")]
    InsufficientSigners {
        /// Parties in the provided list
        n: usize,
        /// Minimal amount of signers (threshold plus one)
        required: usize,
    },
    /// Signer list contains a party twice
    #[error(transparent)]
    DuplicateParty(#[from] DuplicateParty),
    /// The local party is not part of the signer list
    #[error("local party is not in the signer list")]
    SelfNotInRoster,
    /// X-only public key has no valid even-Y lift matching the shares
    #[error("taproot public key has no valid lift")]
    InvalidTaprootKey,
    /// No verification share is known for a signer
    #[error("no verification share for party {0}")]
    MissingVerificationShare(PartyId),
    /// Key material is malformed
    #[error("invalid key config: {0}")]
    InvalidKeyConfig(&'static str),
}

/// Internal error; indicates a bug or broken key material, not misbehavior of
/// a peer
///
/// Please report this issue if you encounter it.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InternalError(#[from] Bug);

#[derive(Debug, Error)]
pub(crate) enum Bug {
    #[error("paillier encryption failed")]
    PaillierEncrypt,
    #[error("paillier homomorphic operation failed")]
    PaillierOp,
    #[error("paillier decryption failed")]
    PaillierDecrypt,
    #[error("{0} proof generation failed")]
    Prove(&'static str),
    #[error("round finalized without a stored message")]
    IncompleteRound,
    #[error("party is missing from the session context")]
    MissingParty,
    #[error("delta turned out to be zero")]
    ZeroDelta,
    #[error("nonce point is zero")]
    ZeroR,
    #[error("signature degenerated to zero scalars")]
    ZeroSignature,
    #[error("lagrange coefficient is undefined for this signer set")]
    LagrangeCoefficient,
    #[error("aggregated signature failed to verify")]
    InvalidAggregate,
    #[error("round received a message it never expects")]
    UnexpectedMessage,
}
