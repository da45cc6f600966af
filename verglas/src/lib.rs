//! Round-based threshold signing
//!
//! This crate implements the core of a multi-party threshold-signature stack:
//! a generic [round driver](driver) that shepherds a set of parties through an
//! ordered sequence of message-exchange rounds, and two signing protocols on
//! top of it:
//!
//! * [CMP threshold ECDSA](cmp) — five rounds combining Paillier-based
//!   multiplicative-to-additive share conversion, zero-knowledge proofs and an
//!   identifiable-abort fallback;
//! * [FROST threshold Schnorr](frost) — three rounds, with plain and
//!   Taproot/BIP-340 output.
//!
//! Key generation, key refresh and transport are external: the protocols
//! consume opaque key material ([`cmp::KeyConfig`], [`frost::KeyResult`]) and
//! the driver exchanges discrete [`Message`]s that the caller ships over any
//! authenticated channel.
//!
//! ## Running a protocol
//!
//! Each party creates a [`Driver`] from a protocol start function, then loops:
//! feed every inbound message into [`Driver::handle`], send everything drained
//! from [`Driver::outgoing`], until [`Driver::session`] turns terminal —
//! either `Completed(signature)` or `Aborted(culprits)`.
//!
//! ```rust,no_run
//! # fn main() -> Result<(), verglas::Error> {
//! # let key: verglas::frost::KeyResult<verglas::generic_ec::curves::Secp256k1> = unimplemented!();
//! use verglas::{Driver, PartyId};
//!
//! let signers = [PartyId::from("alice"), PartyId::from("bob"), PartyId::from("carol")];
//! let msg_hash = [0u8; 32];
//!
//! let mut driver = Driver::start(
//!     verglas::frost::sign(&key, &signers, &msg_hash),
//!     rand_core::OsRng,
//! )?;
//! loop {
//!     for msg in driver.outgoing() {
//!         // ship msg to its recipient(s)
//!     }
//!     if driver.session().is_some() {
//!         // session is Completed(signature) or Aborted(culprits)
//!         break;
//!     }
//!     // receive the next message from the network
//!     # let inbound = unimplemented!();
//!     driver.handle(inbound)?;
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used, clippy::panic))]
#![allow(non_snake_case, clippy::type_complexity)]

pub use generic_ec;
pub use paillier_zk;

pub mod cmp;
pub mod driver;
pub mod frost;
mod helper;
mod party;
mod pool;
mod round;
mod transcript;
mod utils;

pub use self::{
    driver::{Driver, Error},
    helper::{Helper, Info},
    party::{DuplicateParty, PartyId, Roster},
    pool::Pool,
    round::{
        Abort, AbortReason, Delivery, Expects, InternalError, Message, MessageError, Outbox, Round,
        RoundMsg, RoundNumber, Session, StartError, Transition,
    },
    transcript::Transcript,
};
