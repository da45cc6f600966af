//! Session-bound transcript hash
//!
//! Every zero-knowledge proof and every challenge of a session is derived from
//! a [`Transcript`] rooted at the session identifier. A transcript is an
//! incremental SHA-256 over length-prefixed, labeled chunks; two honest parties
//! that observed the same broadcast history hold byte-identical transcripts at
//! every point where a challenge is sampled.

use digest::Digest as _;
use generic_ec::{Curve, Point, Scalar};
use sha2::Sha256;

use crate::party::PartyId;

/// Append-only, domain-separated incremental hash
///
/// Cloning a transcript yields an independent copy; there is no shared mutable
/// state between a transcript and its [forks](Transcript::fork).
#[derive(Debug, Clone)]
pub struct Transcript {
    hash: Sha256,
}

impl Transcript {
    /// Transcript rooted at a session identifier
    pub fn new(sid: &[u8]) -> Self {
        let mut transcript = Self::tagged("verglas/session");
        transcript.write("sid", sid);
        transcript
    }

    /// Standalone transcript under a fixed domain tag
    ///
    /// Used for hashes that must not depend on the session (e.g. the Schnorr
    /// challenge, which stays externally verifiable).
    pub fn tagged(domain: &str) -> Self {
        let mut transcript = Self { hash: Sha256::new() };
        transcript.write("domain", domain.as_bytes());
        transcript
    }

    /// Appends a labeled chunk
    ///
    /// Both the label and the data are length-prefixed, so distinct sequences
    /// of writes can never produce the same stream.
    pub fn write(&mut self, label: &str, data: &[u8]) {
        self.hash.update((label.len() as u64).to_be_bytes());
        self.hash.update(label.as_bytes());
        self.hash.update((data.len() as u64).to_be_bytes());
        self.hash.update(data);
    }

    /// Appends a curve point (compressed encoding)
    pub fn write_point<E: Curve>(&mut self, label: &str, point: &Point<E>) {
        self.write(label, point.to_bytes(true).as_ref())
    }

    /// Appends a scalar (big-endian encoding)
    pub fn write_scalar<E: Curve>(&mut self, label: &str, scalar: &Scalar<E>) {
        self.write(label, scalar.to_be_bytes().as_ref())
    }

    /// Independent transcript clone that additionally absorbs `id`
    ///
    /// Per-prover Fiat-Shamir challenges are sampled from the prover's fork, so
    /// proofs produced by different parties over the same history stay bound to
    /// their author.
    pub fn fork(&self, id: &PartyId) -> Transcript {
        let mut fork = self.clone();
        fork.write("party", id.as_bytes());
        fork
    }

    /// Finalizes without consuming the state
    pub fn sum(&self) -> [u8; 32] {
        self.hash.clone().finalize().into()
    }

    /// Samples a scalar challenge under `label`
    pub fn challenge<E: Curve>(&self, label: &str) -> Scalar<E> {
        let mut fork = self.clone();
        fork.write("challenge", label.as_bytes());
        Scalar::from_be_bytes_mod_order(fork.sum())
    }

    /// Hands the inner digest to a proof system as Fiat-Shamir shared state
    pub(crate) fn into_digest(self) -> Sha256 {
        self.hash
    }
}
