//! Per-session services shared by every round

use serde::Serialize;

use crate::party::{PartyId, Roster};
use crate::pool::Pool;
use crate::round::{RoundNumber, StartError};
use crate::transcript::Transcript;

/// Descriptor of a started protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Info {
    /// Protocol identifier, e.g. `"cmp/sign"`
    pub protocol_id: &'static str,
    /// Number of the last regular round
    pub final_round: RoundNumber,
    /// The local party
    pub self_id: PartyId,
    /// All other signers, in canonical order
    pub other_ids: Vec<PartyId>,
    /// Threshold `t`; any `t + 1` signers can produce a signature
    pub threshold: u16,
}

/// Identity, transcript and pool of a running session
///
/// A `Helper` is created by the protocol start function and moved from round
/// to round. The rolling transcript absorbs broadcast data in canonical roster
/// order; per-prover challenges are sampled from [forks](Helper::hash_for_id).
#[derive(Debug)]
pub struct Helper {
    protocol_id: &'static str,
    final_round: RoundNumber,
    threshold: u16,
    self_id: PartyId,
    roster: Roster,
    ssid: [u8; 32],
    transcript: Transcript,
    pool: Pool,
}

impl Helper {
    pub(crate) fn new(
        protocol_id: &'static str,
        curve: &'static str,
        final_round: RoundNumber,
        threshold: u16,
        self_id: PartyId,
        roster: Roster,
        config_hash: [u8; 32],
        tag: Option<(&'static str, &[u8])>,
    ) -> Result<Self, StartError> {
        if !roster.contains(&self_id) {
            return Err(StartError::SelfNotInRoster);
        }

        let mut sid = Transcript::tagged("verglas/sid");
        sid.write("protocol", protocol_id.as_bytes());
        sid.write("curve", curve.as_bytes());
        sid.write("config", &config_hash);
        for id in roster.iter() {
            sid.write("signer", id.as_bytes());
        }
        if let Some((label, bytes)) = tag {
            sid.write(label, bytes);
        }
        let ssid = sid.sum();

        Ok(Self {
            protocol_id,
            final_round,
            threshold,
            self_id,
            roster,
            ssid,
            transcript: Transcript::new(&ssid),
            pool: Pool::default(),
        })
    }

    /// Session identifier binding every proof of this session
    pub fn ssid(&self) -> &[u8; 32] {
        &self.ssid
    }

    /// The local party
    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// All signers, in canonical order
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// All signers except the local party
    pub fn others(&self) -> impl Iterator<Item = &PartyId> {
        self.roster.others(&self.self_id)
    }

    /// Threshold of the key
    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Current state of the rolling transcript
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Absorbs data into the rolling transcript
    ///
    /// Callers must absorb broadcast data in canonical roster order, never in
    /// arrival order.
    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Transcript fork for Fiat-Shamir challenges of prover `id`
    pub fn hash_for_id(&self, id: &PartyId) -> Transcript {
        self.transcript.fork(id)
    }

    pub(crate) fn pool(&self) -> Pool {
        self.pool
    }

    /// Descriptor of this session
    pub fn info(&self) -> Info {
        Info {
            protocol_id: self.protocol_id,
            final_round: self.final_round,
            self_id: self.self_id.clone(),
            other_ids: self.others().cloned().collect(),
            threshold: self.threshold,
        }
    }
}
