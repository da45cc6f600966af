//! Party identifiers and the signing roster

use core::fmt;

use generic_ec::{Curve, NonZero, Scalar};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier of a protocol participant
///
/// Identifiers are opaque byte strings with a total order. The sorted list of
/// identifiers seeds every binding hash of a session, so all parties must agree
/// on the exact spelling of each identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Constructs an identifier from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Byte representation of the identifier
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Maps the identifier to a non-zero field element
    ///
    /// The resulting scalar serves as the x-coordinate of this party's secret
    /// share in polynomial secret sharing. The mapping is a tagged hash, so all
    /// parties derive the same coordinate without coordination.
    pub fn to_scalar<E: Curve>(&self) -> NonZero<Scalar<E>> {
        let mut ctr = 0u64;
        loop {
            let digest = Sha256::new()
                .chain_update(b"verglas/party-scalar")
                .chain_update((self.0.len() as u64).to_be_bytes())
                .chain_update(self.0.as_bytes())
                .chain_update(ctr.to_be_bytes())
                .finalize();
            let scalar = Scalar::from_be_bytes_mod_order(digest);
            if let Some(scalar) = NonZero::from_scalar(scalar) {
                return scalar;
            }
            ctr += 1;
        }
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for PartyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Same party appears twice in a signer list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate party `{0}` in the signer list")]
pub struct DuplicateParty(pub PartyId);

/// Deduplicated, ascending list of signers
///
/// The roster fixes the canonical order in which messages are absorbed into
/// transcripts, independent of network arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(Vec<PartyId>);

impl Roster {
    /// Sorts `ids` and checks for duplicates
    pub fn new(ids: &[PartyId]) -> Result<Self, DuplicateParty> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        for win in ids.windows(2) {
            if win[0] == win[1] {
                return Err(DuplicateParty(win[0].clone()));
            }
        }
        Ok(Self(ids))
    }

    /// Amount of signers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the roster is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `id` belongs to the roster
    pub fn contains(&self, id: &PartyId) -> bool {
        self.0.binary_search(id).is_ok()
    }

    /// Signers in canonical (ascending) order
    pub fn iter(&self) -> impl Iterator<Item = &PartyId> {
        self.0.iter()
    }

    /// All signers except `id`, in canonical order
    pub fn others<'r>(&'r self, id: &'r PartyId) -> impl Iterator<Item = &'r PartyId> {
        self.0.iter().filter(move |other| *other != id)
    }

    /// Signers as a slice, in canonical order
    pub fn as_slice(&self) -> &[PartyId] {
        &self.0
    }

    /// Share x-coordinates of all signers, in canonical order
    pub fn scalars<E: Curve>(&self) -> Vec<NonZero<Scalar<E>>> {
        self.0.iter().map(|id| id.to_scalar()).collect()
    }
}
