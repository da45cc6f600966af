//! Key material consumed by the signing protocol
//!
//! The config is produced by an external key generation and refresh stack;
//! this crate treats it as an opaque input and only hashes its public part
//! into the session identifier.

use std::collections::BTreeMap;

use generic_ec::{Curve, Point, SecretScalar};
use paillier_zk::libpaillier::{unknown_order::BigNumber, EncryptionKey};
use serde::{Deserialize, Serialize};

use crate::party::PartyId;
use crate::transcript::Transcript;

/// Public key material of one party
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PartyPublic<E: Curve> {
    /// ECDSA public share
    pub ecdsa: Point<E>,
    /// ElGamal public key
    pub elgamal: Point<E>,
    /// Paillier encryption key (modulus `N`)
    pub paillier: EncryptionKey,
    /// Pedersen parameter `s`
    pub pedersen_s: BigNumber,
    /// Pedersen parameter `t`
    pub pedersen_t: BigNumber,
}

/// Key material of one CMP signer
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct KeyConfig<E: Curve> {
    /// The local party
    pub self_id: PartyId,
    /// Threshold `t`; any `t + 1` signers can sign
    pub threshold: u16,
    /// Random identifier agreed on at key generation
    pub rid: [u8; 32],
    /// Auxiliary chain key agreed on at key generation
    pub chain_key: [u8; 32],
    /// Group public key
    pub public_key: Point<E>,
    /// Own ECDSA secret share
    pub ecdsa: SecretScalar<E>,
    /// Own ElGamal secret key
    pub elgamal: SecretScalar<E>,
    /// First Paillier prime
    pub paillier_p: BigNumber,
    /// Second Paillier prime
    pub paillier_q: BigNumber,
    /// Public material of every party co-holding the key
    pub parties: BTreeMap<PartyId, PartyPublic<E>>,
}

impl<E: Curve> KeyConfig<E> {
    /// Digest of the public part of the config; seeds the session identifier
    pub fn config_hash(&self) -> [u8; 32] {
        let mut t = Transcript::tagged("cmp/config");
        t.write("threshold", &self.threshold.to_be_bytes());
        t.write("rid", &self.rid);
        t.write("chain key", &self.chain_key);
        t.write_point("public key", &self.public_key);
        for (id, party) in &self.parties {
            t.write("party", id.as_bytes());
            t.write_point("ecdsa share", &party.ecdsa);
            t.write_point("elgamal key", &party.elgamal);
            t.write("paillier modulus", &party.paillier.n().to_bytes());
            t.write("pedersen s", &party.pedersen_s.to_bytes());
            t.write("pedersen t", &party.pedersen_t.to_bytes());
        }
        t.sum()
    }
}
