//! Security parameters of the zero-knowledge layer

use generic_ec::{Curve, Scalar};
use paillier_zk::libpaillier::unknown_order::BigNumber;
use paillier_zk::{
    group_element_vs_paillier_encryption_in_range as pi_log,
    paillier_affine_operation_in_range as pi_aff, paillier_encryption_in_range as pi_enc,
};

/// Range bound (in bits) of the secret plaintexts; matches the curve order.
pub(crate) const ELL: usize = 256;
/// Slack of the range proofs.
pub(crate) const EPSILON: usize = 384;
/// Range bound (in bits) of the MtA additive shares `β`.
pub(crate) const ELL_PRIME: usize = 768;

/// Parameters shared by every proof of a session
pub(crate) struct ZkParams {
    pub pi_enc: pi_enc::SecurityParams,
    pub pi_aff: pi_aff::SecurityParams,
    pub pi_log: pi_log::SecurityParams,
}

impl ZkParams {
    pub fn new<E: Curve>() -> Self {
        let q = curve_order::<E>();
        Self {
            pi_enc: pi_enc::SecurityParams {
                l: ELL,
                epsilon: EPSILON,
                q: q.clone(),
            },
            pi_aff: pi_aff::SecurityParams {
                l_x: ELL,
                l_y: ELL_PRIME,
                epsilon: EPSILON,
                q: q.clone(),
            },
            pi_log: pi_log::SecurityParams {
                l: ELL,
                epsilon: EPSILON,
                q,
            },
        }
    }
}

/// Order of the curve as a big number
pub(crate) fn curve_order<E: Curve>() -> BigNumber {
    BigNumber::from_slice(&Scalar::<E>::from(-1).to_be_bytes()) + BigNumber::one()
}

/// Big-endian scalar as a (non-negative) big number
pub(crate) fn scalar_to_bignumber<E: Curve>(scalar: &Scalar<E>) -> BigNumber {
    BigNumber::from_slice(&scalar.to_be_bytes())
}
