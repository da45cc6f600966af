//! BIP-340 parity and challenge helpers

use std::sync::OnceLock;

use digest::Digest;
use generic_ec::{curves::Secp256k1, Curve, Point, Scalar};
use sha2::Sha256;

/// Whether the point has an even Y coordinate
///
/// First byte of a compressed non-zero point is either 2 or 3; 2 means the Y
/// coordinate is even.
pub(super) fn has_even_y<E: Curve>(point: &Point<E>) -> bool {
    point.is_zero() || point.to_bytes(true).as_ref()[0] == 2
}

/// X-only encoding of a non-zero point
pub(super) fn xonly(point: &Point<Secp256k1>) -> [u8; 32] {
    let bytes = point.to_bytes(true);
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes.as_ref()[1..33]);
    out
}

/// Reconstructs the even-Y point with the given X coordinate
pub(super) fn lift_x(x: &[u8; 32]) -> Option<Point<Secp256k1>> {
    let mut buf = [0u8; 33];
    buf[0] = 2;
    buf[1..].copy_from_slice(x);
    Point::from_bytes(&buf).ok()
}

/// `int(hash_tag("BIP0340/challenge", xonly(R) ∥ xonly(Y) ∥ m)) mod n`
pub(super) fn challenge<E: Curve>(
    group_commitment: &Point<E>,
    group_key: &Point<E>,
    msg: &[u8],
) -> Scalar<E> {
    let digest = challenge_hash()
        .chain_update(&group_commitment.to_bytes(true).as_ref()[1..])
        .chain_update(&group_key.to_bytes(true).as_ref()[1..])
        .chain_update(msg)
        .finalize();
    Scalar::from_be_bytes_mod_order(digest)
}

fn challenge_hash() -> Sha256 {
    static PRECOMPUTED: OnceLock<Sha256> = OnceLock::new();
    PRECOMPUTED
        .get_or_init(|| {
            let tag = Sha256::digest("BIP0340/challenge");
            Sha256::new().chain_update(tag).chain_update(tag)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use generic_ec::SecretScalar;

    use super::*;

    #[test]
    fn lift_x_produces_even_points() {
        let mut rng = rand_dev::DevRng::new();
        for _ in 0..16 {
            let secret = SecretScalar::<Secp256k1>::random(&mut rng);
            let point = Point::generator() * &secret;
            let lifted = lift_x(&xonly(&point)).unwrap();
            assert!(has_even_y(&lifted));
            assert!(lifted == point || lifted == -point);
        }
    }
}
