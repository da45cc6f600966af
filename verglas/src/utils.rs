use generic_ec::{Curve, NonZero, Scalar};

/// Lagrange coefficient at x = 0 for the signer with share coordinate `x_i`
/// within the signer set `xs`
///
/// Returns `None` if `x_i` is not in the set or the set contains a coordinate
/// twice.
pub(crate) fn lagrange_at_zero<E: Curve>(
    xs: &[NonZero<Scalar<E>>],
    x_i: &NonZero<Scalar<E>>,
) -> Option<Scalar<E>> {
    let mut x_i_observed = false;
    let mut num = Scalar::<E>::one();
    let mut denom = NonZero::<Scalar<E>>::one();

    for x_j in xs {
        let Some(diff) = NonZero::from_scalar(x_j - x_i) else {
            if x_i_observed {
                return None;
            }
            x_i_observed = true;
            continue;
        };
        num *= x_j.as_ref();
        denom = denom * diff;
    }

    if !x_i_observed {
        return None;
    }

    Some(num * denom.invert())
}
