//! Polynomial evaluation, commitment evaluation and Lagrange interpolation.

use alloc::collections::BTreeMap;
use core::iter;

use rand_core::{CryptoRng, RngCore};

use crate::{group::MemberIndex, Ciphersuite, Element, Error, Field, Group, Scalar};

/// Generates `size` random coefficients of a secret polynomial.
pub(crate) fn generate_coefficients<C: Ciphersuite, R: RngCore + CryptoRng>(
    size: usize,
    rng: &mut R,
) -> Vec<Scalar<C>> {
    iter::repeat_with(|| <<C::Group as Group>::Field>::random(rng))
        .take(size)
        .collect()
}

/// Evaluates the polynomial with the given coefficients at `x`, using
/// Horner's method.
pub(crate) fn evaluate_polynomial<C: Ciphersuite>(
    x: Scalar<C>,
    coefficients: &[Scalar<C>],
) -> Scalar<C> {
    let mut value = <<C::Group as Group>::Field>::zero();
    for coefficient in coefficients.iter().rev() {
        value = value * x + *coefficient;
    }
    value
}

/// Evaluates `Σ E_k·x^k` over a list of committed coefficients, where `x` is
/// the member index.
pub(crate) fn evaluate_commitments<C: Ciphersuite>(
    member: MemberIndex,
    commitments: &[Element<C>],
) -> Element<C> {
    let x = member.to_scalar::<C>();
    let (_, result) = commitments.iter().fold(
        (
            <<C::Group as Group>::Field>::one(),
            <C::Group>::identity(),
        ),
        |(x_to_the_k, sum_so_far), commitment_k| {
            (x * x_to_the_k, sum_so_far + *commitment_k * x_to_the_k)
        },
    );
    result
}

/// Interpolates the polynomial defined by `shares` (index to share value) at
/// `x`, using Lagrange coefficients.
pub(crate) fn interpolate<C: Ciphersuite>(
    shares: &BTreeMap<MemberIndex, Scalar<C>>,
    x: Scalar<C>,
) -> Result<Scalar<C>, Error> {
    let mut value = <<C::Group as Group>::Field>::zero();
    for (i, share) in shares {
        value = value + *share * lagrange_coefficient::<C>(shares.keys(), *i, x)?;
    }
    Ok(value)
}

/// Computes `λ_i(x) = Π_{j≠i} (x - x_j) / (x_i - x_j)`.
fn lagrange_coefficient<'a, C: Ciphersuite>(
    x_set: impl Iterator<Item = &'a MemberIndex>,
    x_i: MemberIndex,
    x: Scalar<C>,
) -> Result<Scalar<C>, Error> {
    let mut numerator = <<C::Group as Group>::Field>::one();
    let mut denominator = <<C::Group as Group>::Field>::one();
    let x_i_scalar = x_i.to_scalar::<C>();

    for x_j in x_set {
        if *x_j == x_i {
            continue;
        }
        let x_j_scalar = x_j.to_scalar::<C>();
        numerator = numerator * (x - x_j_scalar);
        denominator = denominator * (x_i_scalar - x_j_scalar);
    }

    let inverse =
        <<C::Group as Group>::Field>::invert(&denominator).map_err(|_| Error::DuplicatedShares)?;
    Ok(numerator * inverse)
}
