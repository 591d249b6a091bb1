//! Sample count scaling.

use crate::domain::StackSamples;

/// Rescale every count in `stacks` by `ratio`, flooring each result.
///
/// Entries whose scaled count floors to zero are dropped. A ratio of exactly
/// 1 returns the input untouched; a zero, negative or NaN ratio eliminates
/// every entry.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
pub fn scale_sample_counts(stacks: StackSamples, ratio: f64) -> StackSamples {
    if ratio == 1.0 {
        return stacks;
    }

    stacks
        .into_iter()
        .filter_map(|(stack, count)| {
            let product = count as f64 * ratio;
            // A product a few ulps below a whole number is representation
            // error in `ratio`, not a fractional sample
            let nearest = product.round();
            let scaled = if (product - nearest).abs() <= nearest.abs() * 4.0 * f64::EPSILON {
                nearest
            } else {
                product.floor()
            };
            // NaN fails this comparison too
            (scaled >= 1.0).then_some((stack, scaled as u64))
        })
        .collect()
}

/// Rescale every count in `stacks` by `numerator / denominator` in integer
/// arithmetic, flooring each result.
///
/// Same contract as [`scale_sample_counts`] for callers that know the ratio
/// as a quotient of sample totals. A zero denominator eliminates every entry.
#[must_use]
pub fn scale_by_fraction(stacks: StackSamples, numerator: u64, denominator: u64) -> StackSamples {
    if denominator == 0 {
        return StackSamples::new();
    }
    if numerator == denominator {
        return stacks;
    }

    stacks
        .into_iter()
        .filter_map(|(stack, count)| {
            let scaled = u128::from(count) * u128::from(numerator) / u128::from(denominator);
            let scaled = u64::try_from(scaled).unwrap_or(u64::MAX);
            (scaled >= 1).then_some((stack, scaled))
        })
        .collect()
}
