//! Numeric helpers shared by every predictor
//!
//! Rounding, Wilson score confidence, softmax and the logistic function.
//! Term and distribution helpers live in the submodules.

mod stats;
mod terms;

pub use stats::{
    dist_median, merge_bins, normal_quantile, regression_error, unbiased_sample_variance,
    weighted_mean, BINS_LIMIT,
};
pub use terms::{count_item_matches, count_term_matches, parse_items, parse_terms, TokenMode};

/// Decimal digits kept in every probability and confidence
pub const PRECISION: i32 = 5;

/// Default z value for Wilson score intervals (95%)
pub const DEFAULT_Z: f64 = 1.96;

/// Round `value` to `digits` decimal places.
pub fn dec_round(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Wilson score lower bound for `category` within `distribution`.
///
/// `n` overrides the population size; by default it is the sum of the
/// distribution counts. Categories absent from the distribution and empty
/// populations score 0.
pub fn ws_confidence<K>(category: &K, distribution: &[(K, f64)], n: Option<f64>, z: f64) -> f64
where
    K: PartialEq,
{
    let Some(count) = distribution
        .iter()
        .find(|(name, _)| name == category)
        .map(|(_, count)| *count)
    else {
        return 0.0;
    };
    let n = n.unwrap_or_else(|| distribution.iter().map(|(_, c)| c).sum());
    if n <= 0.0 {
        return 0.0;
    }
    let p = count / n;
    let z2 = z * z;
    let norm = 1.0 + z2 / n;
    let radicand = (p * (1.0 - p) + z2 / (4.0 * n)) / n;
    (p + z2 / (2.0 * n) - z * radicand.max(0.0).sqrt()) / norm
}

/// Logistic function, saturating instead of overflowing
pub fn sigmoid(score: f64) -> f64 {
    if score.is_nan() {
        return f64::NAN;
    }
    if score < -700.0 {
        return 0.0;
    }
    if score > 700.0 {
        return 1.0;
    }
    1.0 / (1.0 + (-score).exp())
}

/// Numerically stable softmax
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
