//! Statistics over `(value, count)` distributions used by regression trees

/// Maximum number of bins kept after merging regression distributions
pub const BINS_LIMIT: usize = 32;

/// Mean of a `(value, count)` distribution
pub fn weighted_mean(distribution: &[(f64, f64)]) -> f64 {
    let (addition, count) = distribution
        .iter()
        .fold((0.0, 0.0), |(sum, n), (value, instances)| {
            (sum + value * instances, n + instances)
        });
    if count > 0.0 {
        addition / count
    } else {
        f64::NAN
    }
}

/// Unbiased sample variance of a `(value, count)` distribution.
///
/// NaN when the distribution holds fewer than two instances.
pub fn unbiased_sample_variance(distribution: &[(f64, f64)], mean: Option<f64>) -> f64 {
    let mean = mean.unwrap_or_else(|| weighted_mean(distribution));
    let (addition, count) = distribution
        .iter()
        .fold((0.0, 0.0), |(sum, n), (value, instances)| {
            (sum + (value - mean).powi(2) * instances, n + instances)
        });
    if count > 1.0 {
        addition / (count - 1.0)
    } else {
        f64::NAN
    }
}

/// Median of a sorted `(value, count)` distribution holding `count` instances
pub fn dist_median(distribution: &[(f64, f64)], count: f64) -> Option<f64> {
    let mut counter = 0.0;
    let mut previous: Option<f64> = None;
    for (value, instances) in distribution {
        counter += instances;
        if counter > count / 2.0 {
            let even = (count as i64) % 2 == 0;
            if even && (counter - instances - count / 2.0).abs() < f64::EPSILON {
                if let Some(previous) = previous {
                    return Some((value + previous) / 2.0);
                }
            }
            return Some(*value);
        }
        previous = Some(*value);
    }
    None
}

/// Merge the closest adjacent bins until at most `limit` remain.
///
/// The input must be sorted by value; merged bins take the count-weighted
/// mean of their values.
pub fn merge_bins(mut distribution: Vec<(f64, f64)>, limit: usize) -> Vec<(f64, f64)> {
    let limit = limit.max(1);
    while distribution.len() > limit {
        let mut closest = 0;
        let mut min_gap = f64::INFINITY;
        for index in 0..distribution.len() - 1 {
            let gap = distribution[index + 1].0 - distribution[index].0;
            if gap < min_gap {
                min_gap = gap;
                closest = index;
            }
        }
        let (left_value, left_count) = distribution[closest];
        let (right_value, right_count) = distribution.remove(closest + 1);
        let count = left_count + right_count;
        let value = if count > 0.0 {
            (left_value * left_count + right_value * right_count) / count
        } else {
            (left_value + right_value) / 2.0
        };
        distribution[closest] = (value, count);
    }
    distribution
}

/// Error bound of a regression prediction with `population` instances.
///
/// Scales the sample variance by the lower `1 - erf(z / sqrt(2))` quantile of
/// a chi-square distribution with `population` degrees of freedom.
pub fn regression_error(variance: f64, population: f64, z: f64) -> f64 {
    if population <= 0.0 || variance.is_nan() {
        return f64::NAN;
    }
    let tail = 1.0 - erf(z / std::f64::consts::SQRT_2);
    let ppf = chi_square_quantile(tail, population);
    if ppf <= 0.0 || !ppf.is_finite() {
        return f64::NAN;
    }
    let error = variance * (population - 1.0) / ppf;
    let error = error * (population.sqrt() + z).powi(2);
    (error / population).sqrt()
}

/// Inverse of the standard normal CDF (Acklam's rational approximation)
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

// Exact for one and two degrees of freedom, Wilson-Hilferty otherwise
fn chi_square_quantile(p: f64, dof: f64) -> f64 {
    if dof <= 1.0 {
        let z = normal_quantile((1.0 + p) / 2.0);
        return z * z;
    }
    if dof <= 2.0 {
        return -2.0 * (1.0 - p).ln();
    }
    let z = normal_quantile(p);
    let h = 2.0 / (9.0 * dof);
    let base = 1.0 - h + z * h.sqrt();
    if base <= 0.0 {
        return 0.0;
    }
    dof * base.powi(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_mean_and_variance() {
        let d = vec![(1.0, 2.0), (4.0, 1.0)];
        assert_eq!(weighted_mean(&d), 2.0);
        // (1-2)^2*2 + (4-2)^2 = 6, over 2
        assert_eq!(unbiased_sample_variance(&d, None), 3.0);
        assert!(unbiased_sample_variance(&[(1.0, 1.0)], None).is_nan());
        assert!(weighted_mean(&[]).is_nan());
    }

    #[test]
    fn test_dist_median() {
        let odd = vec![(1.0, 1.0), (2.0, 1.0), (3.0, 1.0)];
        assert_eq!(dist_median(&odd, 3.0), Some(2.0));
        let even = vec![(1.0, 1.0), (2.0, 1.0), (3.0, 1.0), (10.0, 1.0)];
        assert_eq!(dist_median(&even, 4.0), Some(2.5));
        assert_eq!(dist_median(&[], 0.0), None);
    }

    #[test]
    fn test_merge_bins_respects_limit() {
        let d: Vec<(f64, f64)> = (0..40).map(|i| (i as f64, 1.0)).collect();
        let merged = merge_bins(d, BINS_LIMIT);
        assert_eq!(merged.len(), BINS_LIMIT);
        let total: f64 = merged.iter().map(|(_, c)| c).sum();
        assert_eq!(total, 40.0);
    }

    #[test]
    fn test_merge_bins_weighted_value() {
        let merged = merge_bins(vec![(0.0, 1.0), (1.0, 3.0), (10.0, 1.0)], 2);
        assert_eq!(merged, vec![(0.75, 4.0), (10.0, 1.0)]);
    }

    #[test]
    fn test_normal_quantile() {
        assert!((normal_quantile(0.975) - 1.959964).abs() < 1e-5);
        assert!((normal_quantile(0.05) + 1.644854).abs() < 1e-5);
        assert!(normal_quantile(0.5).abs() < 1e-9);
    }

    #[test]
    fn test_chi_square_quantile_reference_values() {
        // scipy.stats.chi2(df).ppf(0.05)
        assert!((chi_square_quantile(0.05, 2.0) - 0.102587).abs() < 1e-4);
        assert!((chi_square_quantile(0.05, 10.0) - 3.940299).abs() < 2e-2);
    }

    #[test]
    fn test_regression_error_is_positive() {
        let error = regression_error(4.0, 20.0, 1.96);
        assert!(error.is_finite());
        assert!(error > 0.0);
        assert!(regression_error(4.0, 0.0, 1.96).is_nan());
    }
}
