//! Mathematical utility functions.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Mean of the finite values; NaN when there are none.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n > 0 {
        sum / n as f64
    } else {
        f64::NAN
    }
}

/// Sample variance (n - 1 denominator) of the finite values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    let (ss, n) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + (v - m).powi(2), n + 1));
    if n > 1 {
        ss / (n - 1) as f64
    } else {
        f64::NAN
    }
}

/// Quantile of already sorted values, interpolating linearly between
/// order statistics (Hyndman-Fan type 7).
pub fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * prob.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Upper tail P(X > stat) for X ~ chi-square(df).
pub fn chi2_sf(stat: f64, df: f64) -> f64 {
    if !stat.is_finite() {
        return if stat == f64::INFINITY { 0.0 } else { f64::NAN };
    }
    if stat <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(stat).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance_skip_nan() {
        let v = [1.0, 2.0, f64::NAN, 3.0];
        assert!((mean(&v) - 2.0).abs() < 1e-12);
        assert!((sample_variance(&v) - 1.0).abs() < 1e-12);
        assert!(mean(&[f64::NAN]).is_nan());
        assert!(sample_variance(&[1.0]).is_nan());
    }

    #[test]
    fn test_quantile_type7() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&v, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile_sorted(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile_sorted(&v, 0.75) - 3.25).abs() < 1e-12);
        assert_eq!(quantile_sorted(&v, 0.0), 1.0);
        assert_eq!(quantile_sorted(&v, 1.0), 4.0);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn test_chi2_sf() {
        // P(chi2_1 > 3.841459) = 0.05
        assert!((chi2_sf(3.841459, 1.0) - 0.05).abs() < 1e-6);
        // P(chi2_2 > x) = exp(-x/2)
        assert!((chi2_sf(4.0, 2.0) - (-2.0f64).exp()).abs() < 1e-10);
        assert_eq!(chi2_sf(0.0, 3.0), 1.0);
        assert_eq!(chi2_sf(f64::INFINITY, 1.0), 0.0);
    }
}
