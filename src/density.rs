//! Gaussian model of a window's biased distribution

use crate::config::VarianceThresholds;
use crate::diagnostics::Degeneracy;
use std::f64::consts::PI;

/// Normal probability density with the given mean and variance, evaluated at `x`
///
/// $$ p(x) = \frac{1}{\sqrt{2 \pi \sigma^2}} \exp\left(-\frac{(x - \mu)^2}{2 \sigma^2}\right) $$
///
/// Returns `None` when `variance` is not positive, where the density is undefined.
pub fn density(x: f64, mean: f64, variance: f64) -> Option<f64> {
    if !(variance > 0.0) {
        return None;
    }
    Some((2.0 * PI * variance).sqrt().recip() * (-(x - mean).powi(2) / (2.0 * variance)).exp())
}

/// Classify a window variance against the thresholds
///
/// `None` means the variance is fine. A variance that is not positive is always collapsed.
pub fn classify(variance: f64, thresholds: &VarianceThresholds) -> Option<Degeneracy> {
    if !(variance > thresholds.collapsed_variance.max(0.0)) {
        Some(Degeneracy::Collapsed)
    } else if variance > thresholds.diffuse_variance {
        Some(Degeneracy::Diffuse)
    } else {
        None
    }
}

/// Whether a window with this degeneracy stays in the density and force sums
pub fn contributes(degeneracy: Option<Degeneracy>, thresholds: &VarianceThresholds) -> bool {
    match degeneracy {
        None => true,
        Some(Degeneracy::Collapsed) => false,
        Some(Degeneracy::Diffuse) => !thresholds.exclude_diffuse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn standard_normal_peak() {
        let p = density(0.0, 0.0, 1.0).unwrap();
        assert_relative_eq!(p, 1.0 / (2.0 * PI).sqrt(), epsilon = 1e-15);
    }

    #[test]
    fn density_is_symmetric_about_mean() {
        let left = density(0.9, 1.0, 0.01).unwrap();
        let right = density(1.1, 1.0, 0.01).unwrap();
        assert_relative_eq!(left, right, epsilon = 1e-12);
        assert!(left < density(1.0, 1.0, 0.01).unwrap());
    }

    #[test]
    fn density_integrates_to_one() {
        let variance = 4.0e-5;
        let n = 20_001;
        let (lo, hi) = (-0.1, 0.1);
        let dx = (hi - lo) / (n - 1) as f64;
        let integral: f64 = (0..n)
            .map(|i| density(lo + i as f64 * dx, 0.0, variance).unwrap() * dx)
            .sum();
        assert_relative_eq!(integral, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_variance_is_undefined() {
        assert_eq!(density(0.0, 0.0, 0.0), None);
        assert_eq!(density(0.0, 0.0, -1.0), None);
        assert_eq!(density(0.0, 0.0, f64::NAN), None);
    }

    #[test]
    fn classify_against_thresholds() {
        let thresholds = VarianceThresholds::default();
        assert_eq!(classify(0.0, &thresholds), Some(Degeneracy::Collapsed));
        assert_eq!(classify(1.0e-11, &thresholds), Some(Degeneracy::Collapsed));
        assert_eq!(classify(1.0e-5, &thresholds), None);
        assert_eq!(classify(1.0e-4, &thresholds), Some(Degeneracy::Diffuse));

        let permissive = VarianceThresholds {
            collapsed_variance: -1.0,
            ..thresholds
        };
        assert_eq!(classify(0.0, &permissive), Some(Degeneracy::Collapsed));

        assert!(!contributes(Some(Degeneracy::Collapsed), &thresholds));
        assert!(contributes(Some(Degeneracy::Diffuse), &thresholds));
        let strict = VarianceThresholds {
            exclude_diffuse: true,
            ..thresholds
        };
        assert!(!contributes(Some(Degeneracy::Diffuse), &strict));
    }
}
