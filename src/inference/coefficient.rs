//! Wald inference for fixed effects.

use faer::{Col, Mat};
use statrs::distribution::{ContinuousCDF, Normal};

/// Standard errors, z statistics, p-values and intervals for a set of
/// estimates.
#[derive(Debug, Clone)]
pub struct WaldSummary {
    pub std_errors: Col<f64>,
    pub z_statistics: Col<f64>,
    pub p_values: Col<f64>,
    pub lower: Col<f64>,
    pub upper: Col<f64>,
}

/// Computes inference statistics for fixed-effect estimates.
pub struct CoefficientInference;

impl CoefficientInference {
    /// Everything at once from the covariance matrix of the estimates.
    pub fn wald(estimates: &Col<f64>, vcov: &Mat<f64>, confidence_level: f64) -> WaldSummary {
        let std_errors = Self::standard_errors(vcov);
        let z_statistics = Self::z_statistics(estimates, &std_errors);
        let p_values = Self::p_values(&z_statistics);
        let (lower, upper) =
            Self::confidence_intervals(estimates, &std_errors, confidence_level);
        WaldSummary {
            std_errors,
            z_statistics,
            p_values,
            lower,
            upper,
        }
    }

    /// SE(β_j) = sqrt(V_jj)
    pub fn standard_errors(vcov: &Mat<f64>) -> Col<f64> {
        Col::from_fn(vcov.nrows(), |j| {
            let var = vcov[(j, j)];
            if var >= 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        })
    }

    /// z_j = β_j / SE(β_j)
    pub fn z_statistics(estimates: &Col<f64>, std_errors: &Col<f64>) -> Col<f64> {
        Col::from_fn(estimates.nrows(), |j| {
            if std_errors[j].is_nan() || std_errors[j] == 0.0 {
                f64::NAN
            } else {
                estimates[j] / std_errors[j]
            }
        })
    }

    /// p_j = 2 * P(|Z| > |z_j|)
    pub fn p_values(z_statistics: &Col<f64>) -> Col<f64> {
        let normal = Normal::standard();
        Col::from_fn(z_statistics.nrows(), |j| {
            let z = z_statistics[j];
            if z.is_nan() {
                f64::NAN
            } else {
                2.0 * (1.0 - normal.cdf(z.abs()))
            }
        })
    }

    /// CI_j = β_j ± z_{α/2} * SE(β_j)
    pub fn confidence_intervals(
        estimates: &Col<f64>,
        std_errors: &Col<f64>,
        confidence_level: f64,
    ) -> (Col<f64>, Col<f64>) {
        let z_crit = normal_quantile(1.0 - (1.0 - confidence_level) / 2.0);
        let n = estimates.nrows();
        let lower = Col::from_fn(n, |j| estimates[j] - z_crit * std_errors[j]);
        let upper = Col::from_fn(n, |j| estimates[j] + z_crit * std_errors[j]);
        (lower, upper)
    }
}

/// Quantile of the standard normal distribution.
pub fn normal_quantile(p: f64) -> f64 {
    Normal::standard().inverse_cdf(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_statistics() {
        let estimates = Col::from_fn(3, |i| (i + 1) as f64);
        let vcov = Mat::from_fn(3, 3, |i, j| if i == j { 0.25 } else { 0.0 });
        let summary = CoefficientInference::wald(&estimates, &vcov, 0.95);

        assert!((summary.std_errors[0] - 0.5).abs() < 1e-12);
        assert!((summary.z_statistics[1] - 4.0).abs() < 1e-12);
        assert!((summary.z_statistics[2] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_p_values_bounds() {
        let z = Col::from_fn(4, |i| i as f64 - 1.5);
        let p = CoefficientInference::p_values(&z);
        for v in p.iter() {
            assert!(*v >= 0.0 && *v <= 1.0);
        }
        let zero = CoefficientInference::p_values(&Col::from_fn(1, |_| 0.0));
        assert!((zero[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_interval_uses_normal_quantile() {
        let estimates = Col::from_fn(1, |_| 10.0);
        let se = Col::from_fn(1, |_| 1.0);
        let (lo, hi) = CoefficientInference::confidence_intervals(&estimates, &se, 0.95);
        assert!((lo[0] - (10.0 - 1.959964)).abs() < 1e-5);
        assert!((hi[0] - (10.0 + 1.959964)).abs() < 1e-5);
    }
}
