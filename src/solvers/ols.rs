//! Ordinary least squares.
//!
//! Used for the fitted lines in plots and for the starting residual variance
//! of the EM engine.

use crate::solvers::traits::{FittedRegressor, RegressionError, Regressor};
use crate::utils::{center_columns, center_vector, detect_constant_columns};
use faer::{Col, Mat};

/// Ordinary Least Squares regression estimator.
///
/// Uses QR decomposition with column pivoting to handle rank-deficient matrices.
/// Aliased (collinear) coefficients are set to NaN.
///
/// # Example
///
/// ```rust
/// use hlm_rs::solvers::{FittedRegressor, OlsRegressor, Regressor};
/// use faer::{Col, Mat};
///
/// let x = Mat::from_fn(20, 1, |i, _| i as f64);
/// let y = Col::from_fn(20, |i| 1.0 + 2.0 * i as f64);
///
/// let fitted = OlsRegressor::builder().with_intercept(true).build().fit(&x, &y).unwrap();
/// assert!((fitted.coefficients()[0] - 2.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone)]
pub struct OlsRegressor {
    with_intercept: bool,
    rank_tolerance: f64,
}

impl Default for OlsRegressor {
    fn default() -> Self {
        Self {
            with_intercept: true,
            rank_tolerance: 1e-10,
        }
    }
}

impl OlsRegressor {
    /// Create a builder for configuring the regressor.
    pub fn builder() -> OlsRegressorBuilder {
        OlsRegressorBuilder::default()
    }

    /// Solve the least squares problem using QR decomposition with column pivoting.
    fn solve_with_qr(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        constant_cols: &[bool],
    ) -> (Col<f64>, Vec<bool>, usize) {
        let n_features = x.ncols();
        let n_samples = x.nrows();
        let mut aliased = constant_cols.to_vec();

        let qr = x.col_piv_qr();
        let q = qr.compute_Q();
        let r = qr.R();

        // position of original column j in the pivoted factor
        let position: Vec<usize> = qr.P().arrays().0[..n_features].to_vec();

        let mut rank = 0;
        for i in 0..n_features.min(n_samples) {
            if r[(i, i)].abs() > self.rank_tolerance {
                rank += 1;
            } else {
                break;
            }
        }

        if rank == 0 {
            return (Col::from_fn(n_features, |_| f64::NAN), vec![true; n_features], 0);
        }

        for j in 0..n_features {
            if position[j] >= rank {
                aliased[j] = true;
            }
        }

        let qty = q.transpose() * y;
        let mut beta_reduced = Col::<f64>::zeros(rank);
        for i in (0..rank).rev() {
            let mut sum = qty[i];
            for j in (i + 1)..rank {
                sum -= r[(i, j)] * beta_reduced[j];
            }
            beta_reduced[i] = sum / r[(i, i)];
        }

        let coefficients = Col::from_fn(n_features, |j| {
            if aliased[j] {
                f64::NAN
            } else {
                beta_reduced[position[j]]
            }
        });
        let rank = aliased.iter().filter(|&&a| !a).count();
        (coefficients, aliased, rank)
    }
}

impl Regressor for OlsRegressor {
    type Fitted = FittedOls;

    fn fit(&self, x: &Mat<f64>, y: &Col<f64>) -> Result<FittedOls, RegressionError> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.nrows() {
            return Err(RegressionError::DimensionMismatch {
                x_rows: n_samples,
                y_len: y.nrows(),
            });
        }
        let needed = n_features + usize::from(self.with_intercept);
        if n_samples < needed.max(2) {
            return Err(RegressionError::InsufficientObservations {
                needed: needed.max(2),
                got: n_samples,
            });
        }

        let constant_cols = detect_constant_columns(x, self.rank_tolerance);

        let (coefficients, intercept, rank) = if self.with_intercept {
            let (x_centered, x_means) = center_columns(x);
            let (y_centered, y_mean) = center_vector(y);
            let (coefficients, aliased, rank) =
                self.solve_with_qr(&x_centered, &y_centered, &constant_cols);

            let mut intercept = y_mean;
            for j in 0..n_features {
                if !aliased[j] {
                    intercept -= x_means[j] * coefficients[j];
                }
            }
            (coefficients, Some(intercept), rank + 1)
        } else {
            if n_features == 0 {
                return Err(RegressionError::AllFeaturesConstant);
            }
            // without an intercept a constant column carries information
            let (coefficients, _, rank) = self.solve_with_qr(x, y, &vec![false; n_features]);
            (coefficients, None, rank)
        };

        let fitted_values = predict_rows(x, &coefficients, intercept);
        let residuals = Col::from_fn(n_samples, |i| y[i] - fitted_values[i]);
        let rss: f64 = residuals.iter().map(|r| r * r).sum();
        let df_resid = n_samples.saturating_sub(rank);
        let residual_variance = if df_resid > 0 {
            rss / df_resid as f64
        } else {
            f64::NAN
        };

        let y_mean = y.iter().sum::<f64>() / n_samples as f64;
        let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        let r_squared = if tss > 0.0 {
            (1.0 - rss / tss).clamp(0.0, 1.0)
        } else {
            f64::NAN
        };

        Ok(FittedOls {
            coefficients,
            intercept,
            fitted_values,
            residuals,
            rank,
            residual_variance,
            r_squared,
        })
    }
}

fn predict_rows(x: &Mat<f64>, coefficients: &Col<f64>, intercept: Option<f64>) -> Col<f64> {
    Col::from_fn(x.nrows(), |i| {
        let mut pred = intercept.unwrap_or(0.0);
        for j in 0..x.ncols() {
            if !coefficients[j].is_nan() {
                pred += x[(i, j)] * coefficients[j];
            }
        }
        pred
    })
}

/// A fitted OLS model.
#[derive(Debug, Clone)]
pub struct FittedOls {
    coefficients: Col<f64>,
    intercept: Option<f64>,
    fitted_values: Col<f64>,
    residuals: Col<f64>,
    rank: usize,
    residual_variance: f64,
    r_squared: f64,
}

impl FittedOls {
    pub fn fitted_values(&self) -> &Col<f64> {
        &self.fitted_values
    }

    pub fn residuals(&self) -> &Col<f64> {
        &self.residuals
    }

    /// Number of estimated parameters, intercept included.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// `RSS / (n − rank)`.
    pub fn residual_variance(&self) -> f64 {
        self.residual_variance
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }
}

impl FittedRegressor for FittedOls {
    fn predict(&self, x: &Mat<f64>) -> Col<f64> {
        predict_rows(x, &self.coefficients, self.intercept)
    }

    fn coefficients(&self) -> &Col<f64> {
        &self.coefficients
    }

    fn intercept(&self) -> Option<f64> {
        self.intercept
    }
}

/// Builder for [`OlsRegressor`].
#[derive(Debug, Clone, Default)]
pub struct OlsRegressorBuilder {
    regressor: OlsRegressor,
}

impl OlsRegressorBuilder {
    pub fn with_intercept(mut self, include: bool) -> Self {
        self.regressor.with_intercept = include;
        self
    }

    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.regressor.rank_tolerance = tol;
        self
    }

    pub fn build(self) -> OlsRegressor {
        self.regressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_line() {
        let x = Mat::from_fn(10, 1, |i, _| i as f64);
        let y = Col::from_fn(10, |i| 3.0 - 0.5 * i as f64);
        let fitted = OlsRegressor::default().fit(&x, &y).expect("fit");

        assert_relative_eq!(fitted.coefficients()[0], -0.5, epsilon = 1e-10);
        assert_relative_eq!(fitted.intercept().unwrap_or(f64::NAN), 3.0, epsilon = 1e-10);
        assert_relative_eq!(fitted.r_squared(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_collinear_column_is_aliased() {
        let x = Mat::from_fn(12, 2, |i, j| if j == 0 { i as f64 } else { 2.0 * i as f64 });
        let y = Col::from_fn(12, |i| 1.0 + i as f64 + if i % 2 == 0 { 0.1 } else { -0.1 });
        let fitted = OlsRegressor::default().fit(&x, &y).expect("fit");

        let aliased = fitted.coefficients().iter().filter(|c| c.is_nan()).count();
        assert_eq!(aliased, 1);
        assert_eq!(fitted.rank(), 2);
    }

    #[test]
    fn test_residual_variance() {
        let x = Mat::from_fn(4, 1, |i, _| i as f64);
        let y = Col::from_fn(4, |i| [1.0, 3.0, 2.0, 4.0][i]);
        let fitted = OlsRegressor::default().fit(&x, &y).expect("fit");

        // slope 0.8, intercept 1.3, residuals -0.3, 0.9, -0.9, 0.3
        assert_relative_eq!(fitted.coefficients()[0], 0.8, epsilon = 1e-10);
        assert_relative_eq!(fitted.residual_variance(), 1.8 / 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = Mat::<f64>::zeros(5, 1);
        let y = Col::<f64>::zeros(4);
        assert!(matches!(
            OlsRegressor::default().fit(&x, &y),
            Err(RegressionError::DimensionMismatch { .. })
        ));
    }
}
