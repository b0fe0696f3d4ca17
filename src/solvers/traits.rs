//! Core traits for estimators.

use crate::core::{DesignError, MixedDesign, MixedResult, OptionsError};
use crate::data::Dataset;
use crate::core::Formula;
use faer::{Col, Mat};
use thiserror::Error;

/// Errors that can occur during fitting.
#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("dimension mismatch: X has {x_rows} rows but y has {y_len} elements")]
    DimensionMismatch { x_rows: usize, y_len: usize },

    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("insufficient groups: need at least {needed}, got {got}")]
    InsufficientGroups { needed: usize, got: usize },

    #[error("fixed-effect design matrix is singular or nearly singular")]
    SingularMatrix,

    #[error("all features are constant")]
    AllFeaturesConstant,

    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),

    #[error("invalid design: {0}")]
    Design(#[from] DesignError),

    #[error("convergence failed after {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    #[error("numerical error: {0}")]
    NumericalError(String),
}

/// A least-squares estimator that can be fit to a design matrix.
pub trait Regressor {
    /// The type of the fitted model.
    type Fitted: FittedRegressor;

    /// Fit the model.
    ///
    /// # Arguments
    /// * `x` - Design matrix of shape (n_samples, n_features)
    /// * `y` - Target vector of length n_samples
    fn fit(&self, x: &Mat<f64>, y: &Col<f64>) -> Result<Self::Fitted, RegressionError>;
}

/// A fitted least-squares model.
pub trait FittedRegressor {
    /// Predicted values for new rows.
    fn predict(&self, x: &Mat<f64>) -> Col<f64>;

    /// Coefficients, NaN for aliased columns.
    fn coefficients(&self) -> &Col<f64>;

    /// Intercept, if the model has one.
    fn intercept(&self) -> Option<f64>;
}

/// A mixed-model estimator.
///
/// Fitting consumes an assembled [`MixedDesign`] and returns an independent
/// fitted model; the estimator itself holds only options.
pub trait MixedEstimator {
    /// The type of the fitted model.
    type Fitted: FittedMixed;

    /// Fit the model to an assembled design.
    fn fit(&self, design: &MixedDesign) -> Result<Self::Fitted, RegressionError>;

    /// Assemble the design for `formula` on `dataset` and fit it.
    fn fit_formula(
        &self,
        dataset: &Dataset,
        formula: &Formula,
    ) -> Result<Self::Fitted, RegressionError> {
        let design = MixedDesign::from_dataset(dataset, formula)?;
        self.fit(&design)
    }
}

/// Whether predictions include the group-level random effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionLevel {
    /// `Xβ` only.
    Population,
    /// `Xβ + Zb` for groups seen during fitting, `Xβ` for new groups.
    #[default]
    Group,
}

/// A fitted mixed model.
pub trait FittedMixed {
    /// Access the fit results.
    fn result(&self) -> &MixedResult;

    /// Predicted values for the rows of `design`.
    fn predict(&self, design: &MixedDesign, level: PredictionLevel) -> Col<f64>;

    /// Fixed-effect estimates (convenience method).
    fn fixed_effects(&self) -> &Col<f64> {
        &self.result().fixed_effects
    }

    /// Log-likelihood (convenience method).
    fn log_likelihood(&self) -> f64 {
        self.result().log_likelihood
    }

    /// BLUPs, one row per group (convenience method).
    fn random_effects(&self) -> &Mat<f64> {
        &self.result().random_effects
    }
}
