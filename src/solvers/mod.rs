//! Estimation engines.
//!
//! Two independent routes to the same linear mixed model sit behind
//! [`MixedEstimator`]: the profiled-deviance optimiser in [`LmmRegressor`] and
//! the EM iterations in [`EmRegressor`]. [`OlsRegressor`] fits the
//! single-level lines used in plots.

mod em;
mod lmm;
mod ols;
mod optimizer;
mod traits;

pub use em::{EmRegressor, EmRegressorBuilder, FittedEm};
pub use lmm::{FittedLmm, LmmRegressor, LmmRegressorBuilder};
pub use ols::{FittedOls, OlsRegressor, OlsRegressorBuilder};
pub use optimizer::{NelderMead, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use traits::{
    FittedMixed, FittedRegressor, MixedEstimator, PredictionLevel, RegressionError, Regressor,
};
