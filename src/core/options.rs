//! Mixed-model fitting options and configuration.

use std::fmt;
use thiserror::Error;

/// Estimation criterion for the variance components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criterion {
    /// Full maximum likelihood. Required for comparing models that differ in
    /// their fixed effects.
    #[default]
    Ml,
    /// Restricted maximum likelihood.
    Reml,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Ml => write!(f, "maximum likelihood"),
            Criterion::Reml => write!(f, "REML"),
        }
    }
}

/// Configuration options for mixed-model estimators.
#[derive(Debug, Clone)]
pub struct MixedOptions {
    /// Estimation criterion (default: ML).
    pub criterion: Criterion,
    /// Whether to compute standard errors and Wald statistics (default: true).
    pub compute_inference: bool,
    /// Confidence level for intervals (default: 0.95).
    pub confidence_level: f64,
    /// Objective evaluations (simplex) or iterations (EM) before giving up.
    pub max_iterations: usize,
    /// Convergence tolerance on the objective.
    pub tolerance: f64,
    /// Pivot tolerance for rank and boundary decisions.
    pub rank_tolerance: f64,
}

impl Default for MixedOptions {
    fn default() -> Self {
        Self {
            criterion: Criterion::Ml,
            compute_inference: true,
            confidence_level: 0.95,
            max_iterations: 10_000,
            tolerance: 1e-10,
            rank_tolerance: 1e-10,
        }
    }
}

/// Errors that can occur when validating options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("confidence_level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("{engine} does not support {criterion} estimation")]
    UnsupportedCriterion {
        engine: &'static str,
        criterion: Criterion,
    },
}

impl MixedOptions {
    /// Create a new builder.
    pub fn builder() -> MixedOptionsBuilder {
        MixedOptionsBuilder::default()
    }

    /// Default options with maximum likelihood.
    pub fn ml() -> Self {
        Self::default()
    }

    /// Default options with REML.
    pub fn reml() -> Self {
        Self {
            criterion: Criterion::Reml,
            ..Default::default()
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(OptionsError::InvalidConfidenceLevel(self.confidence_level));
        }
        if !(self.tolerance > 0.0) {
            return Err(OptionsError::InvalidTolerance(self.tolerance));
        }
        if !(self.rank_tolerance > 0.0) {
            return Err(OptionsError::InvalidTolerance(self.rank_tolerance));
        }
        if self.max_iterations == 0 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations));
        }
        Ok(())
    }
}

/// Builder for [`MixedOptions`].
#[derive(Debug, Clone, Default)]
pub struct MixedOptionsBuilder {
    options: MixedOptions,
}

impl MixedOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.options.criterion = criterion;
        self
    }

    /// Shorthand for `criterion(Criterion::Reml)` / `criterion(Criterion::Ml)`.
    pub fn reml(self, reml: bool) -> Self {
        self.criterion(if reml { Criterion::Reml } else { Criterion::Ml })
    }

    pub fn compute_inference(mut self, compute: bool) -> Self {
        self.options.compute_inference = compute;
        self
    }

    pub fn confidence_level(mut self, level: f64) -> Self {
        self.options.confidence_level = level;
        self
    }

    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options.max_iterations = max_iter;
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options.tolerance = tol;
        self
    }

    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.options.rank_tolerance = tol;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<MixedOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build without validation.
    pub fn build_unchecked(self) -> MixedOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = MixedOptions::default();
        assert_eq!(opts.criterion, Criterion::Ml);
        assert!(opts.compute_inference);
        assert!((opts.confidence_level - 0.95).abs() < 1e-10);
    }

    #[test]
    fn test_builder() {
        let opts = MixedOptions::builder()
            .reml(true)
            .confidence_level(0.9)
            .max_iterations(50)
            .build()
            .expect("valid options");
        assert_eq!(opts.criterion, Criterion::Reml);
        assert_eq!(opts.max_iterations, 50);
    }

    #[test]
    fn test_invalid_confidence_level() {
        let result = MixedOptions::builder().confidence_level(1.5).build();
        assert!(matches!(result, Err(OptionsError::InvalidConfidenceLevel(_))));
    }

    #[test]
    fn test_invalid_tolerance_and_iterations() {
        assert!(matches!(
            MixedOptions::builder().tolerance(0.0).build(),
            Err(OptionsError::InvalidTolerance(_))
        ));
        assert!(matches!(
            MixedOptions::builder().max_iterations(0).build(),
            Err(OptionsError::InvalidMaxIterations(0))
        ));
    }
}
