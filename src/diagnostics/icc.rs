//! Intraclass correlation.

use crate::core::MixedResult;
use std::fmt;

/// Share of the total variance that lies between groups.
///
/// ICC = τ₀₀ / (τ₀₀ + σ²), where τ₀₀ is the random-intercept variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IccSummary {
    /// Between-group (random intercept) variance τ₀₀.
    pub between: f64,
    /// Within-group (residual) variance σ².
    pub within: f64,
    pub icc: f64,
}

/// ICC of a fit with a random intercept; `None` when the model has none.
///
/// In a model with random slopes the value describes observations whose
/// slope covariates are zero.
pub fn intraclass_correlation(result: &MixedResult) -> Option<IccSummary> {
    let between = result.var_corr.intercept_variance()?.max(0.0);
    let within = result.var_corr.residual_variance.max(0.0);
    let total = between + within;
    let icc = if total > 0.0 { between / total } else { f64::NAN };
    Some(IccSummary {
        between,
        within,
        icc,
    })
}

impl fmt::Display for IccSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ICC = τ00 / (τ00 + σ²) = {:.4} / ({:.4} + {:.4}) = {:.4}",
            self.between, self.between, self.within, self.icc
        )
    }
}
