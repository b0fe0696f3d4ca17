//! Likelihood-ratio tests between nested mixed models.

use crate::core::{format_p, Criterion, MixedResult};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::fmt;
use thiserror::Error;

/// Why two fits cannot be compared.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("models were fit with different criteria ({smaller} vs {larger})")]
    CriterionMismatch {
        smaller: Criterion,
        larger: Criterion,
    },

    #[error("models were fit to different data ({smaller} vs {larger} observations)")]
    ObservationMismatch { smaller: usize, larger: usize },

    #[error("REML fits with different fixed effects cannot be compared; refit with ML")]
    RemlFixedEffectsDiffer,

    #[error("`{smaller}` is not nested in `{larger}`")]
    NotNested { smaller: String, larger: String },

    #[error("at least two models are needed for a comparison")]
    TooFewModels,
}

/// Result of a likelihood-ratio test.
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodRatioTest {
    /// `2 (ℓ_larger − ℓ_smaller)`, floored at zero.
    pub statistic: f64,
    /// Difference in the number of parameters.
    pub df: usize,
    /// Upper-tail χ² probability; NaN when `df` is zero.
    pub p_value: f64,
}

/// Compare `smaller` against the model it is nested in.
pub fn likelihood_ratio_test(
    smaller: &MixedResult,
    larger: &MixedResult,
) -> Result<LikelihoodRatioTest, InferenceError> {
    if smaller.criterion != larger.criterion {
        return Err(InferenceError::CriterionMismatch {
            smaller: smaller.criterion,
            larger: larger.criterion,
        });
    }
    if smaller.n_observations != larger.n_observations {
        return Err(InferenceError::ObservationMismatch {
            smaller: smaller.n_observations,
            larger: larger.n_observations,
        });
    }
    if !smaller.formula.is_nested_in(&larger.formula) {
        return Err(InferenceError::NotNested {
            smaller: smaller.formula.to_string(),
            larger: larger.formula.to_string(),
        });
    }
    if smaller.criterion == Criterion::Reml
        && smaller.fixed_names.len() != larger.fixed_names.len()
    {
        return Err(InferenceError::RemlFixedEffectsDiffer);
    }

    let statistic = (2.0 * (larger.log_likelihood - smaller.log_likelihood)).max(0.0);
    let df = larger.n_parameters.saturating_sub(smaller.n_parameters);
    let p_value = if df == 0 {
        f64::NAN
    } else {
        ChiSquared::new(df as f64).map_or(f64::NAN, |d| 1.0 - d.cdf(statistic))
    };

    Ok(LikelihoodRatioTest {
        statistic,
        df,
        p_value,
    })
}

/// One line of an [`AnovaTable`].
#[derive(Debug, Clone)]
pub struct AnovaRow {
    pub name: String,
    pub n_parameters: usize,
    pub aic: f64,
    pub bic: f64,
    pub log_likelihood: f64,
    pub deviance: f64,
    /// Test against the previous row.
    pub test: Option<LikelihoodRatioTest>,
}

/// Sequential likelihood-ratio comparison of nested models, like R's
/// `anova()` on several fits.
#[derive(Debug, Clone)]
pub struct AnovaTable {
    pub rows: Vec<AnovaRow>,
}

impl AnovaTable {
    /// Order models by parameter count and test each against the previous one.
    pub fn compare(models: &[(&str, &MixedResult)]) -> Result<Self, InferenceError> {
        if models.len() < 2 {
            return Err(InferenceError::TooFewModels);
        }
        let mut ordered: Vec<&(&str, &MixedResult)> = models.iter().collect();
        ordered.sort_by_key(|(_, m)| m.n_parameters);

        let mut rows = Vec::with_capacity(ordered.len());
        for (k, (name, model)) in ordered.iter().enumerate() {
            let test = if k == 0 {
                None
            } else {
                Some(likelihood_ratio_test(ordered[k - 1].1, model)?)
            };
            rows.push(AnovaRow {
                name: name.to_string(),
                n_parameters: model.n_parameters,
                aic: model.aic,
                bic: model.bic,
                log_likelihood: model.log_likelihood,
                deviance: model.deviance,
                test,
            });
        }
        Ok(Self { rows })
    }
}

impl fmt::Display for AnovaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(5);
        writeln!(
            f,
            "{:<w$} {:>4} {:>10} {:>10} {:>10} {:>10} {:>8} {:>6} {:>10}",
            "", "npar", "AIC", "BIC", "logLik", "deviance", "Chisq", "Df", "Pr(>Chisq)",
            w = w
        )?;
        for row in &self.rows {
            write!(
                f,
                "{:<w$} {:>4} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                row.name, row.n_parameters, row.aic, row.bic, row.log_likelihood, row.deviance,
                w = w
            )?;
            match row.test {
                Some(t) => writeln!(
                    f,
                    " {:>8.3} {:>6} {:>10}",
                    t.statistic,
                    t.df,
                    format_p(t.p_value)
                )?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}
