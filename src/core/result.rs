//! Mixed-model result structures.

use super::formula::{Formula, INTERCEPT};
use super::options::Criterion;
use faer::{Col, Mat};
use std::fmt;

/// Estimated variance components.
#[derive(Debug, Clone)]
pub struct VarCorr {
    /// Grouping factor name.
    pub group: String,
    /// Random-effect names, intercept first.
    pub terms: Vec<String>,
    /// Covariance matrix `D` of the random effects.
    pub covariance: Mat<f64>,
    /// Residual variance `σ²`.
    pub residual_variance: f64,
    /// Whether off-diagonal covariances were estimated.
    pub correlated: bool,
}

impl VarCorr {
    pub fn variance(&self, j: usize) -> f64 {
        self.covariance[(j, j)]
    }

    pub fn std_dev(&self, j: usize) -> f64 {
        self.variance(j).max(0.0).sqrt()
    }

    /// Correlation between random effects `i` and `j`; NaN when either
    /// variance is zero.
    pub fn correlation(&self, i: usize, j: usize) -> f64 {
        let denom = self.std_dev(i) * self.std_dev(j);
        if denom > 0.0 {
            self.covariance[(i, j)] / denom
        } else {
            f64::NAN
        }
    }

    /// Variance of the random intercept `τ₀₀`, if the model has one.
    pub fn intercept_variance(&self) -> Option<f64> {
        self.terms
            .iter()
            .position(|t| t == INTERCEPT)
            .map(|j| self.variance(j))
    }
}

/// Complete result of a mixed-model fit.
#[derive(Debug, Clone)]
pub struct MixedResult {
    // ========== Model ==========
    /// Engine that produced the fit.
    pub engine: &'static str,
    /// Model formula.
    pub formula: Formula,
    /// Estimation criterion.
    pub criterion: Criterion,

    // ========== Fixed Effects ==========
    /// Names of the fixed effects, intercept first.
    pub fixed_names: Vec<String>,
    /// Fixed-effect estimates `β`.
    pub fixed_effects: Col<f64>,
    /// Covariance matrix of `β`.
    pub vcov: Mat<f64>,
    /// Standard errors.
    pub std_errors: Option<Col<f64>>,
    /// Wald z statistics.
    pub z_statistics: Option<Col<f64>>,
    /// Two-sided p-values.
    pub p_values: Option<Col<f64>>,
    /// Lower bounds of Wald intervals.
    pub conf_interval_lower: Option<Col<f64>>,
    /// Upper bounds of Wald intervals.
    pub conf_interval_upper: Option<Col<f64>>,
    /// Confidence level used for intervals.
    pub confidence_level: f64,

    // ========== Variance Components ==========
    pub var_corr: VarCorr,
    /// Relative covariance factor parameters, `D = σ²ΛΛ'`.
    pub theta: Vec<f64>,
    /// Residual standard deviation.
    pub sigma: f64,

    // ========== Fit Statistics ==========
    /// Log-likelihood (restricted log-likelihood for REML fits).
    pub log_likelihood: f64,
    /// `-2 logLik` (the REML criterion for REML fits).
    pub deviance: f64,
    /// Akaike Information Criterion.
    pub aic: f64,
    /// Bayesian Information Criterion.
    pub bic: f64,
    pub n_observations: usize,
    pub n_groups: usize,
    /// Fixed effects + covariance parameters + residual variance.
    pub n_parameters: usize,

    // ========== Conditional Quantities ==========
    /// `Xβ + Zb`.
    pub fitted_values: Col<f64>,
    /// `y − Xβ − Zb`.
    pub residuals: Col<f64>,
    /// Group labels, indexing the rows of `random_effects`.
    pub group_labels: Vec<String>,
    /// BLUPs, one row per group.
    pub random_effects: Mat<f64>,
    /// Conditional covariance of each group's BLUPs.
    pub conditional_variances: Vec<Mat<f64>>,

    // ========== Convergence ==========
    pub converged: bool,
    pub iterations: usize,
}

impl MixedResult {
    /// Index of a fixed effect by name.
    pub fn fixed_index(&self, name: &str) -> Option<usize> {
        self.fixed_names.iter().position(|n| n == name)
    }

    /// Estimate of a fixed effect by name.
    pub fn fixed_effect(&self, name: &str) -> Option<f64> {
        self.fixed_index(name).map(|j| self.fixed_effects[j])
    }

    /// Number of fixed effects.
    pub fn n_fixed(&self) -> usize {
        self.fixed_effects.nrows()
    }
}

impl fmt::Display for MixedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Linear mixed model fit by {} [{}]",
            self.criterion, self.engine
        )?;
        writeln!(f, "Formula: {}", self.formula)?;
        writeln!(f)?;

        let crit = match self.criterion {
            Criterion::Ml => "deviance",
            Criterion::Reml => "REML",
        };
        writeln!(f, "{:>10} {:>10} {:>10} {:>10}", "AIC", "BIC", "logLik", crit)?;
        writeln!(
            f,
            "{:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            self.aic, self.bic, self.log_likelihood, self.deviance
        )?;
        if !self.converged {
            writeln!(
                f,
                "warning: optimizer did not converge after {} iterations",
                self.iterations
            )?;
        }
        writeln!(f)?;

        let vc = &self.var_corr;
        let name_width = vc.terms.iter().map(String::len).max().unwrap_or(0).max(8);
        let group_width = vc.group.len().max(8);
        writeln!(f, "Random effects:")?;
        writeln!(
            f,
            " {:<gw$} {:<nw$} {:>10} {:>9}{}",
            "Groups",
            "Name",
            "Variance",
            "Std.Dev.",
            if vc.terms.len() > 1 { " Corr" } else { "" },
            gw = group_width,
            nw = name_width
        )?;
        for (j, term) in vc.terms.iter().enumerate() {
            let group = if j == 0 { vc.group.as_str() } else { "" };
            write!(
                f,
                " {:<gw$} {:<nw$} {:>10.4} {:>9.4}",
                group,
                term,
                vc.variance(j),
                vc.std_dev(j),
                gw = group_width,
                nw = name_width
            )?;
            if vc.correlated {
                for k in 0..j {
                    write!(f, " {:>5.2}", vc.correlation(j, k))?;
                }
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            " {:<gw$} {:<nw$} {:>10.4} {:>9.4}",
            "Residual",
            "",
            vc.residual_variance,
            self.sigma,
            gw = group_width,
            nw = name_width
        )?;
        writeln!(
            f,
            "Number of obs: {}, groups: {}, {}",
            self.n_observations, vc.group, self.n_groups
        )?;
        writeln!(f)?;

        let width = self.fixed_names.iter().map(String::len).max().unwrap_or(0).max(11);
        writeln!(f, "Fixed effects:")?;
        writeln!(
            f,
            "{:<w$} {:>11} {:>11} {:>8} {:>9}",
            "",
            "Estimate",
            "Std. Error",
            "z value",
            "Pr(>|z|)",
            w = width
        )?;
        for (j, name) in self.fixed_names.iter().enumerate() {
            write!(f, "{:<w$} {:>11.5}", name, self.fixed_effects[j], w = width)?;
            match (&self.std_errors, &self.z_statistics, &self.p_values) {
                (Some(se), Some(z), Some(p)) => {
                    writeln!(f, " {:>11.5} {:>8.3} {:>9}", se[j], z[j], format_p(p[j]))?
                }
                _ => writeln!(f)?,
            }
        }
        Ok(())
    }
}

/// Format a p-value the way R's `format.pval` does for small values.
pub(crate) fn format_p(p: f64) -> String {
    if !p.is_finite() {
        "NA".to_string()
    } else if p < 2e-16 {
        "<2e-16".to_string()
    } else if p < 1e-4 {
        format!("{:.2e}", p)
    } else {
        format!("{:.4}", p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_corr() -> VarCorr {
        let covariance = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 9.0,
            _ => 3.0,
        });
        VarCorr {
            group: "state".to_string(),
            terms: vec![INTERCEPT.to_string(), "money".to_string()],
            covariance,
            residual_variance: 1.0,
            correlated: true,
        }
    }

    #[test]
    fn test_var_corr_accessors() {
        let vc = var_corr();
        assert_eq!(vc.std_dev(1), 3.0);
        assert!((vc.correlation(0, 1) - 0.5).abs() < 1e-12);
        assert_eq!(vc.intercept_variance(), Some(4.0));
    }

    #[test]
    fn test_correlation_with_zero_variance() {
        let mut vc = var_corr();
        vc.covariance[(1, 1)] = 0.0;
        assert!(vc.correlation(0, 1).is_nan());
    }

    #[test]
    fn test_format_p() {
        assert_eq!(format_p(0.5), "0.5000");
        assert_eq!(format_p(1e-20), "<2e-16");
        assert_eq!(format_p(f64::NAN), "NA");
    }
}
