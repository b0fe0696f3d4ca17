//! Group-deletion influence: Cook's distance and DFBETAS.
//!
//! Every group is removed in turn and the model refit on the remaining data.
//! The shift in the fixed effects is then scaled by the full-data covariance
//! (Cook's distance) or by the deleted fit's standard errors (DFBETAS).

use crate::core::{MixedDesign, MixedResult};
use crate::solvers::{FittedMixed, MixedEstimator, RegressionError};
use crate::utils::{cholesky, cholesky_solve};
use faer::{Col, Mat};
use std::fmt;
use tracing::{debug, info};

/// Influence of each group on the fixed effects.
#[derive(Debug, Clone)]
pub struct GroupInfluence {
    /// Deleted group labels, in design order.
    pub groups: Vec<String>,
    pub fixed_names: Vec<String>,
    /// Fixed effects with each group removed (groups × p).
    pub deleted_estimates: Mat<f64>,
    /// `(β − β₍₋ⱼ₎)' V(β)⁻¹ (β − β₍₋ⱼ₎) / p`
    pub cooks_distance: Col<f64>,
    /// `(β − β₍₋ⱼ₎) / SE₍₋ⱼ₎` (groups × p)
    pub dfbetas: Mat<f64>,
}

impl GroupInfluence {
    /// Refit `estimator` once per group of `design`, leaving that group out.
    pub fn compute<E: MixedEstimator>(
        estimator: &E,
        design: &MixedDesign,
        full: &MixedResult,
    ) -> Result<Self, RegressionError> {
        let m = design.n_groups();
        let p = full.n_fixed();
        let beta = &full.fixed_effects;
        let vcov_chol = cholesky(&full.vcov);

        let mut deleted_estimates = Mat::zeros(m, p);
        let mut cooks_distance = Col::zeros(m);
        let mut dfbetas = Mat::zeros(m, p);

        for g in 0..m {
            let reduced = design.without_group(g);
            let fitted = estimator.fit(&reduced)?;
            let deleted = fitted.result();

            let shift = Col::from_fn(p, |j| beta[j] - deleted.fixed_effects[j]);
            cooks_distance[g] = match &vcov_chol {
                Some(l) => {
                    let scaled = cholesky_solve(l, &shift);
                    (0..p).map(|j| shift[j] * scaled[j]).sum::<f64>() / p as f64
                }
                None => f64::NAN,
            };
            for j in 0..p {
                deleted_estimates[(g, j)] = deleted.fixed_effects[j];
                let se = deleted.vcov[(j, j)].max(0.0).sqrt();
                dfbetas[(g, j)] = if se > 0.0 { shift[j] / se } else { f64::NAN };
            }
            debug!(
                group = %design.group_labels[g],
                cooks = cooks_distance[g],
                "refit without group"
            );
        }

        let result = Self {
            groups: design.group_labels.clone(),
            fixed_names: full.fixed_names.clone(),
            deleted_estimates,
            cooks_distance,
            dfbetas,
        };
        info!(
            groups = m,
            influential = result.influential_cooks(None).len(),
            "group-deletion influence computed"
        );
        Ok(result)
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Conventional Cook's distance cut-off `4 / m`.
    pub fn cooks_cutoff(&self) -> f64 {
        4.0 / self.n_groups() as f64
    }

    /// Conventional DFBETAS cut-off `2 / √m`.
    pub fn dfbetas_cutoff(&self) -> f64 {
        2.0 / (self.n_groups() as f64).sqrt()
    }

    /// Groups whose Cook's distance exceeds `threshold` (default `4 / m`).
    pub fn influential_cooks(&self, threshold: Option<f64>) -> Vec<usize> {
        let cutoff = threshold.unwrap_or_else(|| self.cooks_cutoff());
        self.cooks_distance
            .iter()
            .enumerate()
            .filter(|(_, &d)| d.is_finite() && d > cutoff)
            .map(|(g, _)| g)
            .collect()
    }

    /// `(group, coefficient)` pairs whose |DFBETAS| exceeds `threshold`
    /// (default `2 / √m`).
    pub fn influential_dfbetas(&self, threshold: Option<f64>) -> Vec<(usize, usize)> {
        let cutoff = threshold.unwrap_or_else(|| self.dfbetas_cutoff());
        let mut flagged = Vec::new();
        for g in 0..self.dfbetas.nrows() {
            for j in 0..self.dfbetas.ncols() {
                let d = self.dfbetas[(g, j)];
                if d.is_finite() && d.abs() > cutoff {
                    flagged.push((g, j));
                }
            }
        }
        flagged
    }
}

impl fmt::Display for GroupInfluence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.groups.iter().map(String::len).max().unwrap_or(0).max(5);
        let col = self.fixed_names.iter().map(String::len).max().unwrap_or(0).max(9);
        write!(f, "{:<w$} {:>9}", "group", "cooks.d", w = width)?;
        for name in &self.fixed_names {
            write!(f, " {:>c$}", name, c = col)?;
        }
        writeln!(f)?;
        for (g, label) in self.groups.iter().enumerate() {
            let mark = if self.cooks_distance[g] > self.cooks_cutoff() { "*" } else { " " };
            write!(f, "{:<w$} {:>8.4}{}", label, self.cooks_distance[g], mark, w = width)?;
            for j in 0..self.fixed_names.len() {
                write!(f, " {:>c$.4}", self.dfbetas[(g, j)], c = col)?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "cut-offs: Cook's distance 4/m = {:.4}, |DFBETAS| 2/sqrt(m) = {:.4}",
            self.cooks_cutoff(),
            self.dfbetas_cutoff()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn influence() -> GroupInfluence {
        GroupInfluence {
            groups: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            fixed_names: vec!["(Intercept)".into(), "money".into()],
            deleted_estimates: Mat::zeros(4, 2),
            cooks_distance: Col::from_fn(4, |g| [0.2, 1.5, 0.9, f64::NAN][g]),
            dfbetas: Mat::from_fn(4, 2, |g, j| if g == 2 && j == 1 { -1.2 } else { 0.1 }),
        }
    }

    #[test]
    fn test_default_cutoffs() {
        let inf = influence();
        assert!((inf.cooks_cutoff() - 1.0).abs() < 1e-12);
        assert!((inf.dfbetas_cutoff() - 1.0).abs() < 1e-12);
        assert_eq!(inf.influential_cooks(None), vec![1]);
        assert_eq!(inf.influential_cooks(Some(0.5)), vec![1, 2]);
        assert_eq!(inf.influential_dfbetas(None), vec![(2, 1)]);
    }

    #[test]
    fn test_display_marks_influential_groups() {
        let text = influence().to_string();
        assert!(text.contains("1.5000*"));
        assert!(text.contains("cut-offs"));
    }
}
