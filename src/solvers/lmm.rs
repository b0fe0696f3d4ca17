//! Linear mixed models by profiled (restricted) maximum likelihood.
//!
//! The random-effect covariance is parameterised as `D = σ² ΛΛ'` with `Λ`
//! lower triangular. For a given `θ = vech(Λ)` the fixed effects and the
//! residual variance have closed forms, so only `θ` is searched numerically.
//! Everything is computed from per-group sufficient statistics; no `n × n`
//! matrix is ever formed.

use crate::core::{
    Criterion, MixedDesign, MixedOptions, MixedOptionsBuilder, MixedResult, VarCorr,
};
use crate::inference::CoefficientInference;
use crate::solvers::optimizer::{NelderMead, OptimizerConfig};
use crate::solvers::traits::{FittedMixed, MixedEstimator, PredictionLevel, RegressionError};
use crate::utils::{
    cholesky, cholesky_inverse, cholesky_solve, log_det_from_cholesky, lower_from_theta,
    mat_mul, solve_lower, solve_lower_mat, theta_len, transpose_mul, transpose_mul_vec,
};
use faer::{Col, Mat};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

/// `Z_g'Z_g`, `Z_g'X_g` and `Z_g'y_g` for one group.
#[derive(Debug, Clone)]
struct GroupBlock {
    ztz: Mat<f64>,
    ztx: Mat<f64>,
    zty: Col<f64>,
}

/// Per-group pieces of an evaluation needed for the BLUPs.
#[derive(Debug, Clone)]
struct GroupFactor {
    /// Cholesky factor of `Λ'Z'ZΛ + I`.
    chol: Mat<f64>,
    /// `Λ'Z'X`.
    u: Mat<f64>,
    /// `Λ'Z'y`.
    w: Col<f64>,
}

/// Everything the profiled criterion produces at one value of `θ`.
#[derive(Debug, Clone)]
pub(crate) struct Evaluation {
    pub deviance: f64,
    pub beta: Col<f64>,
    /// Cholesky factor of `X'V⁻¹X` (with `V` relative to `σ²`).
    xvx_chol: Mat<f64>,
    /// Penalised residual sum of squares.
    r2: f64,
    lambda: Mat<f64>,
    factors: Vec<GroupFactor>,
}

/// The profiled deviance (or REML criterion) of a design as a function of `θ`.
#[derive(Debug, Clone)]
pub(crate) struct ProfiledDeviance {
    blocks: Vec<GroupBlock>,
    xtx: Mat<f64>,
    xty: Col<f64>,
    yty: f64,
    n: usize,
    p: usize,
    q: usize,
    correlated: bool,
    criterion: Criterion,
}

impl ProfiledDeviance {
    pub(crate) fn new(design: &MixedDesign, criterion: Criterion) -> Self {
        let p = design.n_fixed();
        let q = design.n_random();
        let x = &design.x;
        let z = &design.z;
        let y = &design.y;

        let blocks = design
            .group_rows()
            .into_iter()
            .map(|rows| GroupBlock {
                ztz: Mat::from_fn(q, q, |a, b| {
                    rows.iter().map(|&i| z[(i, a)] * z[(i, b)]).sum::<f64>()
                }),
                ztx: Mat::from_fn(q, p, |a, b| {
                    rows.iter().map(|&i| z[(i, a)] * x[(i, b)]).sum::<f64>()
                }),
                zty: Col::from_fn(q, |a| rows.iter().map(|&i| z[(i, a)] * y[i]).sum::<f64>()),
            })
            .collect();

        Self {
            blocks,
            xtx: transpose_mul(x, x),
            xty: transpose_mul_vec(x, y),
            yty: y.iter().map(|v| v * v).sum(),
            n: design.n_observations(),
            p,
            q,
            correlated: design.correlated(),
            criterion,
        }
    }

    pub(crate) fn theta_len(&self) -> usize {
        theta_len(self.q, self.correlated)
    }

    /// Starting point: `Λ = I`.
    pub(crate) fn initial_theta(&self) -> Vec<f64> {
        let identity = Mat::from_fn(self.q, self.q, |i, j| if i == j { 1.0 } else { 0.0 });
        crate::utils::theta_from_lower(&identity, self.correlated)
    }

    /// Criterion value at `θ`; infinite where the evaluation breaks down.
    pub(crate) fn objective(&self, theta: &[f64]) -> f64 {
        self.evaluate(theta).map_or(f64::INFINITY, |e| e.deviance)
    }

    pub(crate) fn evaluate(&self, theta: &[f64]) -> Option<Evaluation> {
        if theta.len() != self.theta_len() || theta.iter().any(|t| !t.is_finite()) {
            return None;
        }
        let lambda = lower_from_theta(theta, self.q, self.correlated);

        let mut xvx = self.xtx.clone();
        let mut xvy = self.xty.clone();
        let mut yvy = self.yty;
        let mut log_det_v = 0.0;
        let mut factors = Vec::with_capacity(self.blocks.len());

        for block in &self.blocks {
            let mut m = transpose_mul(&lambda, &mat_mul(&block.ztz, &lambda));
            for k in 0..self.q {
                m[(k, k)] += 1.0;
            }
            let chol = cholesky(&m)?;
            log_det_v += log_det_from_cholesky(&chol);

            let u = transpose_mul(&lambda, &block.ztx);
            let w = transpose_mul_vec(&lambda, &block.zty);
            let cu = solve_lower_mat(&chol, &u);
            let cw = solve_lower(&chol, &w);

            for a in 0..self.p {
                for b in 0..self.p {
                    xvx[(a, b)] -= (0..self.q).map(|k| cu[(k, a)] * cu[(k, b)]).sum::<f64>();
                }
                xvy[a] -= (0..self.q).map(|k| cu[(k, a)] * cw[k]).sum::<f64>();
            }
            yvy -= cw.iter().map(|v| v * v).sum::<f64>();

            factors.push(GroupFactor { chol, u, w });
        }

        let xvx_chol = cholesky(&xvx)?;
        let beta = cholesky_solve(&xvx_chol, &xvy);
        let r2 = yvy - (0..self.p).map(|j| beta[j] * xvy[j]).sum::<f64>();
        if !(r2 > 0.0) || !r2.is_finite() {
            return None;
        }

        let n = self.n as f64;
        let deviance = match self.criterion {
            Criterion::Ml => log_det_v + n * (1.0 + (2.0 * PI * r2 / n).ln()),
            Criterion::Reml => {
                let df = (self.n - self.p) as f64;
                log_det_v
                    + log_det_from_cholesky(&xvx_chol)
                    + df * (1.0 + (2.0 * PI * r2 / df).ln())
            }
        };
        if !deviance.is_finite() {
            return None;
        }

        Some(Evaluation {
            deviance,
            beta,
            xvx_chol,
            r2,
            lambda,
            factors,
        })
    }
}

/// Flip the sign of every column of `Λ` whose diagonal is negative. `ΛΛ'`
/// is unchanged.
pub(crate) fn canonical_theta(theta: &[f64], q: usize, correlated: bool) -> Vec<f64> {
    let mut lambda = lower_from_theta(theta, q, correlated);
    for j in 0..q {
        if lambda[(j, j)] < 0.0 {
            for i in j..q {
                lambda[(i, j)] = -lambda[(i, j)];
            }
        }
    }
    crate::utils::theta_from_lower(&lambda, correlated)
}

/// Everything a fit needs beyond the evaluation itself.
pub(crate) struct FitMeta {
    pub engine: &'static str,
    pub theta: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Turn an evaluation at the optimum into a [`MixedResult`].
pub(crate) fn finalize(
    design: &MixedDesign,
    profile: &ProfiledDeviance,
    eval: &Evaluation,
    options: &MixedOptions,
    meta: FitMeta,
) -> MixedResult {
    let n = design.n_observations();
    let p = design.n_fixed();
    let q = design.n_random();
    let m = design.n_groups();

    let sigma2 = match options.criterion {
        Criterion::Ml => eval.r2 / n as f64,
        Criterion::Reml => eval.r2 / (n - p) as f64,
    };
    let vcov = {
        let inv = cholesky_inverse(&eval.xvx_chol);
        Mat::from_fn(p, p, |i, j| sigma2 * inv[(i, j)])
    };

    let lambda = &eval.lambda;
    let covariance = Mat::from_fn(q, q, |i, j| {
        sigma2 * (0..q).map(|k| lambda[(i, k)] * lambda[(j, k)]).sum::<f64>()
    });

    // b_g = Λ M⁻¹ (w − uβ), Var(b_g | y) = σ² Λ M⁻¹ Λ'
    let mut random_effects = Mat::zeros(m, q);
    let mut conditional_variances = Vec::with_capacity(m);
    for (g, factor) in eval.factors.iter().enumerate() {
        let rhs = Col::from_fn(q, |k| {
            factor.w[k] - (0..p).map(|j| factor.u[(k, j)] * eval.beta[j]).sum::<f64>()
        });
        let v = cholesky_solve(&factor.chol, &rhs);
        for i in 0..q {
            random_effects[(g, i)] = (0..q).map(|k| lambda[(i, k)] * v[k]).sum::<f64>();
        }

        let m_inv = cholesky_inverse(&factor.chol);
        let lm = mat_mul(lambda, &m_inv);
        conditional_variances.push(Mat::from_fn(q, q, |i, j| {
            sigma2 * (0..q).map(|k| lm[(i, k)] * lambda[(j, k)]).sum::<f64>()
        }));
    }

    let fitted_values = Col::from_fn(n, |i| {
        let g = design.groups[i];
        (0..p).map(|j| design.x[(i, j)] * eval.beta[j]).sum::<f64>()
            + (0..q).map(|k| design.z[(i, k)] * random_effects[(g, k)]).sum::<f64>()
    });
    let residuals = Col::from_fn(n, |i| design.y[i] - fitted_values[i]);

    let n_parameters = p + profile.theta_len() + 1;
    let deviance = eval.deviance;
    let k = n_parameters as f64;

    let wald = options
        .compute_inference
        .then(|| CoefficientInference::wald(&eval.beta, &vcov, options.confidence_level));
    let (std_errors, z_statistics, p_values, lower, upper) = match wald {
        Some(w) => (
            Some(w.std_errors),
            Some(w.z_statistics),
            Some(w.p_values),
            Some(w.lower),
            Some(w.upper),
        ),
        None => (None, None, None, None, None),
    };

    MixedResult {
        engine: meta.engine,
        formula: design.formula.clone(),
        criterion: options.criterion,
        fixed_names: design.fixed_names.clone(),
        fixed_effects: eval.beta.clone(),
        vcov,
        std_errors,
        z_statistics,
        p_values,
        conf_interval_lower: lower,
        conf_interval_upper: upper,
        confidence_level: options.confidence_level,
        var_corr: VarCorr {
            group: design.formula.random.group.clone(),
            terms: design.random_names.clone(),
            covariance,
            residual_variance: sigma2,
            correlated: design.correlated(),
        },
        theta: meta.theta,
        sigma: sigma2.sqrt(),
        log_likelihood: -0.5 * deviance,
        deviance,
        aic: deviance + 2.0 * k,
        bic: deviance + k * (n as f64).ln(),
        n_observations: n,
        n_groups: m,
        n_parameters,
        fitted_values,
        residuals,
        group_labels: design.group_labels.clone(),
        random_effects,
        conditional_variances,
        converged: meta.converged,
        iterations: meta.iterations,
    }
}

/// Checks shared by both engines.
pub(crate) fn validate_design(design: &MixedDesign) -> Result<(), RegressionError> {
    let n = design.n_observations();
    if design.x.nrows() != n {
        return Err(RegressionError::DimensionMismatch {
            x_rows: design.x.nrows(),
            y_len: n,
        });
    }
    if design.z.nrows() != n {
        return Err(RegressionError::DimensionMismatch {
            x_rows: design.z.nrows(),
            y_len: n,
        });
    }
    if design.n_groups() < 2 {
        return Err(RegressionError::InsufficientGroups {
            needed: 2,
            got: design.n_groups(),
        });
    }
    let needed = design.n_fixed() + 2;
    if n < needed {
        return Err(RegressionError::InsufficientObservations { needed, got: n });
    }
    if cholesky(&transpose_mul(&design.x, &design.x)).is_none() {
        return Err(RegressionError::SingularMatrix);
    }
    Ok(())
}

/// Predictions for the rows of `design` from a fitted result.
pub(crate) fn predict_design(
    result: &MixedResult,
    design: &MixedDesign,
    level: PredictionLevel,
) -> Col<f64> {
    let p = design.n_fixed().min(result.n_fixed());
    let q = design.n_random().min(result.random_effects.ncols());
    let lookup: Vec<Option<usize>> = design
        .group_labels
        .iter()
        .map(|label| result.group_labels.iter().position(|l| l == label))
        .collect();

    Col::from_fn(design.n_observations(), |i| {
        let mut pred = (0..p).map(|j| design.x[(i, j)] * result.fixed_effects[j]).sum::<f64>();
        if level == PredictionLevel::Group {
            if let Some(g) = lookup[design.groups[i]] {
                pred += (0..q)
                    .map(|k| design.z[(i, k)] * result.random_effects[(g, k)])
                    .sum::<f64>();
            }
        }
        pred
    })
}

/// Linear mixed model estimator using the profiled deviance.
///
/// # Example
///
/// ```rust,ignore
/// use hlm_rs::prelude::*;
///
/// let formula = Formula::parse("votepct ~ party + money + (1 | state)")?;
/// let fitted = LmmRegressor::builder().build().fit_formula(&dataset, &formula)?;
/// println!("{}", fitted.result());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LmmRegressor {
    options: MixedOptions,
}

impl LmmRegressor {
    pub const ENGINE: &'static str = "profiled deviance";

    pub fn new(options: MixedOptions) -> Self {
        Self { options }
    }

    pub fn builder() -> LmmRegressorBuilder {
        LmmRegressorBuilder::default()
    }

    pub fn options(&self) -> &MixedOptions {
        &self.options
    }
}

impl MixedEstimator for LmmRegressor {
    type Fitted = FittedLmm;

    fn fit(&self, design: &MixedDesign) -> Result<FittedLmm, RegressionError> {
        self.options.validate()?;
        validate_design(design)?;

        let profile = ProfiledDeviance::new(design, self.options.criterion);
        let start = profile.initial_theta();
        if profile.evaluate(&start).is_none() {
            return Err(RegressionError::NumericalError(
                "criterion is not finite at the starting values".to_string(),
            ));
        }

        let optimizer = NelderMead::new(OptimizerConfig {
            max_evaluations: self.options.max_iterations,
            tolerance: self.options.tolerance,
            ..Default::default()
        });
        let objective = |theta: &[f64]| profile.objective(theta);
        let optimum = optimizer.minimize(&objective, &start);
        debug!(
            value = optimum.value,
            evaluations = optimum.evaluations,
            "profiled criterion minimised"
        );

        let theta = canonical_theta(&optimum.params, design.n_random(), design.correlated());
        let eval = profile.evaluate(&theta).ok_or_else(|| {
            RegressionError::NumericalError("criterion is not finite at the optimum".to_string())
        })?;

        if !optimum.converged {
            warn!(
                formula = %design.formula,
                evaluations = optimum.evaluations,
                "optimizer reached its evaluation limit before converging"
            );
        }

        let result = finalize(
            design,
            &profile,
            &eval,
            &self.options,
            FitMeta {
                engine: Self::ENGINE,
                theta,
                iterations: optimum.evaluations,
                converged: optimum.converged,
            },
        );
        info!(
            formula = %design.formula,
            criterion = %self.options.criterion,
            log_likelihood = result.log_likelihood,
            "fitted linear mixed model"
        );
        Ok(FittedLmm { result })
    }
}

/// A fitted linear mixed model.
#[derive(Debug, Clone)]
pub struct FittedLmm {
    result: MixedResult,
}

impl FittedLmm {
    /// Relative covariance parameters at the optimum.
    pub fn theta(&self) -> &[f64] {
        &self.result.theta
    }

    pub fn into_result(self) -> MixedResult {
        self.result
    }
}

impl FittedMixed for FittedLmm {
    fn result(&self) -> &MixedResult {
        &self.result
    }

    fn predict(&self, design: &MixedDesign, level: PredictionLevel) -> Col<f64> {
        predict_design(&self.result, design, level)
    }
}

/// Builder for [`LmmRegressor`].
#[derive(Debug, Clone, Default)]
pub struct LmmRegressorBuilder {
    builder: MixedOptionsBuilder,
}

impl LmmRegressorBuilder {
    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.builder = self.builder.criterion(criterion);
        self
    }

    pub fn reml(mut self, reml: bool) -> Self {
        self.builder = self.builder.reml(reml);
        self
    }

    pub fn compute_inference(mut self, compute: bool) -> Self {
        self.builder = self.builder.compute_inference(compute);
        self
    }

    pub fn confidence_level(mut self, level: f64) -> Self {
        self.builder = self.builder.confidence_level(level);
        self
    }

    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.builder = self.builder.max_iterations(max_iter);
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.builder = self.builder.tolerance(tol);
        self
    }

    /// Options are validated when the model is fit.
    pub fn build(self) -> LmmRegressor {
        LmmRegressor::new(self.builder.build_unchecked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Formula;

    /// Balanced one-way layout: 4 groups × 3 observations.
    fn one_way() -> MixedDesign {
        let y = [9.0, 11.0, 10.0, 14.0, 15.0, 16.0, 5.0, 7.0, 6.0, 12.0, 10.0, 11.0];
        let groups: Vec<usize> = (0..12).map(|i| i / 3).collect();
        MixedDesign {
            formula: Formula::parse("y ~ 1 + (1 | g)").expect("formula"),
            y: Col::from_fn(12, |i| y[i]),
            x: Mat::from_fn(12, 1, |_, _| 1.0),
            z: Mat::from_fn(12, 1, |_, _| 1.0),
            groups,
            group_labels: (1..=4).map(|g| g.to_string()).collect(),
            fixed_names: vec!["(Intercept)".to_string()],
            random_names: vec!["(Intercept)".to_string()],
        }
    }

    #[test]
    fn test_reml_matches_anova_estimator() {
        // group means 10, 15, 6, 11; grand mean 10.5
        // MSW = 8 / 8 = 1, MSB = 3 * 41 / 3 = 41, τ² = (41 − 1) / 3
        let fitted = LmmRegressor::new(MixedOptions::reml()).fit(&one_way()).expect("fit");
        let r = fitted.result();

        assert!((r.fixed_effects[0] - 10.5).abs() < 1e-6);
        assert!((r.var_corr.residual_variance - 1.0).abs() < 1e-3);
        assert!((r.var_corr.variance(0) - 40.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_blups_shrink_toward_mean() {
        let fitted = LmmRegressor::default().fit(&one_way()).expect("fit");
        let r = fitted.result();
        let means = [10.0, 15.0, 6.0, 11.0];
        for (g, mean) in means.iter().enumerate() {
            let deviation = mean - r.fixed_effects[0];
            let blup = r.random_effects[(g, 0)];
            assert!(blup.abs() <= deviation.abs() + 1e-9);
            assert!(blup * deviation >= 0.0);
        }
        let total: f64 = (0..4).map(|g| r.random_effects[(g, 0)]).sum();
        assert!(total.abs() < 1e-6);
    }

    #[test]
    fn test_profile_matches_finalized_likelihood() {
        let design = one_way();
        let fitted = LmmRegressor::default().fit(&design).expect("fit");
        let profile = ProfiledDeviance::new(&design, Criterion::Ml);
        let dev = profile.objective(fitted.theta());
        assert!((fitted.result().deviance - dev).abs() < 1e-10);
        assert!((fitted.log_likelihood() + 0.5 * dev).abs() < 1e-10);
        assert_eq!(fitted.result().n_parameters, 3);
    }

    #[test]
    fn test_canonical_theta_flips_columns() {
        let theta = canonical_theta(&[-1.0, 0.5, 2.0], 2, true);
        assert_eq!(theta, vec![1.0, -0.5, 2.0]);
        assert_eq!(canonical_theta(&[-0.3], 1, false), vec![0.3]);
    }

    #[test]
    fn test_single_group_rejected() {
        let mut design = one_way();
        design.groups = vec![0; 12];
        design.group_labels = vec!["1".to_string()];
        let err = LmmRegressor::default().fit(&design).unwrap_err();
        assert!(matches!(err, RegressionError::InsufficientGroups { .. }));
    }

    #[test]
    fn test_group_prediction_reproduces_fitted_values() {
        let design = one_way();
        let fitted = LmmRegressor::default().fit(&design).expect("fit");
        let pred = fitted.predict(&design, PredictionLevel::Group);
        for i in 0..12 {
            assert!((pred[i] - fitted.result().fitted_values[i]).abs() < 1e-10);
        }
        let population = fitted.predict(&design, PredictionLevel::Population);
        assert!((population[0] - fitted.fixed_effects()[0]).abs() < 1e-12);
    }
}
