//! Linear mixed models by the EM algorithm of Laird and Ware.
//!
//! A second, independent estimation route: each iteration forms the marginal
//! covariance `V_g = Z_g D Z_g' + σ²I` of every group explicitly, solves the
//! GLS problem for `β`, and updates `D` and `σ²` from the conditional moments
//! of the random effects. Only maximum likelihood is supported.

use crate::core::{
    Criterion, MixedDesign, MixedOptions, MixedOptionsBuilder, MixedResult, OptionsError,
};
use crate::solvers::lmm::{
    canonical_theta, finalize, predict_design, validate_design, FitMeta, ProfiledDeviance,
};
use crate::solvers::ols::OlsRegressor;
use crate::solvers::traits::{
    FittedMixed, FittedRegressor, MixedEstimator, PredictionLevel, RegressionError, Regressor,
};
use crate::utils::{
    cholesky, cholesky_inverse, cholesky_semidefinite, cholesky_solve, log_det_from_cholesky,
    mat_mul, theta_from_lower, transpose_mul, transpose_mul_vec,
};
use faer::{Col, Mat};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

/// Rows of one group.
struct GroupData {
    x: Mat<f64>,
    z: Mat<f64>,
    y: Col<f64>,
}

impl GroupData {
    fn split(design: &MixedDesign) -> Vec<GroupData> {
        design
            .group_rows()
            .into_iter()
            .map(|rows| GroupData {
                x: Mat::from_fn(rows.len(), design.n_fixed(), |i, j| design.x[(rows[i], j)]),
                z: Mat::from_fn(rows.len(), design.n_random(), |i, j| design.z[(rows[i], j)]),
                y: Col::from_fn(rows.len(), |i| design.y[rows[i]]),
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.y.nrows()
    }
}

/// State of the EM iteration.
struct EmState {
    beta: Col<f64>,
    covariance: Mat<f64>,
    sigma2: f64,
}

/// One pass over the groups: the log-likelihood at the current state and the
/// updated state.
fn em_step(groups: &[GroupData], state: &EmState, correlated: bool) -> Option<(f64, EmState)> {
    let p = state.beta.nrows();
    let q = state.covariance.nrows();
    let d = &state.covariance;
    let sigma2 = state.sigma2;

    // marginal covariances and their inverses
    let mut inverses = Vec::with_capacity(groups.len());
    let mut log_dets = Vec::with_capacity(groups.len());
    let mut xvx = Mat::<f64>::zeros(p, p);
    let mut xvy = Col::<f64>::zeros(p);
    for group in groups {
        let zd = mat_mul(&group.z, d);
        let mut v = Mat::from_fn(group.len(), group.len(), |i, j| {
            (0..q).map(|k| zd[(i, k)] * group.z[(j, k)]).sum::<f64>()
        });
        for i in 0..group.len() {
            v[(i, i)] += sigma2;
        }
        let chol = cholesky(&v)?;
        log_dets.push(log_det_from_cholesky(&chol));
        let v_inv = cholesky_inverse(&chol);

        let vx = mat_mul(&v_inv, &group.x);
        let vy = Col::from_fn(group.len(), |i| {
            (0..group.len()).map(|k| v_inv[(i, k)] * group.y[k]).sum::<f64>()
        });
        let gx = transpose_mul(&group.x, &vx);
        let gy = transpose_mul_vec(&group.x, &vy);
        for a in 0..p {
            for b in 0..p {
                xvx[(a, b)] += gx[(a, b)];
            }
            xvy[a] += gy[a];
        }
        inverses.push(v_inv);
    }
    let beta = cholesky_solve(&cholesky(&xvx)?, &xvy);

    let n: usize = groups.iter().map(GroupData::len).sum();
    let mut log_likelihood = 0.0;
    let mut sigma_sum = 0.0;
    let mut d_sum = Mat::<f64>::zeros(q, q);

    for ((group, v_inv), log_det) in groups.iter().zip(&inverses).zip(&log_dets) {
        let ng = group.len();
        let r = Col::from_fn(ng, |i| {
            group.y[i] - (0..p).map(|j| group.x[(i, j)] * beta[j]).sum::<f64>()
        });
        let vr = Col::from_fn(ng, |i| (0..ng).map(|k| v_inv[(i, k)] * r[k]).sum::<f64>());
        let quad: f64 = (0..ng).map(|i| r[i] * vr[i]).sum();
        log_likelihood -= 0.5 * (ng as f64 * (2.0 * PI).ln() + log_det + quad);

        // b = D Z' V⁻¹ r,  Var(b | y) = D − D Z' V⁻¹ Z D
        let ztvr = transpose_mul_vec(&group.z, &vr);
        let b = Col::from_fn(q, |i| (0..q).map(|k| d[(i, k)] * ztvr[k]).sum::<f64>());
        let zd = mat_mul(&group.z, d);
        let vzd = mat_mul(v_inv, &zd);
        let dzvzd = transpose_mul(&zd, &vzd);

        let e = Col::from_fn(ng, |i| r[i] - (0..q).map(|k| group.z[(i, k)] * b[k]).sum::<f64>());
        let trace_v_inv: f64 = (0..ng).map(|i| v_inv[(i, i)]).sum();
        sigma_sum +=
            e.iter().map(|v| v * v).sum::<f64>() + sigma2 * (ng as f64 - sigma2 * trace_v_inv);

        for i in 0..q {
            for j in 0..q {
                if correlated || i == j {
                    d_sum[(i, j)] += b[i] * b[j] + d[(i, j)] - dzvzd[(i, j)];
                }
            }
        }
    }

    let m = groups.len() as f64;
    let next = EmState {
        beta,
        covariance: Mat::from_fn(q, q, |i, j| d_sum[(i, j)] / m),
        sigma2: sigma_sum / n as f64,
    };
    if !log_likelihood.is_finite() || !(next.sigma2 > 0.0) {
        return None;
    }
    Some((log_likelihood, next))
}

/// Linear mixed model estimator using EM iterations.
#[derive(Debug, Clone)]
pub struct EmRegressor {
    options: MixedOptions,
}

impl Default for EmRegressor {
    fn default() -> Self {
        Self {
            options: MixedOptions {
                tolerance: 1e-9,
                ..MixedOptions::ml()
            },
        }
    }
}

impl EmRegressor {
    pub const ENGINE: &'static str = "EM";

    pub fn new(options: MixedOptions) -> Self {
        Self { options }
    }

    pub fn builder() -> EmRegressorBuilder {
        EmRegressorBuilder::default()
    }

    pub fn options(&self) -> &MixedOptions {
        &self.options
    }
}

impl MixedEstimator for EmRegressor {
    type Fitted = FittedEm;

    fn fit(&self, design: &MixedDesign) -> Result<FittedEm, RegressionError> {
        self.options.validate()?;
        if self.options.criterion != Criterion::Ml {
            return Err(OptionsError::UnsupportedCriterion {
                engine: Self::ENGINE,
                criterion: self.options.criterion,
            }
            .into());
        }
        validate_design(design)?;

        let q = design.n_random();
        let correlated = design.correlated();
        let groups = GroupData::split(design);

        let ols = OlsRegressor::builder()
            .with_intercept(false)
            .build()
            .fit(&design.x, &design.y)?;
        let sigma2 = ols.residual_variance();
        if !(sigma2 > 0.0) {
            return Err(RegressionError::NumericalError(
                "residual variance of the starting OLS fit is zero".to_string(),
            ));
        }
        let mut state = EmState {
            beta: ols.coefficients().clone(),
            covariance: Mat::from_fn(q, q, |i, j| if i == j { sigma2 } else { 0.0 }),
            sigma2,
        };

        let mut previous = f64::NEG_INFINITY;
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.options.max_iterations {
            let (log_likelihood, next) = em_step(&groups, &state, correlated).ok_or_else(|| {
                RegressionError::NumericalError(format!(
                    "marginal covariance lost positive definiteness at iteration {}",
                    iterations + 1
                ))
            })?;
            iterations += 1;
            state = next;
            let scale = 1.0 + log_likelihood.abs();
            if (log_likelihood - previous).abs() < self.options.tolerance * scale {
                converged = true;
                break;
            }
            previous = log_likelihood;
        }
        debug!(iterations, converged, "EM iterations finished");
        if !converged {
            warn!(
                formula = %design.formula,
                iterations,
                "EM reached its iteration limit before converging"
            );
        }

        // D = σ² ΛΛ'
        let relative = Mat::from_fn(q, q, |i, j| state.covariance[(i, j)] / state.sigma2);
        let lambda = cholesky_semidefinite(&relative, self.options.rank_tolerance);
        let theta = canonical_theta(&theta_from_lower(&lambda, correlated), q, correlated);

        let profile = ProfiledDeviance::new(design, Criterion::Ml);
        let eval = profile.evaluate(&theta).ok_or_else(|| {
            RegressionError::NumericalError(
                "likelihood is not finite at the EM estimate".to_string(),
            )
        })?;
        let result = finalize(
            design,
            &profile,
            &eval,
            &self.options,
            FitMeta {
                engine: Self::ENGINE,
                theta,
                iterations,
                converged,
            },
        );
        info!(
            formula = %design.formula,
            log_likelihood = result.log_likelihood,
            iterations,
            "fitted linear mixed model by EM"
        );
        Ok(FittedEm { result })
    }
}

/// A linear mixed model fitted by EM.
#[derive(Debug, Clone)]
pub struct FittedEm {
    result: MixedResult,
}

impl FittedEm {
    pub fn into_result(self) -> MixedResult {
        self.result
    }
}

impl FittedMixed for FittedEm {
    fn result(&self) -> &MixedResult {
        &self.result
    }

    fn predict(&self, design: &MixedDesign, level: PredictionLevel) -> Col<f64> {
        predict_design(&self.result, design, level)
    }
}

/// Builder for [`EmRegressor`].
#[derive(Debug, Clone)]
pub struct EmRegressorBuilder {
    builder: MixedOptionsBuilder,
}

impl Default for EmRegressorBuilder {
    fn default() -> Self {
        Self {
            builder: MixedOptionsBuilder::new().tolerance(1e-9),
        }
    }
}

impl EmRegressorBuilder {
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
    pub fn build(self) -> EmRegressor {
        EmRegressor::new(self.builder.build_unchecked())
    }
}
