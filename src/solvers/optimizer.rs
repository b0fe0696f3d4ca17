//! Derivative-free minimisation of the profiled deviance.

use tracing::debug;

/// A scalar objective over a parameter vector.
///
/// Points outside the feasible region should evaluate to `f64::INFINITY`.
pub trait ObjectiveFunction {
    fn value(&self, params: &[f64]) -> f64;
}

impl<F: Fn(&[f64]) -> f64> ObjectiveFunction for F {
    fn value(&self, params: &[f64]) -> f64 {
        self(params)
    }
}

/// Stopping rules for [`NelderMead`].
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of objective evaluations across all restarts.
    pub max_evaluations: usize,
    /// Stop when the spread of objective values over the simplex falls below
    /// `tolerance * (1 + |f_best|)`.
    pub tolerance: f64,
    /// Edge length of the initial simplex, relative to each coordinate.
    pub initial_step: f64,
    /// Number of times the search restarts from its best point.
    pub restarts: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            tolerance: 1e-10,
            initial_step: 0.25,
            restarts: 2,
        }
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub params: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub converged: bool,
}

/// Nelder–Mead simplex search with restarts.
#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    config: OptimizerConfig,
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl NelderMead {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimise `objective` starting from `start`.
    pub fn minimize<F: ObjectiveFunction>(
        &self,
        objective: &F,
        start: &[f64],
    ) -> OptimizationResult {
        let mut best = start.to_vec();
        let mut best_value = objective.value(&best);
        let mut evaluations = 1;
        let mut converged = false;

        if best.is_empty() {
            return OptimizationResult {
                params: best,
                value: best_value,
                evaluations,
                converged: true,
            };
        }

        for round in 0..=self.config.restarts {
            let budget = self.config.max_evaluations.saturating_sub(evaluations);
            if budget == 0 {
                break;
            }
            let run = self.search(objective, &best, budget);
            evaluations += run.evaluations;
            let improved = best_value - run.value;
            if run.value <= best_value {
                best = run.params;
                best_value = run.value;
            }
            converged = run.converged;
            debug!(round, value = best_value, evaluations, "simplex search finished");
            if converged && improved.abs() <= self.config.tolerance * (1.0 + best_value.abs()) {
                break;
            }
        }

        OptimizationResult {
            params: best,
            value: best_value,
            evaluations,
            converged,
        }
    }

    fn search<F: ObjectiveFunction>(
        &self,
        objective: &F,
        start: &[f64],
        budget: usize,
    ) -> OptimizationResult {
        let dim = start.len();
        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
        simplex.push(start.to_vec());
        for k in 0..dim {
            let mut vertex = start.to_vec();
            let step = if vertex[k].abs() > 1e-8 {
                self.config.initial_step * vertex[k].abs()
            } else {
                self.config.initial_step
            };
            vertex[k] += step;
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| objective.value(v)).collect();
        let mut evaluations = simplex.len();
        let mut converged = false;

        while evaluations < budget {
            let mut order: Vec<usize> = (0..=dim).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let spread = values[dim] - values[0];
            let scale = 1.0 + values[0].abs();
            if values[0].is_finite() && spread.abs() <= self.config.tolerance * scale {
                converged = true;
                break;
            }

            let centroid: Vec<f64> = (0..dim)
                .map(|k| simplex[..dim].iter().map(|v| v[k]).sum::<f64>() / dim as f64)
                .collect();
            let toward = |coef: f64| -> Vec<f64> {
                (0..dim)
                    .map(|k| centroid[k] + coef * (simplex[dim][k] - centroid[k]))
                    .collect()
            };

            let reflected = toward(-REFLECTION);
            let f_reflected = objective.value(&reflected);
            evaluations += 1;

            if f_reflected < values[0] {
                let expanded = toward(-REFLECTION * EXPANSION);
                let f_expanded = objective.value(&expanded);
                evaluations += 1;
                if f_expanded < f_reflected {
                    simplex[dim] = expanded;
                    values[dim] = f_expanded;
                } else {
                    simplex[dim] = reflected;
                    values[dim] = f_reflected;
                }
                continue;
            }
            if f_reflected < values[dim - 1] {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < values[dim] {
                let point = toward(-REFLECTION * CONTRACTION);
                let value = objective.value(&point);
                (point, value)
            } else {
                let point = toward(CONTRACTION);
                let value = objective.value(&point);
                (point, value)
            };
            evaluations += 1;
            if f_contracted < values[dim].min(f_reflected) {
                simplex[dim] = contracted;
                values[dim] = f_contracted;
                continue;
            }

            for i in 1..=dim {
                for k in 0..dim {
                    simplex[i][k] = simplex[0][k] + SHRINK * (simplex[i][k] - simplex[0][k]);
                }
                values[i] = objective.value(&simplex[i]);
            }
            evaluations += dim;
        }

        let best = (0..=dim)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        OptimizationResult {
            params: simplex[best].clone(),
            value: values[best],
            evaluations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_minimum() {
        let objective = |p: &[f64]| (p[0] - 1.0).powi(2) + 3.0 * (p[1] + 2.0).powi(2);
        let result = NelderMead::default().minimize(&objective, &[0.0, 0.0]);

        assert!(result.converged);
        assert!((result.params[0] - 1.0).abs() < 1e-4);
        assert!((result.params[1] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_rosenbrock() {
        let objective = |p: &[f64]| (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2);
        let result = NelderMead::default().minimize(&objective, &[-1.2, 1.0]);
        assert!((result.params[0] - 1.0).abs() < 1e-3);
        assert!((result.params[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_infeasible_region_is_avoided() {
        let objective = |p: &[f64]| if p[0] < 0.5 { f64::INFINITY } else { (p[0] - 0.5).powi(2) };
        let result = NelderMead::default().minimize(&objective, &[2.0]);
        assert!(result.value.is_finite());
        assert!(result.params[0] >= 0.5);
    }

    #[test]
    fn test_budget_is_respected() {
        let config = OptimizerConfig {
            max_evaluations: 20,
            ..Default::default()
        };
        let objective = |p: &[f64]| (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2);
        let result = NelderMead::new(config).minimize(&objective, &[-1.2, 1.0]);
        assert!(result.evaluations <= 20 + 3);
        assert!(!result.converged);
    }
}
