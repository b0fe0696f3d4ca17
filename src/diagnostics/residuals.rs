//! Residual diagnostics for mixed-model fits.

use crate::core::MixedResult;
use crate::inference::normal_quantile;
use faer::Col;

/// Conditional residuals divided by the residual standard deviation.
pub fn standardized_residuals(result: &MixedResult) -> Col<f64> {
    let residuals = &result.residuals;
    let s = result.sigma;
    if !(s > 0.0) || !s.is_finite() {
        return Col::from_fn(residuals.nrows(), |_| f64::NAN);
    }
    Col::from_fn(residuals.nrows(), |i| residuals[i] / s)
}

/// Plotting positions `(i − a) / (n + 1 − 2a)`, with `a = 3/8` for `n ≤ 10`
/// and `1/2` otherwise.
pub fn ppoints(n: usize) -> Vec<f64> {
    let a = if n <= 10 { 3.0 / 8.0 } else { 0.5 };
    (1..=n)
        .map(|i| (i as f64 - a) / (n as f64 + 1.0 - 2.0 * a))
        .collect()
}

/// Normal QQ coordinates: theoretical quantiles against the sorted sample.
/// NaN values are dropped.
pub fn normal_qq(values: &Col<f64>) -> Vec<(f64, f64)> {
    let mut sample: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sample.sort_by(f64::total_cmp);
    ppoints(sample.len())
        .into_iter()
        .map(normal_quantile)
        .zip(sample)
        .collect()
}
