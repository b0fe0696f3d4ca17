//! SVG plots of the data and of fitted models.
//!
//! Every function renders one file and returns once it is written.

mod diagnostics;
mod scatter;

pub use diagnostics::{dotplot, influence_plot, residual_plots};
pub use scatter::{facet_grid, group_lines, scatter};

use crate::solvers::{FittedRegressor, OlsRegressor, Regressor};
use faer::{Col, Mat};
use plotters::drawing::DrawingAreaErrorKind;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while rendering a plot.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("failed to create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("drawing failed: {0}")]
    Drawing(String),

    #[error("nothing to plot: {0}")]
    Empty(String),

    #[error(transparent)]
    Data(#[from] crate::data::DataError),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for PlotError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        PlotError::Drawing(err.to_string())
    }
}

/// Create the parent directory of `path` if needed.
fn prepare(path: &Path) -> Result<(), PlotError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| PlotError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn written(path: &Path) {
    info!(path = %path.display(), "wrote plot");
}

/// Span of the finite values with 5% padding on each side.
fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.5_f64.max(lo.abs() * 0.05) };
    (lo - pad)..(hi + pad)
}

/// Intercept and slope of the least-squares line of `y` on `x`; `None` when
/// `x` has no spread.
fn ols_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let design = Mat::from_fn(x.len(), 1, |i, _| x[i]);
    let response = Col::from_fn(y.len(), |i| y[i]);
    let fitted = OlsRegressor::builder()
        .with_intercept(true)
        .build()
        .fit(&design, &response)
        .ok()?;
    let slope = fitted.coefficients()[0];
    let intercept = fitted.intercept()?;
    (slope.is_finite() && intercept.is_finite()).then_some((intercept, slope))
}
