//! Design matrices for a mixed model.

use super::formula::{Formula, Term};
use crate::data::{DataError, Dataset, Frame};
use faer::{Col, Mat};
use thiserror::Error;

/// Errors raised while assembling a design.
#[derive(Debug, Error)]
pub enum DesignError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("column `{0}` has missing values; drop incomplete rows first")]
    MissingValues(String),

    #[error("formula groups by `{formula}` but the dataset is grouped by `{dataset}`")]
    GroupMismatch { formula: String, dataset: String },

    #[error("design has no observations")]
    Empty,
}

/// Response, fixed-effect matrix `X`, random-effect matrix `Z`, and the group
/// of every row.
#[derive(Debug, Clone)]
pub struct MixedDesign {
    pub formula: Formula,
    pub y: Col<f64>,
    pub x: Mat<f64>,
    pub z: Mat<f64>,
    pub groups: Vec<usize>,
    pub group_labels: Vec<String>,
    pub fixed_names: Vec<String>,
    pub random_names: Vec<String>,
}

impl MixedDesign {
    /// Assemble the design for `formula` on `dataset`.
    pub fn from_dataset(dataset: &Dataset, formula: &Formula) -> Result<Self, DesignError> {
        if formula.random.group != dataset.group.name() {
            return Err(DesignError::GroupMismatch {
                formula: formula.random.group.clone(),
                dataset: dataset.group.name().to_string(),
            });
        }
        let frame = &dataset.frame;
        let n = frame.nrows();
        if n == 0 {
            return Err(DesignError::Empty);
        }

        let y_values = checked_numeric(frame, &formula.response)?;
        let y = Col::from_fn(n, |i| y_values[i]);

        let x = build_matrix(frame, formula.intercept, &formula.fixed)?;
        let z = build_matrix(frame, formula.random.intercept, &formula.random.slopes)?;

        Ok(Self {
            formula: formula.clone(),
            y,
            x,
            z,
            groups: dataset.group.codes().to_vec(),
            group_labels: dataset.group.levels().to_vec(),
            fixed_names: formula.fixed_names(),
            random_names: formula.random_names(),
        })
    }

    pub fn n_observations(&self) -> usize {
        self.y.nrows()
    }

    /// Number of fixed-effect columns `p`.
    pub fn n_fixed(&self) -> usize {
        self.x.ncols()
    }

    /// Number of random effects per group `q`.
    pub fn n_random(&self) -> usize {
        self.z.ncols()
    }

    pub fn n_groups(&self) -> usize {
        self.group_labels.len()
    }

    /// Whether the random effects within a group are correlated.
    pub fn correlated(&self) -> bool {
        self.formula.random.correlated
    }

    /// Row indices of every group, in group-code order.
    pub fn group_rows(&self) -> Vec<Vec<usize>> {
        let mut rows = vec![Vec::new(); self.n_groups()];
        for (i, &g) in self.groups.iter().enumerate() {
            rows[g].push(i);
        }
        rows
    }

    /// The design with every row of group `code` removed. Remaining groups
    /// keep their relative order.
    pub fn without_group(&self, code: usize) -> MixedDesign {
        let rows: Vec<usize> = (0..self.n_observations())
            .filter(|&i| self.groups[i] != code)
            .collect();

        let mut labels = self.group_labels.clone();
        labels.remove(code);

        MixedDesign {
            formula: self.formula.clone(),
            y: Col::from_fn(rows.len(), |i| self.y[rows[i]]),
            x: Mat::from_fn(rows.len(), self.n_fixed(), |i, j| self.x[(rows[i], j)]),
            z: Mat::from_fn(rows.len(), self.n_random(), |i, j| self.z[(rows[i], j)]),
            groups: rows
                .iter()
                .map(|&i| {
                    let g = self.groups[i];
                    if g > code {
                        g - 1
                    } else {
                        g
                    }
                })
                .collect(),
            group_labels: labels,
            fixed_names: self.fixed_names.clone(),
            random_names: self.random_names.clone(),
        }
    }
}

fn checked_numeric<'a>(frame: &'a Frame, name: &str) -> Result<&'a [f64], DesignError> {
    let values = frame.numeric(name)?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DesignError::MissingValues(name.to_string()));
    }
    Ok(values)
}

fn build_matrix(frame: &Frame, intercept: bool, terms: &[Term]) -> Result<Mat<f64>, DesignError> {
    let n = frame.nrows();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(terms.len() + 1);
    if intercept {
        columns.push(vec![1.0; n]);
    }
    for term in terms {
        let mut product = vec![1.0; n];
        for factor in term.factors() {
            let values = checked_numeric(frame, factor)?;
            for (p, v) in product.iter_mut().zip(values) {
                *p *= v;
            }
        }
        columns.push(product);
    }
    Ok(Mat::from_fn(n, columns.len(), |i, j| columns[j][i]))
}
