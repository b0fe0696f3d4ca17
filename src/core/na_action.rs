//! NA (missing value) handling for data frames.
//!
//! Three R-compatible policies:
//! - `Omit`: remove rows with a missing value in any column (`na.omit`)
//! - `Fail`: return an error if any value is missing (`na.fail`)
//! - `Pass`: keep every row (`na.pass`)
//!
//! # Example
//!
//! ```
//! use hlm_rs::core::{NaAction, NaHandler};
//! use hlm_rs::data::{Column, Frame};
//!
//! let frame = Frame::from_columns([
//!     ("x", Column::Numeric(vec![1.0, f64::NAN, 3.0])),
//!     ("y", Column::Numeric(vec![2.0, 4.0, 6.0])),
//! ])
//! .unwrap();
//!
//! let result = NaHandler::process(&frame, NaAction::Omit).unwrap();
//! assert_eq!(result.frame.nrows(), 2);
//! assert_eq!(result.na_info.kept_indices, vec![0, 2]);
//! ```

use crate::data::Frame;
use thiserror::Error;

/// Action to take when missing values are encountered.
///
/// Mirrors R's `na.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NaAction {
    /// Remove rows containing missing values.
    #[default]
    Omit,

    /// Return an error if any value is missing.
    Fail,

    /// Keep missing values; downstream code must cope with them.
    Pass,
}

/// Errors raised while applying an [`NaAction`].
#[derive(Debug, Error)]
pub enum NaError {
    /// Missing values found while using `NaAction::Fail`.
    #[error("NA values found in data (na.fail): {n_na} rows contain missing values")]
    NaValuesPresent { n_na: usize },

    /// Every row had a missing value.
    #[error("all observations contain NA values")]
    AllNa,
}

/// What the NA handler did to a frame.
#[derive(Debug, Clone)]
pub struct NaInfo {
    /// Rows before NA removal.
    pub n_original: usize,

    /// Rows after NA removal.
    pub n_clean: usize,

    /// `true` for rows that had a missing value.
    pub na_mask: Vec<bool>,

    /// Original indices of the rows that were kept.
    pub kept_indices: Vec<usize>,

    /// Rows removed.
    pub n_removed: usize,

    /// The action that was applied.
    pub action: NaAction,
}

impl NaInfo {
    /// Whether any rows were removed.
    pub fn has_removed(&self) -> bool {
        self.n_removed > 0
    }

    /// Info for data that kept every row.
    pub fn no_na(n_observations: usize, action: NaAction) -> Self {
        Self {
            n_original: n_observations,
            n_clean: n_observations,
            na_mask: vec![false; n_observations],
            kept_indices: (0..n_observations).collect(),
            n_removed: 0,
            action,
        }
    }
}

/// Result of NA preprocessing.
#[derive(Debug, Clone)]
pub struct NaResult {
    /// The frame after the action was applied.
    pub frame: Frame,

    /// Information about the rows removed.
    pub na_info: NaInfo,
}

/// Handler for missing value processing.
pub struct NaHandler;

impl NaHandler {
    /// Apply `action` to `frame`.
    ///
    /// # Errors
    ///
    /// - `NaError::NaValuesPresent` if `action` is `Fail` and values are missing
    /// - `NaError::AllNa` if `action` is `Omit` and every row is incomplete
    pub fn process(frame: &Frame, action: NaAction) -> Result<NaResult, NaError> {
        let n_rows = frame.nrows();
        let na_mask = Self::find_na_rows(frame);
        let n_na = na_mask.iter().filter(|&&v| v).count();

        match action {
            NaAction::Fail if n_na > 0 => Err(NaError::NaValuesPresent { n_na }),
            NaAction::Fail | NaAction::Pass => Ok(NaResult {
                frame: frame.clone(),
                na_info: NaInfo::no_na(n_rows, action),
            }),
            NaAction::Omit => {
                if n_rows > 0 && n_na == n_rows {
                    return Err(NaError::AllNa);
                }
                if n_na == 0 {
                    return Ok(NaResult {
                        frame: frame.clone(),
                        na_info: NaInfo::no_na(n_rows, action),
                    });
                }

                let kept_indices: Vec<usize> = na_mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &had_na)| if !had_na { Some(i) } else { None })
                    .collect();

                Ok(NaResult {
                    frame: frame.take_rows(&kept_indices),
                    na_info: NaInfo {
                        n_original: n_rows,
                        n_clean: kept_indices.len(),
                        na_mask,
                        kept_indices,
                        n_removed: n_na,
                        action,
                    },
                })
            }
        }
    }

    /// Mark rows with a missing value in any column.
    fn find_na_rows(frame: &Frame) -> Vec<bool> {
        (0..frame.nrows())
            .map(|i| frame.row_has_missing(i))
            .collect()
    }
}
