//! Dataset loading: Stata files, frames, grouping factors.
//!
//! # Example
//!
//! ```rust,ignore
//! use hlm_rs::data::{load_dataset, LoadOptions};
//!
//! let dataset = load_dataset("tobacco.dta", &LoadOptions::default())?;
//! println!("{} rows in {} states", dataset.nrows(), dataset.n_groups());
//! ```

mod dta;
mod factor;
mod frame;

pub use dta::{parse_dta, read_dta};
pub use factor::Factor;
pub use frame::{Column, Frame};

use crate::core::{NaAction, NaError, NaHandler, NaInfo};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while reading or shaping data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported .dta release {0}")]
    UnsupportedVersion(u16),

    #[error("malformed .dta file: {0}")]
    Malformed(String),

    #[error("file ends early while reading {0}")]
    Truncated(&'static str),

    #[error("unsupported .dta content: {0}")]
    Unsupported(String),

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("column `{0}` is not numeric")]
    NonNumeric(String),

    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),

    #[error("column `{name}` has {len} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        len: usize,
        expected: usize,
    },

    #[error("grouping column `{0}` has missing values")]
    MissingGroup(String),

    #[error(transparent)]
    Na(#[from] NaError),
}

/// How the loader cleans a raw frame.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Column the grouping factor is derived from.
    pub group_column: String,
    /// Missing-value policy applied before the factor is derived.
    pub na_action: NaAction,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            group_column: "state".to_string(),
            na_action: NaAction::Omit,
        }
    }
}

/// A cleaned frame with its grouping factor.
///
/// The factor is derived once here and shared by every model fitted on the
/// dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub frame: Frame,
    pub group: Factor,
    pub na_info: NaInfo,
}

impl Dataset {
    /// Apply the NA policy and derive the grouping factor.
    pub fn from_frame(raw: &Frame, options: &LoadOptions) -> Result<Self, DataError> {
        // Fail early on a bad grouping column rather than after cleaning.
        raw.require(&options.group_column)?;

        let cleaned = NaHandler::process(raw, options.na_action)?;
        let group = Factor::from_column(
            &options.group_column,
            cleaned.frame.require(&options.group_column)?,
        )?;

        info!(
            rows_raw = cleaned.na_info.n_original,
            rows_clean = cleaned.na_info.n_clean,
            removed = cleaned.na_info.n_removed,
            groups = group.n_levels(),
            "dataset prepared"
        );

        Ok(Self {
            frame: cleaned.frame,
            group,
            na_info: cleaned.na_info,
        })
    }

    pub fn nrows(&self) -> usize {
        self.frame.nrows()
    }

    pub fn n_groups(&self) -> usize {
        self.group.n_levels()
    }

    /// Keep the given rows. Levels that no longer occur are dropped.
    pub fn take_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            frame: self.frame.take_rows(rows),
            group: self.group.take_rows(rows),
            na_info: NaInfo::no_na(rows.len(), self.na_info.action),
        }
    }
}

/// Read a `.dta` file, drop incomplete rows, derive the grouping factor.
pub fn load_dataset(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Dataset, DataError> {
    let raw = read_dta(path)?;
    Dataset::from_frame(&raw, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> Frame {
        Frame::from_columns([
            ("state", Column::Numeric(vec![2.0, 1.0, 2.0, f64::NAN, 1.0])),
            ("votepct", Column::Numeric(vec![50.0, 60.0, f64::NAN, 40.0, 70.0])),
        ])
        .expect("valid frame")
    }

    #[test]
    fn test_dataset_from_frame() {
        let dataset = Dataset::from_frame(&raw(), &LoadOptions::default()).expect("dataset");
        assert_eq!(dataset.nrows(), 3);
        assert_eq!(dataset.n_groups(), 2);
        assert_eq!(dataset.group.codes(), &[1, 0, 0]);
        assert_eq!(dataset.na_info.n_removed, 2);
    }

    #[test]
    fn test_missing_group_column() {
        let options = LoadOptions {
            group_column: "district".to_string(),
            ..LoadOptions::default()
        };
        assert!(matches!(
            Dataset::from_frame(&raw(), &options),
            Err(DataError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_pass_keeps_missing_group() {
        let options = LoadOptions {
            na_action: NaAction::Pass,
            ..LoadOptions::default()
        };
        assert!(matches!(
            Dataset::from_frame(&raw(), &options),
            Err(DataError::MissingGroup(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_dataset("/definitely/not/here.dta", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }
}
