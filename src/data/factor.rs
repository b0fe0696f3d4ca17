//! Categorical grouping factors.

use super::frame::{format_number, Column};
use super::DataError;

/// A categorical variable: a sorted set of level labels and one level code
/// per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    name: String,
    levels: Vec<String>,
    codes: Vec<usize>,
}

impl Factor {
    /// Derive a factor from a column.
    ///
    /// Numeric identifiers are ordered numerically and labelled by their
    /// printed value, text identifiers are ordered lexically. Missing numeric
    /// values are rejected, so missing rows must be dropped first.
    pub fn from_column(name: &str, column: &Column) -> Result<Self, DataError> {
        match column {
            Column::Numeric(values) => {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(DataError::MissingGroup(name.to_string()));
                }
                let mut distinct = values.clone();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup();
                let codes = values
                    .iter()
                    .map(|v| {
                        distinct
                            .binary_search_by(|probe| probe.total_cmp(v))
                            .unwrap_or_default()
                    })
                    .collect();
                Ok(Self {
                    name: name.to_string(),
                    levels: distinct.into_iter().map(format_number).collect(),
                    codes,
                })
            }
            Column::Text(values) => {
                let mut distinct = values.clone();
                distinct.sort();
                distinct.dedup();
                let codes = values
                    .iter()
                    .map(|v| distinct.binary_search(v).unwrap_or_default())
                    .collect();
                Ok(Self {
                    name: name.to_string(),
                    levels: distinct,
                    codes,
                })
            }
        }
    }

    /// Build a factor from explicit levels and codes.
    pub fn from_codes(
        name: impl Into<String>,
        levels: Vec<String>,
        codes: Vec<usize>,
    ) -> Result<Self, DataError> {
        let name = name.into();
        if let Some(&bad) = codes.iter().find(|&&c| c >= levels.len()) {
            return Err(DataError::Malformed(format!(
                "factor `{name}` has code {bad} but only {} levels",
                levels.len()
            )));
        }
        Ok(Self {
            name,
            levels,
            codes,
        })
    }

    /// Name of the source column.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn level(&self, code: usize) -> &str {
        &self.levels[code]
    }

    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Number of rows in each level.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.levels.len()];
        for &c in &self.codes {
            counts[c] += 1;
        }
        counts
    }

    /// Row indices belonging to `code`.
    pub fn rows_of(&self, code: usize) -> Vec<usize> {
        self.codes
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == code)
            .map(|(i, _)| i)
            .collect()
    }

    /// Keep the given rows and drop levels that no longer occur.
    pub fn take_rows(&self, rows: &[usize]) -> Factor {
        let mut used = vec![false; self.levels.len()];
        for &i in rows {
            used[self.codes[i]] = true;
        }
        let mut remap = vec![usize::MAX; self.levels.len()];
        let mut levels = Vec::new();
        for (code, level) in self.levels.iter().enumerate() {
            if used[code] {
                remap[code] = levels.len();
                levels.push(level.clone());
            }
        }
        Factor {
            name: self.name.clone(),
            levels,
            codes: rows.iter().map(|&i| remap[self.codes[i]]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_levels_sorted_numerically() {
        let column = Column::Numeric(vec![10.0, 2.0, 10.0, 33.0]);
        let factor = Factor::from_column("state", &column).expect("factor");
        assert_eq!(factor.levels(), &["2", "10", "33"]);
        assert_eq!(factor.codes(), &[1, 0, 1, 2]);
        assert_eq!(factor.counts(), vec![1, 2, 1]);
        assert_eq!(factor.rows_of(1), vec![0, 2]);
    }

    #[test]
    fn test_text_levels() {
        let column = Column::Text(vec!["NC".into(), "KY".into(), "NC".into()]);
        let factor = Factor::from_column("state", &column).expect("factor");
        assert_eq!(factor.levels(), &["KY", "NC"]);
        assert_eq!(factor.level(factor.codes()[0]), "NC");
    }

    #[test]
    fn test_missing_group_rejected() {
        let column = Column::Numeric(vec![1.0, f64::NAN]);
        assert!(matches!(
            Factor::from_column("state", &column),
            Err(DataError::MissingGroup(_))
        ));
    }

    #[test]
    fn test_take_rows_drops_unused_levels() {
        let column = Column::Numeric(vec![1.0, 2.0, 3.0, 2.0]);
        let factor = Factor::from_column("g", &column).expect("factor");
        let kept = factor.take_rows(&[0, 2]);
        assert_eq!(kept.levels(), &["1", "3"]);
        assert_eq!(kept.codes(), &[0, 1]);
    }

    #[test]
    fn test_from_codes_validates() {
        assert!(Factor::from_codes("g", vec!["a".into()], vec![0, 1]).is_err());
    }
}
