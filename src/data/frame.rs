//! Column-oriented data frame.

use super::DataError;
use std::fmt;

/// A single named column.
///
/// Numeric columns encode missing values as NaN. Text columns have no missing
/// value, an empty string is a value like any other.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the column holds numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    /// Whether row `i` is missing.
    pub fn is_missing(&self, i: usize) -> bool {
        match self {
            Column::Numeric(v) => !v[i].is_finite(),
            Column::Text(_) => false,
        }
    }

    /// Number of missing entries.
    pub fn n_missing(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    /// Copy the given rows, in order.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Render row `i` for display.
    pub fn display_value(&self, i: usize) -> String {
        match self {
            Column::Numeric(v) => format_number(v[i]),
            Column::Text(v) => v[i].clone(),
        }
    }
}

/// Format a number the way the preview and summary tables print it.
pub(crate) fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "NA".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{:.0}", value);
    }
    let s = format!("{:.3}", value);
    let s = s.trim_end_matches('0');
    s.trim_end_matches('.').to_string()
}

/// An ordered collection of equally long named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
    label: Option<String>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from `(name, column)` pairs.
    pub fn from_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Column)>,
    ) -> Result<Self, DataError> {
        let mut frame = Self::new();
        for (name, column) in columns {
            frame.push_column(name, column)?;
        }
        Ok(frame)
    }

    /// Append a column. Its length must match the existing columns and its
    /// name must be new.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<(), DataError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(DataError::DuplicateColumn(name));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(DataError::LengthMismatch {
                    name,
                    len: column.len(),
                    expected: first.len(),
                });
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Attach the dataset label carried by the source file.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = if label.is_empty() { None } else { Some(label) };
        self
    }

    /// Dataset label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate over `(name, column)` pairs.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    /// Look up a column that must exist.
    pub fn require(&self, name: &str) -> Result<&Column, DataError> {
        self.column(name)
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))
    }

    /// Look up a numeric column.
    pub fn numeric(&self, name: &str) -> Result<&[f64], DataError> {
        match self.require(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Text(_) => Err(DataError::NonNumeric(name.to_string())),
        }
    }

    /// Whether any column is missing at row `i`.
    pub fn row_has_missing(&self, i: usize) -> bool {
        self.columns.iter().any(|c| c.is_missing(i))
    }

    /// Total number of missing cells.
    pub fn n_missing(&self) -> usize {
        self.columns.iter().map(Column::n_missing).sum()
    }

    /// Copy the given rows into a new frame.
    pub fn take_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            label: self.label.clone(),
        }
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Frame {
        let rows: Vec<usize> = (0..n.min(self.nrows())).collect();
        self.take_rows(&rows)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.nrows();
        let row_labels: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
        let row_width = row_labels.iter().map(String::len).max().unwrap_or(0);

        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| (0..n).map(|i| c.display_value(i)).collect())
            .collect();
        let widths: Vec<usize> = self
            .names
            .iter()
            .zip(cells.iter())
            .map(|(name, col)| {
                col.iter()
                    .map(String::len)
                    .chain(std::iter::once(name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:>w$}", "", w = row_width)?;
        for (name, w) in self.names.iter().zip(widths.iter()) {
            write!(f, " {:>w$}", name, w = *w)?;
        }
        writeln!(f)?;

        for i in 0..n {
            write!(f, "{:>w$}", row_labels[i], w = row_width)?;
            for (col, w) in cells.iter().zip(widths.iter()) {
                write!(f, " {:>w$}", col[i], w = *w)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_columns([
            ("id", Column::Numeric(vec![1.0, 2.0, 3.0])),
            ("name", Column::Text(vec!["a".into(), "b".into(), "c".into()])),
            ("x", Column::Numeric(vec![0.5, f64::NAN, 2.25])),
        ])
        .expect("valid frame")
    }

    #[test]
    fn test_shape_and_lookup() {
        let frame = sample();
        assert_eq!(frame.nrows(), 3);
        assert_eq!(frame.ncols(), 3);
        assert_eq!(frame.numeric("x").expect("numeric")[2], 2.25);
        assert!(matches!(
            frame.numeric("name"),
            Err(DataError::NonNumeric(_))
        ));
        assert!(matches!(
            frame.numeric("nope"),
            Err(DataError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_missing_detection() {
        let frame = sample();
        assert!(!frame.row_has_missing(0));
        assert!(frame.row_has_missing(1));
        assert_eq!(frame.n_missing(), 1);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut frame = sample();
        let err = frame
            .push_column("short", Column::Numeric(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { .. }));
        let err = frame
            .push_column("id", Column::Numeric(vec![1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(err, DataError::DuplicateColumn(_)));
    }

    #[test]
    fn test_take_rows_and_head() {
        let frame = sample();
        let picked = frame.take_rows(&[2, 0]);
        assert_eq!(picked.numeric("id").expect("numeric"), &[3.0, 1.0]);
        assert_eq!(frame.head(2).nrows(), 2);
        assert_eq!(frame.head(10).nrows(), 3);
    }

    #[test]
    fn test_display_preview() {
        let rendered = sample().head(2).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("name"));
        assert!(lines[1].contains("0.5"));
        assert!(lines[2].contains("NA"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.23456), "1.235");
        assert_eq!(format_number(f64::NAN), "NA");
    }
}
