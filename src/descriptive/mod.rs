//! Per-variable summary statistics in the layout of `psych::describe`.
//!
//! Missing values are skipped. Text columns are summarised through their
//! factor codes (1-based, lexical level order) and flagged with `*`.

use crate::data::{Column, DataError, Factor, Frame};
use std::fmt;

/// Summary of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSummary {
    pub name: String,
    /// Summarised through factor codes.
    pub is_text: bool,
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation (divisor `n − 1`).
    pub sd: f64,
    pub median: f64,
    /// Mean after dropping 10% of the sorted values at each end.
    pub trimmed: f64,
    /// Median absolute deviation, scaled by 1.4826.
    pub mad: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub skew: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,
    /// Standard error of the mean.
    pub se: f64,
}

impl VariableSummary {
    /// Summarise `values`, ignoring NaN.
    pub fn from_values(name: impl Into<String>, values: &[f64], is_text: bool) -> Self {
        let mut x: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        x.sort_by(f64::total_cmp);
        let n = x.len();
        let nf = n as f64;

        let mean = if n > 0 { x.iter().sum::<f64>() / nf } else { f64::NAN };
        let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
        let sd = if n > 1 { (ss / (nf - 1.0)).sqrt() } else { f64::NAN };
        let median = sorted_median(&x);
        let deviations = {
            let mut d: Vec<f64> = x.iter().map(|v| (v - median).abs()).collect();
            d.sort_by(f64::total_cmp);
            d
        };
        let m3 = x.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
        let m4 = x.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / nf;
        let (min, max) = match (x.first(), x.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => (f64::NAN, f64::NAN),
        };

        Self {
            name: name.into(),
            is_text,
            n,
            mean,
            sd,
            median,
            trimmed: trimmed_mean(&x, 0.1),
            mad: 1.4826 * sorted_median(&deviations),
            min,
            max,
            range: max - min,
            skew: m3 / sd.powi(3),
            kurtosis: m4 / sd.powi(4) - 3.0,
            se: sd / nf.sqrt(),
        }
    }
}

fn sorted_median(x: &[f64]) -> f64 {
    let n = x.len();
    match n {
        0 => f64::NAN,
        _ if n % 2 == 1 => x[n / 2],
        _ => 0.5 * (x[n / 2 - 1] + x[n / 2]),
    }
}

/// Trimmed mean of sorted data: `floor(n · trim)` values dropped at each end.
fn trimmed_mean(x: &[f64], trim: f64) -> f64 {
    let n = x.len();
    if n == 0 {
        return f64::NAN;
    }
    let cut = (n as f64 * trim).floor() as usize;
    if 2 * cut >= n {
        return sorted_median(x);
    }
    let kept = &x[cut..n - cut];
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Summary table of every column in a frame.
#[derive(Debug, Clone)]
pub struct Description {
    pub rows: Vec<VariableSummary>,
}

impl Description {
    pub fn variable(&self, name: &str) -> Option<&VariableSummary> {
        self.rows.iter().find(|r| r.name == name)
    }
}

/// Describe every column of `frame`.
pub fn describe(frame: &Frame) -> Result<Description, DataError> {
    let rows = frame
        .columns()
        .map(|(name, column)| match column {
            Column::Numeric(values) => Ok(VariableSummary::from_values(name, values, false)),
            Column::Text(_) => {
                let factor = Factor::from_column(name, column)?;
                let codes: Vec<f64> = factor.codes().iter().map(|&c| (c + 1) as f64).collect();
                Ok(VariableSummary::from_values(name, &codes, true))
            }
        })
        .collect::<Result<Vec<_>, DataError>>()?;
    Ok(Description { rows })
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.name.len() + usize::from(r.is_text))
            .max()
            .unwrap_or(0);
        writeln!(
            f,
            "{:<w$} {:>4} {:>5} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>6} {:>8} {:>7}",
            "", "vars", "n", "mean", "sd", "median", "trimmed", "mad", "min", "max", "range",
            "skew", "kurtosis", "se",
            w = width
        )?;
        for (k, r) in self.rows.iter().enumerate() {
            let label = if r.is_text {
                format!("{}*", r.name)
            } else {
                r.name.clone()
            };
            writeln!(
                f,
                "{:<w$} {:>4} {:>5} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>6.2} {:>8.2} {:>7.2}",
                label, k + 1, r.n, r.mean, r.sd, r.median, r.trimmed, r.mad, r.min, r.max,
                r.range, r.skew, r.kurtosis, r.se,
                w = width
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_small_sample_reference_values() {
        let s = VariableSummary::from_values("x", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], false);
        assert_eq!(s.n, 8);
        assert_relative_eq!(s.mean, 5.0);
        assert_relative_eq!(s.sd, (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(s.median, 4.5);
        assert_relative_eq!(s.range, 7.0);
        // |x − 4.5| sorted: 0.5 0.5 0.5 0.5 0.5 2.5 2.5 4.5
        assert_relative_eq!(s.mad, 1.4826 * 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.se, s.sd / 8f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_trimmed_mean_drops_tails() {
        let values: Vec<f64> = (1..=10).map(f64::from).chain([100.0]).collect();
        // n = 11, one value dropped at each end
        let s = VariableSummary::from_values("x", &values, false);
        assert_relative_eq!(s.trimmed, (2..=10).map(f64::from).sum::<f64>() / 9.0, epsilon = 1e-12);
        assert!(s.skew > 0.0);
    }

    #[test]
    fn test_symmetric_sample_has_zero_skew() {
        let s = VariableSummary::from_values("x", &[1.0, 2.0, 3.0, 4.0, 5.0], false);
        assert_relative_eq!(s.skew, 0.0, epsilon = 1e-12);
        assert!(s.kurtosis < 0.0);
    }

    #[test]
    fn test_missing_values_skipped() {
        let s = VariableSummary::from_values("x", &[1.0, f64::NAN, 3.0], false);
        assert_eq!(s.n, 2);
        assert_relative_eq!(s.mean, 2.0);
    }

    #[test]
    fn test_describe_flags_text_columns() {
        let frame = Frame::from_columns([
            ("lastname", Column::Text(vec!["Cole".into(), "Abel".into(), "Bush".into()])),
            ("money", Column::Numeric(vec![1.0, 2.0, 6.0])),
        ])
        .expect("frame");
        let description = describe(&frame).expect("describe");

        let text = description.variable("lastname").expect("lastname");
        assert!(text.is_text);
        assert_relative_eq!(text.mean, 2.0);
        assert_relative_eq!(text.max, 3.0);

        let rendered = description.to_string();
        assert!(rendered.contains("lastname*"));
        assert!(rendered.contains("kurtosis"));
    }
}
