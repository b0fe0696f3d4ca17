//! Common test utilities: a synthetic tobacco-vote dataset and a `.dta`
//! writer.

#![allow(dead_code)]

use hlm_rs::data::{Column, Dataset, Frame, LoadOptions};
use std::io::Write;
use std::path::Path;

/// Deterministic uniform draws in [-1, 1).
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f64) / (1u64 << 31) as f64 - 1.0
    }

    /// Approximately standard normal (sum of twelve uniforms).
    pub fn normal(&mut self) -> f64 {
        (0..12).map(|_| 0.5 * (self.next() + 1.0)).sum::<f64>() - 6.0
    }
}

/// A tobacco-like frame: `n_states` states with 4 to 9 legislators each.
///
/// votepct = 25 + 40·party + 0.4·money + 0.01·acres + u_state + ε,
/// clipped to [0, 100]. With `missing`, every 11th legislator has no money
/// value and the 17th has no party.
pub fn tobacco_frame(n_states: usize, seed: u64, missing: bool) -> Frame {
    let mut rng = Lcg::new(seed);
    let mut state = Vec::new();
    let mut lastname = Vec::new();
    let mut votepct = Vec::new();
    let mut party = Vec::new();
    let mut money = Vec::new();
    let mut acres = Vec::new();

    let mut row = 0usize;
    for s in 0..n_states {
        let members = 4 + (s * 7 + 3) % 6;
        let state_acres = (250.0 + 200.0 * rng.next()).round();
        let effect = 8.0 * rng.normal();
        for k in 0..members {
            let p = if (s + k) % 3 == 0 || rng.next() > 0.3 { 1.0 } else { 0.0 };
            let m = (12.0 + 10.0 * rng.next() + 6.0 * p).max(0.0);
            let v = 25.0 + 40.0 * p + 0.4 * m + 0.01 * state_acres + effect + 6.0 * rng.normal();

            row += 1;
            state.push((s * 3 + 1) as f64);
            lastname.push(format!("Member{row:03}"));
            votepct.push(v.clamp(0.0, 100.0));
            party.push(if missing && row % 17 == 0 { f64::NAN } else { p });
            money.push(if missing && row % 11 == 0 { f64::NAN } else { m });
            acres.push(state_acres);
        }
    }

    Frame::from_columns([
        ("state", Column::Numeric(state)),
        ("lastname", Column::Text(lastname)),
        ("votepct", Column::Numeric(votepct)),
        ("party", Column::Numeric(party)),
        ("money", Column::Numeric(money)),
        ("acres", Column::Numeric(acres)),
    ])
    .expect("generated columns have equal length")
}

/// The synthetic frame cleaned and grouped by state.
pub fn tobacco_dataset(n_states: usize, seed: u64) -> Dataset {
    Dataset::from_frame(&tobacco_frame(n_states, seed, false), &LoadOptions::default())
        .expect("synthetic data is valid")
}

/// Balanced one-way layout grouped by `g`: group means 10, 15, 6, 11 with
/// within-group deviations −1, +1, 0.
pub fn one_way_dataset() -> Dataset {
    let y = vec![9.0, 11.0, 10.0, 14.0, 16.0, 15.0, 5.0, 7.0, 6.0, 10.0, 12.0, 11.0];
    let g = (0..12).map(|i| (i / 3 + 1) as f64).collect();
    let frame = Frame::from_columns([("g", Column::Numeric(g)), ("y", Column::Numeric(y))])
        .expect("frame");
    let options = LoadOptions {
        group_column: "g".to_string(),
        ..Default::default()
    };
    Dataset::from_frame(&frame, &options).expect("dataset")
}

/// Write `frame` as a little-endian release 114 `.dta` file. Numeric columns
/// are stored as doubles (NaN as `.`), text columns as `str#` sized to the
/// longest value.
pub fn write_dta_114(path: &Path, frame: &Frame) -> std::io::Result<()> {
    write_dta_fixed(path, frame, 114, false)
}

/// Write `frame` as a fixed-layout file of release 113, 114 or 115.
pub fn write_dta_fixed(
    path: &Path,
    frame: &Frame,
    release: u8,
    big_endian: bool,
) -> std::io::Result<()> {
    fn ordered<const N: usize>(mut bytes: [u8; N], big_endian: bool) -> [u8; N] {
        if big_endian {
            bytes.reverse();
        }
        bytes
    }

    let nvar = frame.ncols();
    let nobs = frame.nrows();
    let columns: Vec<(&str, &Column)> = frame.columns().collect();
    let widths: Vec<u8> = columns
        .iter()
        .map(|(_, c)| match c {
            Column::Numeric(_) => 255,
            Column::Text(v) => v.iter().map(String::len).max().unwrap_or(1).clamp(1, 244) as u8,
        })
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&[release, if big_endian { 1 } else { 2 }, 1, 0]);
    out.extend_from_slice(&ordered((nvar as u16).to_le_bytes(), big_endian));
    out.extend_from_slice(&ordered((nobs as u32).to_le_bytes(), big_endian));
    out.extend_from_slice(&padded("synthetic tobacco data", 81));
    out.extend_from_slice(&padded("16 Oct 2026 12:00", 18));

    out.extend_from_slice(&widths);
    for (name, _) in &columns {
        out.extend_from_slice(&padded(name, 33));
    }
    out.extend_from_slice(&vec![0u8; 2 * (nvar + 1)]);
    let format_width = if release == 113 { 12 } else { 49 };
    for (_, column) in &columns {
        let format = if column.is_numeric() { "%9.0g" } else { "%-9s" };
        out.extend_from_slice(&padded(format, format_width));
    }
    out.extend_from_slice(&vec![0u8; 33 * nvar]);
    out.extend_from_slice(&vec![0u8; 81 * nvar]);
    out.extend_from_slice(&[0, 0, 0, 0, 0]);

    for i in 0..nobs {
        for ((_, column), &width) in columns.iter().zip(&widths) {
            match column {
                Column::Numeric(v) => {
                    // `.` is the smallest missing double, 2^1023
                    let x = if v[i].is_nan() { f64::from_bits(0x7fe0_0000_0000_0000) } else { v[i] };
                    out.extend_from_slice(&ordered(x.to_le_bytes(), big_endian));
                }
                Column::Text(v) => out.extend_from_slice(&padded(&v[i], width as usize)),
            }
        }
    }

    std::fs::File::create(path)?.write_all(&out)
}

fn padded(text: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    let n = text.len().min(width);
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
    field
}

/// Approximate equality check for floating point values.
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}
