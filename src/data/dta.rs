//! Reader for Stata `.dta` files.
//!
//! Two layouts are understood:
//!
//! - the fixed binary layout of releases 113, 114 and 115 (Stata 8 to 12),
//! - the tagged layout of releases 117 and 118 (Stata 13 and later).
//!
//! Numeric storage types map to `f64` columns; Stata's system and extended
//! missing values become NaN. Fixed-width strings map to text columns. Value
//! labels and characteristics are skipped, `strL` columns are rejected.

use super::frame::{Column, Frame};
use super::DataError;
use std::path::Path;
use tracing::debug;

/// Read a `.dta` file from disk.
pub fn read_dta(path: impl AsRef<Path>) -> Result<Frame, DataError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "read .dta file");
    parse_dta(&bytes)
}

/// Parse the contents of a `.dta` file.
pub fn parse_dta(bytes: &[u8]) -> Result<Frame, DataError> {
    if bytes.starts_with(b"<stata_dta>") {
        parse_tagged(bytes)
    } else {
        parse_fixed(bytes)
    }
}

/// On-disk storage type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageType {
    Byte,
    Int,
    Long,
    Float,
    Double,
    Str(usize),
}

impl StorageType {
    fn width(self) -> usize {
        match self {
            StorageType::Byte => 1,
            StorageType::Int => 2,
            StorageType::Long => 4,
            StorageType::Float => 4,
            StorageType::Double => 8,
            StorageType::Str(n) => n,
        }
    }

    fn from_fixed_code(code: u8) -> Result<Self, DataError> {
        match code {
            1..=244 => Ok(StorageType::Str(code as usize)),
            251 => Ok(StorageType::Byte),
            252 => Ok(StorageType::Int),
            253 => Ok(StorageType::Long),
            254 => Ok(StorageType::Float),
            255 => Ok(StorageType::Double),
            other => Err(DataError::Malformed(format!("unknown type code {other}"))),
        }
    }

    fn from_tagged_code(code: u16) -> Result<Self, DataError> {
        match code {
            1..=2045 => Ok(StorageType::Str(code as usize)),
            32768 => Err(DataError::Unsupported("strL variables".to_string())),
            65526 => Ok(StorageType::Double),
            65527 => Ok(StorageType::Float),
            65528 => Ok(StorageType::Long),
            65529 => Ok(StorageType::Int),
            65530 => Ok(StorageType::Byte),
            other => Err(DataError::Malformed(format!("unknown type code {other}"))),
        }
    }
}

// Largest non-missing values per integer type; anything above is `.`, `.a`..`.z`.
const BYTE_MAX: i8 = 100;
const INT_MAX: i16 = 32_740;
const LONG_MAX: i32 = 2_147_483_620;

/// Byte cursor with a configurable byte order.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian: false,
        }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DataError> {
        let end = self.pos.checked_add(n).ok_or(DataError::Truncated(what))?;
        if end > self.buf.len() {
            return Err(DataError::Truncated(what));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], DataError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        if self.big_endian {
            out.reverse();
        }
        Ok(out)
    }

    fn seek(&mut self, pos: u64, what: &'static str) -> Result<(), DataError> {
        let pos = usize::try_from(pos).map_err(|_| DataError::Truncated(what))?;
        if pos > self.buf.len() {
            return Err(DataError::Truncated(what));
        }
        self.pos = pos;
        Ok(())
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, DataError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, DataError> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, DataError> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, DataError> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    fn skip(&mut self, n: usize, what: &'static str) -> Result<(), DataError> {
        self.take(n, what).map(|_| ())
    }

    /// A NUL-padded string field of `n` bytes.
    fn fixed_string(&mut self, n: usize, what: &'static str) -> Result<String, DataError> {
        Ok(decode_string(self.take(n, what)?))
    }

    fn expect_tag(&mut self, tag: &'static str) -> Result<(), DataError> {
        let found = self.take(tag.len(), tag)?;
        if found != tag.as_bytes() {
            return Err(DataError::Malformed(format!(
                "expected `{tag}` at byte {}",
                self.pos - tag.len()
            )));
        }
        Ok(())
    }

    fn value(&mut self, ty: StorageType) -> Result<CellValue, DataError> {
        let what = "data";
        Ok(match ty {
            StorageType::Byte => {
                let v = self.u8(what)? as i8;
                CellValue::Number(if v > BYTE_MAX { f64::NAN } else { v as f64 })
            }
            StorageType::Int => {
                let v = i16::from_le_bytes(self.array(what)?);
                CellValue::Number(if v > INT_MAX { f64::NAN } else { v as f64 })
            }
            StorageType::Long => {
                let v = i32::from_le_bytes(self.array(what)?);
                CellValue::Number(if v > LONG_MAX { f64::NAN } else { v as f64 })
            }
            StorageType::Float => {
                let v = f32::from_le_bytes(self.array(what)?);
                // 2^127 and above is missing
                let missing = !v.is_finite() || v >= f32::from_bits(0x7f00_0000);
                CellValue::Number(if missing { f64::NAN } else { v as f64 })
            }
            StorageType::Double => {
                let v = f64::from_le_bytes(self.array(what)?);
                // 2^1023 and above is missing
                let missing = !v.is_finite() || v >= f64::from_bits(0x7fe0_0000_0000_0000);
                CellValue::Number(if missing { f64::NAN } else { v })
            }
            StorageType::Str(n) => CellValue::Text(self.fixed_string(n, what)?),
        })
    }
}

enum CellValue {
    Number(f64),
    Text(String),
}

fn decode_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn parse_fixed(bytes: &[u8]) -> Result<Frame, DataError> {
    let mut r = Reader::new(bytes);
    let release = r.u8("header")?;
    if !matches!(release, 113..=115) {
        return Err(DataError::UnsupportedVersion(release as u16));
    }
    r.big_endian = match r.u8("header")? {
        1 => true,
        2 => false,
        other => return Err(DataError::Malformed(format!("byte order flag {other}"))),
    };
    r.skip(2, "header")?;
    let nvar = r.u16("header")? as usize;
    let nobs = r.u32("header")? as usize;
    let label = r.fixed_string(81, "header")?;
    r.skip(18, "header")?;

    let types = (0..nvar)
        .map(|_| r.u8("type list").and_then(StorageType::from_fixed_code))
        .collect::<Result<Vec<_>, _>>()?;
    let names = (0..nvar)
        .map(|_| r.fixed_string(33, "variable names"))
        .collect::<Result<Vec<_>, _>>()?;

    let format_width = if release == 113 { 12 } else { 49 };
    r.skip(2 * (nvar + 1), "sort list")?;
    r.skip(nvar * format_width, "format list")?;
    r.skip(nvar * 33, "value label list")?;
    r.skip(nvar * 81, "variable labels")?;

    loop {
        let kind = r.u8("expansion fields")?;
        let len = r.u32("expansion fields")? as usize;
        if kind == 0 && len == 0 {
            break;
        }
        r.skip(len, "expansion fields")?;
    }

    debug!(release, nvar, nobs, "parsing fixed-layout .dta");
    read_records(&mut r, &names, &types, nobs).map(|f| f.with_label(label))
}

fn parse_tagged(bytes: &[u8]) -> Result<Frame, DataError> {
    let mut r = Reader::new(bytes);
    r.expect_tag("<stata_dta><header><release>")?;
    let release_text = decode_string(r.take(3, "release")?);
    let release: u16 = release_text
        .parse()
        .map_err(|_| DataError::Malformed(format!("release `{release_text}`")))?;
    if !matches!(release, 117 | 118) {
        return Err(DataError::UnsupportedVersion(release));
    }
    r.expect_tag("</release><byteorder>")?;
    r.big_endian = match r.take(3, "byte order")? {
        b"MSF" => true,
        b"LSF" => false,
        other => {
            return Err(DataError::Malformed(format!(
                "byte order `{}`",
                decode_string(other)
            )))
        }
    };
    r.expect_tag("</byteorder><K>")?;
    let nvar = r.u16("variable count")? as usize;
    r.expect_tag("</K><N>")?;
    let nobs = if release == 117 {
        r.u32("observation count")? as usize
    } else {
        usize::try_from(r.u64("observation count")?)
            .map_err(|_| DataError::Malformed("observation count overflows".to_string()))?
    };
    r.expect_tag("</N><label>")?;
    let label_len = if release == 117 {
        r.u8("label")? as usize
    } else {
        r.u16("label")? as usize
    };
    let label = r.fixed_string(label_len, "label")?;
    r.expect_tag("</label><timestamp>")?;
    let stamp_len = r.u8("timestamp")? as usize;
    r.skip(stamp_len, "timestamp")?;
    r.expect_tag("</timestamp></header><map>")?;
    let map = (0..14)
        .map(|_| r.u64("map"))
        .collect::<Result<Vec<_>, _>>()?;

    r.seek(map[2], "variable types")?;
    r.expect_tag("<variable_types>")?;
    let types = (0..nvar)
        .map(|_| r.u16("variable types").and_then(StorageType::from_tagged_code))
        .collect::<Result<Vec<_>, _>>()?;

    r.seek(map[3], "variable names")?;
    r.expect_tag("<varnames>")?;
    let name_width = if release == 117 { 33 } else { 129 };
    let names = (0..nvar)
        .map(|_| r.fixed_string(name_width, "variable names"))
        .collect::<Result<Vec<_>, _>>()?;

    r.seek(map[9], "data")?;
    r.expect_tag("<data>")?;

    debug!(release, nvar, nobs, "parsing tagged .dta");
    read_records(&mut r, &names, &types, nobs).map(|f| f.with_label(label))
}

fn read_records(
    r: &mut Reader<'_>,
    names: &[String],
    types: &[StorageType],
    nobs: usize,
) -> Result<Frame, DataError> {
    let record_width: usize = types.iter().map(|t| t.width()).sum();
    if record_width.saturating_mul(nobs) > r.buf.len().saturating_sub(r.pos) {
        return Err(DataError::Truncated("data"));
    }

    let mut columns: Vec<Column> = types
        .iter()
        .map(|t| match t {
            StorageType::Str(_) => Column::Text(Vec::with_capacity(nobs)),
            _ => Column::Numeric(Vec::with_capacity(nobs)),
        })
        .collect();

    for _ in 0..nobs {
        for (column, &ty) in columns.iter_mut().zip(types) {
            match (column, r.value(ty)?) {
                (Column::Numeric(v), CellValue::Number(x)) => v.push(x),
                (Column::Text(v), CellValue::Text(s)) => v.push(s),
                _ => unreachable!("column kind follows storage type"),
            }
        }
    }

    Frame::from_columns(names.iter().cloned().zip(columns))
}
