use std::{cmp::Ordering, fmt};

use crate::processor::ProcessorError;

/// Significant digits used when printing doubles.
const DOUBLE_PRECISION: usize = 8;

/// Aggregated numeric value: exact while it fits in an `i64`, a double after.
///
/// A value only ever moves from `Int` to `Float`, never back.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Numeric {
    #[default]
    Uninit,
    Int(i64),
    Float(f64),
}

/// `atoi_simd` covers the common case; it rejects a leading `+` and integers
/// padded past 20 characters, which `str::parse` accepts.
fn parse_int(field: &[u8]) -> Option<i64> {
    atoi_simd::parse::<i64>(field).ok().or_else(|| {
        std::str::from_utf8(field)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
    })
}

impl Numeric {
    /// Parses a field as an integer if it is lexically integral, else as a double.
    pub fn make(field: &[u8]) -> Result<Numeric, ProcessorError> {
        if let Some(v) = parse_int(field) {
            return Ok(Numeric::Int(v));
        }
        fast_float::parse::<f64, _>(field)
            .map(Numeric::Float)
            .map_err(|_| ProcessorError::value("number", field))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Numeric::Uninit => 0.0,
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Numeric::Float(_))
    }

    /// Adds `other`, promoting to a double exactly when the integer sum would overflow.
    pub fn add(&mut self, other: Numeric) {
        if let Numeric::Uninit = self {
            *self = Numeric::Int(0);
        }
        if let (Numeric::Int(a), Numeric::Int(b)) = (*self, other) {
            if let Some(sum) = a.checked_add(b) {
                *self = Numeric::Int(sum);
                return;
            }
        }
        *self = Numeric::Float(self.as_f64() + other.as_f64());
    }

    /// Keeps the smaller value. Returns whether `self` was replaced.
    pub fn min(&mut self, other: Numeric) -> bool {
        self.replace_if(other, Ordering::Less)
    }

    /// Keeps the larger value. Returns whether `self` was replaced.
    pub fn max(&mut self, other: Numeric) -> bool {
        self.replace_if(other, Ordering::Greater)
    }

    /// Replaces `self` with `other` when `other` compares as `wins` against it.
    /// Ties keep the current value.
    fn replace_if(&mut self, other: Numeric, wins: Ordering) -> bool {
        let replacement = match (*self, other) {
            (_, Numeric::Uninit) => None,
            (Numeric::Uninit, _) => Some(other),
            (Numeric::Int(current), Numeric::Int(candidate)) => {
                (candidate.cmp(&current) == wins).then_some(other)
            }
            // Mixed or double comparisons happen in f64; a double state stays a double.
            (current, candidate) => {
                let candidate = candidate.as_f64();
                (candidate.partial_cmp(&current.as_f64()) == Some(wins))
                    .then_some(Numeric::Float(candidate))
            }
        };
        match replacement {
            Some(value) => {
                *self = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Numeric::Uninit => Ok(()),
            Numeric::Int(v) => write!(f, "{v}"),
            Numeric::Float(v) => write_significant(f, v, DOUBLE_PRECISION),
        }
    }
}

/// Writes `v` like C's `%.{digits}g`.
fn write_significant(f: &mut fmt::Formatter<'_>, v: f64, digits: usize) -> fmt::Result {
    if !v.is_finite() {
        return write!(f, "{v}");
    }
    if v == 0.0 {
        return f.write_str(if v.is_sign_negative() { "-0" } else { "0" });
    }

    let scientific = format!("{:.*e}", digits - 1, v);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return f.write_str(&scientific);
    };
    let exponent: i32 = exponent.parse().map_err(|_| fmt::Error)?;

    if exponent < -4 || exponent >= digits as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(
            f,
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (digits as i32 - 1 - exponent) as usize;
        f.write_str(trim_fraction(&format!("{:.*}", decimals, v)))
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
