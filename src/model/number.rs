//! Parsing of the loosely formatted numeric cells found in the sheets, e.g. `1,250` or ` 40 `.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// Parses a cell as a number. Whitespace and thousands-separator commas are removed first, then
/// the leading number is read and anything after it is ignored, so `12,500/-` is `12500`. Returns
/// `None` for empty cells or cells that do not start with a number.
pub fn parse_number(cell: &str) -> Option<f64> {
    let without_commas = cell.trim().replace(',', "");
    let prefix = numeric_prefix(&without_commas);
    if prefix.is_empty() {
        return None;
    }
    prefix.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// The longest prefix of `s` shaped like `[+-]digits[.digits]`. Empty when there are no digits.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        ""
    } else {
        &s[..end]
    }
}

/// Parses a cell as a number where anything that is not a number counts as zero.
pub fn number_or_zero(cell: &str) -> f64 {
    parse_number(cell).unwrap_or_default()
}

/// Rounds to two decimal places. Non-finite values come back unchanged.
pub fn round2(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Divides, returning zero instead of `NaN` or infinity when `denominator` is zero.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// A number as it is written into a response. Whole values are written without a fraction, so a
/// count of boxes comes out as `1050` rather than `1050.0`.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Metric(pub f64);

// Integers beyond this are not exact in an f64 anyway.
const MAX_WHOLE: f64 = 9_007_199_254_740_992.0;

impl Serialize for Metric {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self.0;
        if value.fract() == 0.0 && value.abs() <= MAX_WHOLE {
            serializer.serialize_i64(value as i64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

impl From<f64> for Metric {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// For `#[serde(serialize_with)]` on plain `f64` fields.
pub fn serialize_metric<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Metric(*value).serialize(serializer)
}
