//! Cursor type
//!
//! A cursor marks how far synchronization has progressed. Sources hand out
//! cursors as record positions; the checkpoint store persists the last one
//! that was durably written.

use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Totally ordered progress marker
///
/// Numbers order before text. Integers and decimals compare by numeric
/// value, matching how a database sorts a numeric cursor column. Text uses
/// the natural string order, so ISO 8601 timestamps and zero-padded tokens
/// compare chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    /// Sequence numbers, offsets, epoch timestamps
    Integer(i64),
    /// Fractional or out-of-range numbers (DOUBLE, DECIMAL, UBIGINT, HUGEINT)
    Decimal(Decimal),
    /// Timestamps, pagination tokens, anything else
    Text(String),
}

impl Cursor {
    /// Build a cursor from a JSON value
    ///
    /// Returns `None` for null, booleans, arrays and objects.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Self::from_decimal_str(&u.to_string())
                } else {
                    n.as_f64().and_then(Self::from_f64)
                }
            }
            JsonValue::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Build a numeric cursor from decimal text such as `-12.50`
    ///
    /// Integral values that fit in an `i64` become [`Cursor::Integer`].
    /// Exponent notation is not accepted.
    pub fn from_decimal_str(text: &str) -> Option<Self> {
        let canonical = canonical_decimal(text)?;
        if !canonical.contains('.') {
            if let Ok(i) = canonical.parse::<i64>() {
                return Some(Self::Integer(i));
            }
        }
        Some(Self::Decimal(Decimal(canonical)))
    }

    /// Build a numeric cursor from a float; NaN and infinities are refused
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // Display never uses exponent notation and round-trips exactly
        Self::from_decimal_str(&value.to_string())
    }

    /// JSON representation of this cursor
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Integer(i) => JsonValue::from(*i),
            Self::Decimal(d) => serde_json::json!({ "decimal": d.as_str() }),
            Self::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(a), Self::Decimal(b)) => compare_decimal(&a.to_string(), b.as_str()),
            (Self::Decimal(a), Self::Integer(b)) => compare_decimal(a.as_str(), &b.to_string()),
            (Self::Decimal(a), Self::Decimal(b)) => compare_decimal(a.as_str(), b.as_str()),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => f.write_str(d.as_str()),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ============================================================================
// Decimal
// ============================================================================

/// Exact decimal number in canonical form
///
/// No leading zeros in the integer part, no trailing zeros in the fraction,
/// never an integral value that fits in an `i64`. Stored as
/// `{"decimal": "10.5"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DecimalRepr", into = "DecimalRepr")]
pub struct Decimal(String);

impl Decimal {
    /// Canonical decimal text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize, Deserialize)]
struct DecimalRepr {
    decimal: String,
}

impl From<Decimal> for DecimalRepr {
    fn from(value: Decimal) -> Self {
        Self { decimal: value.0 }
    }
}

impl TryFrom<DecimalRepr> for Decimal {
    type Error = String;

    fn try_from(repr: DecimalRepr) -> Result<Self, Self::Error> {
        match Cursor::from_decimal_str(&repr.decimal) {
            Some(Cursor::Decimal(d)) => Ok(d),
            Some(_) => Err(format!("'{}' is an integer cursor", repr.decimal)),
            None => Err(format!("'{}' is not a decimal number", repr.decimal)),
        }
    }
}

fn canonical_decimal(text: &str) -> Option<String> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let int = match int.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let frac = frac.trim_end_matches('0');

    let mut out = String::with_capacity(int.len() + frac.len() + 2);
    if negative && (int != "0" || !frac.is_empty()) {
        out.push('-');
    }
    out.push_str(int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

/// Numeric order of two canonical decimal strings
fn compare_decimal(a: &str, b: &str) -> Ordering {
    fn split(s: &str) -> (bool, &str, &str) {
        let (negative, magnitude) = s.strip_prefix('-').map_or((false, s), |m| (true, m));
        let (int, frac) = magnitude.split_once('.').unwrap_or((magnitude, ""));
        (negative, int, frac)
    }

    let (a_neg, a_int, a_frac) = split(a);
    let (b_neg, b_int, b_frac) = split(b);
    match (a_neg, b_neg) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (negative, _) => {
            let magnitude = a_int
                .len()
                .cmp(&b_int.len())
                .then_with(|| a_int.cmp(b_int))
                .then_with(|| a_frac.cmp(b_frac));
            if negative {
                magnitude.reverse()
            } else {
                magnitude
            }
        }
    }
}
