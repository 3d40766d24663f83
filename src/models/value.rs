//! Loosely-typed field values read from the warehouse
//!
//! Staging tables hand back rows whose columns may be null, numeric or text
//! depending on what the bulk copy managed to parse. Each value is tagged
//! explicitly so the formatter and loaders never rely on implicit coercion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Marker the staging layer uses for "not a number" (compared case-insensitively)
pub const NAN_MARKER: &str = "nan";

/// A single field value from a staging or dimension row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// SQL NULL
    #[default]
    Null,
    /// Any integer column type
    Integer(i64),
    /// Floating point column types
    Float(f64),
    /// Fixed-point decimal, kept in its textual form to avoid rounding
    Decimal(String),
    /// Text, char and anything else the backend could only render as a string
    Text(String),
}

impl FieldValue {
    /// True for NULL and for the case-insensitive "nan" marker in any representation
    pub fn is_null_like(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Float(f) => f.is_nan(),
            FieldValue::Decimal(s) | FieldValue::Text(s) => {
                s.trim().eq_ignore_ascii_case(NAN_MARKER)
            }
            FieldValue::Integer(_) => false,
        }
    }

    /// Integer view of the value.
    ///
    /// Floats and decimals convert only when they carry no fractional part;
    /// text converts when it parses as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            FieldValue::Decimal(s) | FieldValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    /// Floating point view of numeric values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text payload, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Treat blank text the same as NULL. Used for identity columns where the
    /// source emits an empty string for anonymous sessions.
    pub fn blank_as_null(self) -> Self {
        match self {
            FieldValue::Text(s) if s.trim().is_empty() => FieldValue::Null,
            other => other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Decimal(s) | FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A row as a mapping of column name to value
pub type RawRow = BTreeMap<String, FieldValue>;

/// Fetch a column from a row, treating a missing column as NULL
pub fn field(row: &RawRow, name: &str) -> FieldValue {
    row.get(name).cloned().unwrap_or(FieldValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_like_values() {
        assert!(FieldValue::Null.is_null_like());
        assert!(FieldValue::Float(f64::NAN).is_null_like());
        assert!(FieldValue::Text("NaN".to_string()).is_null_like());
        assert!(FieldValue::Text("nan".to_string()).is_null_like());
        assert!(FieldValue::Decimal("NAN".to_string()).is_null_like());
        assert!(!FieldValue::Text("banana".to_string()).is_null_like());
        assert!(!FieldValue::Integer(0).is_null_like());
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(FieldValue::Integer(42).as_i64(), Some(42));
        assert_eq!(FieldValue::Float(97.0).as_i64(), Some(97));
        assert_eq!(FieldValue::Float(97.5).as_i64(), None);
        assert_eq!(FieldValue::Text("1541990217796".to_string()).as_i64(), Some(1541990217796));
        assert_eq!(FieldValue::Decimal("26.00000".to_string()).as_i64(), Some(26));
        assert_eq!(FieldValue::Text("abc".to_string()).as_i64(), None);
        assert_eq!(FieldValue::Null.as_i64(), None);
    }

    #[test]
    fn test_blank_as_null() {
        assert_eq!(FieldValue::from("  ").blank_as_null(), FieldValue::Null);
        assert_eq!(FieldValue::from("26").blank_as_null(), FieldValue::from("26"));
        assert_eq!(FieldValue::Integer(26).blank_as_null(), FieldValue::Integer(26));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some("x")), FieldValue::Text("x".to_string()));
    }

    #[test]
    fn test_missing_field_is_null() {
        let mut row = RawRow::new();
        row.insert("title".to_string(), FieldValue::from("Fair Chance"));
        assert_eq!(field(&row, "title"), FieldValue::from("Fair Chance"));
        assert_eq!(field(&row, "year"), FieldValue::Null);
    }
}
