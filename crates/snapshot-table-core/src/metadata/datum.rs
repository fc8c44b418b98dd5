//! Typed single values and their binary encoding.
//!
//! Bounds stored in data file statistics and partition summaries are kept as
//! bytes. Fixed-width numeric types use little-endian encoding, strings are
//! UTF-8 and binary values are stored as-is.

use std::{cmp::Ordering, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::schema::PrimitiveType;

/// Errors decoding or parsing a [`Datum`].
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum DatumError {
    /// A fixed-width value had the wrong number of bytes.
    #[snafu(display("Invalid {ty} encoding: expected {expected} bytes, got {actual}"))]
    InvalidLength {
        /// Declared type.
        ty: PrimitiveType,
        /// Required width.
        expected: usize,
        /// Width found.
        actual: usize,
    },

    /// A string bound was not valid UTF-8.
    #[snafu(display("Invalid UTF-8 in string value"))]
    InvalidUtf8,

    /// Text could not be parsed into the requested type.
    #[snafu(display("Cannot parse {text:?} as {ty}"))]
    Unparseable {
        /// Target type.
        ty: PrimitiveType,
        /// Input text.
        text: String,
    },
}

/// A typed literal value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Datum {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Days since epoch.
    Date(i32),
    /// Microseconds since epoch.
    Timestamp(i64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

fn fixed<const N: usize>(ty: PrimitiveType, bytes: &[u8]) -> Result<[u8; N], DatumError> {
    bytes.try_into().map_err(|_| DatumError::InvalidLength {
        ty,
        expected: N,
        actual: bytes.len(),
    })
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

impl Datum {
    /// The primitive type of this value.
    pub fn data_type(&self) -> PrimitiveType {
        match self {
            Datum::Boolean(_) => PrimitiveType::Boolean,
            Datum::Int(_) => PrimitiveType::Int,
            Datum::Long(_) => PrimitiveType::Long,
            Datum::Float(_) => PrimitiveType::Float,
            Datum::Double(_) => PrimitiveType::Double,
            Datum::Date(_) => PrimitiveType::Date,
            Datum::Timestamp(_) => PrimitiveType::Timestamp,
            Datum::String(_) => PrimitiveType::String,
            Datum::Binary(_) => PrimitiveType::Binary,
        }
    }

    /// Single-value binary encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Datum::Boolean(v) => vec![u8::from(*v)],
            Datum::Int(v) | Datum::Date(v) => v.to_le_bytes().to_vec(),
            Datum::Long(v) | Datum::Timestamp(v) => v.to_le_bytes().to_vec(),
            Datum::Float(v) => v.to_le_bytes().to_vec(),
            Datum::Double(v) => v.to_le_bytes().to_vec(),
            Datum::String(v) => v.as_bytes().to_vec(),
            Datum::Binary(v) => v.clone(),
        }
    }

    /// Decode a value of type `ty` from its single-value binary encoding.
    pub fn from_bytes(ty: PrimitiveType, bytes: &[u8]) -> Result<Self, DatumError> {
        Ok(match ty {
            PrimitiveType::Boolean => Datum::Boolean(fixed::<1>(ty, bytes)?[0] != 0),
            PrimitiveType::Int => Datum::Int(i32::from_le_bytes(fixed(ty, bytes)?)),
            PrimitiveType::Date => Datum::Date(i32::from_le_bytes(fixed(ty, bytes)?)),
            PrimitiveType::Long => Datum::Long(i64::from_le_bytes(fixed(ty, bytes)?)),
            PrimitiveType::Timestamp => Datum::Timestamp(i64::from_le_bytes(fixed(ty, bytes)?)),
            PrimitiveType::Float => Datum::Float(f32::from_le_bytes(fixed(ty, bytes)?)),
            PrimitiveType::Double => Datum::Double(f64::from_le_bytes(fixed(ty, bytes)?)),
            PrimitiveType::String => Datum::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| DatumError::InvalidUtf8)?
                    .to_string(),
            ),
            PrimitiveType::Binary => Datum::Binary(bytes.to_vec()),
        })
    }

    /// Parse the textual form used in partition paths (`date=2018-06-08`).
    pub fn parse(ty: PrimitiveType, text: &str) -> Result<Self, DatumError> {
        let bad = || DatumError::Unparseable {
            ty,
            text: text.to_string(),
        };
        Ok(match ty {
            PrimitiveType::Boolean => Datum::Boolean(text.parse().map_err(|_| bad())?),
            PrimitiveType::Int => Datum::Int(text.parse().map_err(|_| bad())?),
            PrimitiveType::Long => Datum::Long(text.parse().map_err(|_| bad())?),
            PrimitiveType::Float => Datum::Float(text.parse().map_err(|_| bad())?),
            PrimitiveType::Double => Datum::Double(text.parse().map_err(|_| bad())?),
            PrimitiveType::Timestamp => Datum::Timestamp(text.parse().map_err(|_| bad())?),
            PrimitiveType::Date => {
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| bad())?;
                let days = date.signed_duration_since(epoch()).num_days();
                Datum::Date(i32::try_from(days).map_err(|_| bad())?)
            }
            PrimitiveType::String => Datum::String(text.to_string()),
            PrimitiveType::Binary => Datum::Binary(text.as_bytes().to_vec()),
        })
    }

    /// Convert a literal to `ty` when the conversion is lossless.
    ///
    /// Used when binding expression literals against a column type.
    pub fn cast_to(&self, ty: PrimitiveType) -> Option<Datum> {
        if self.data_type() == ty {
            return Some(self.clone());
        }
        match (self, ty) {
            (Datum::Int(v), PrimitiveType::Long) => Some(Datum::Long(i64::from(*v))),
            (Datum::Int(v), PrimitiveType::Double) => Some(Datum::Double(f64::from(*v))),
            (Datum::Int(v), PrimitiveType::Date) => Some(Datum::Date(*v)),
            (Datum::Long(v), PrimitiveType::Int) => i32::try_from(*v).ok().map(Datum::Int),
            (Datum::Long(v), PrimitiveType::Timestamp) => Some(Datum::Timestamp(*v)),
            (Datum::Float(v), PrimitiveType::Double) => Some(Datum::Double(f64::from(*v))),
            (Datum::String(s), PrimitiveType::Date) => Datum::parse(ty, s).ok(),
            (Datum::String(s), PrimitiveType::Binary) => Some(Datum::Binary(s.as_bytes().to_vec())),
            _ => None,
        }
    }
}

impl PartialOrd for Datum {
    /// Values of different types are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Boolean(a), Datum::Boolean(b)) => a.partial_cmp(b),
            (Datum::Int(a), Datum::Int(b)) | (Datum::Date(a), Datum::Date(b)) => a.partial_cmp(b),
            (Datum::Long(a), Datum::Long(b)) | (Datum::Timestamp(a), Datum::Timestamp(b)) => {
                a.partial_cmp(b)
            }
            (Datum::Float(a), Datum::Float(b)) => a.partial_cmp(b),
            (Datum::Double(a), Datum::Double(b)) => a.partial_cmp(b),
            (Datum::String(a), Datum::String(b)) => a.partial_cmp(b),
            (Datum::Binary(a), Datum::Binary(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Boolean(v) => write!(f, "{v}"),
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Long(v) | Datum::Timestamp(v) => write!(f, "{v}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Double(v) => write!(f, "{v}"),
            Datum::Date(days) => {
                match epoch().checked_add_signed(chrono::Duration::days(i64::from(*days))) {
                    Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                    None => write!(f, "{days}"),
                }
            }
            Datum::String(v) => f.write_str(v),
            Datum::Binary(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Boolean(v)
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Long(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Double(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::String(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::String(v)
    }
}
