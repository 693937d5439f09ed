//! Host-side values exchanged with the relational store.
//!
//! [`Value`] is the dynamically typed currency of the mapping layer: entity
//! fields are read into values for parameter binding, filter arguments are
//! supplied as values, and result rows are decoded into values before they
//! are assigned back onto entity fields.

use std::fmt;

use chrono::NaiveDateTime;

use crate::error::{CoreError, Result};

/// Text layout used when a timestamp crosses the store boundary.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Alternative timestamp layout accepted when decoding (ISO-8601 with `T`).
const DATETIME_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Static type of a host value or entity field.
///
/// Every non-null [`Value`] variant has exactly one host type. The Type
/// Mapping Table ([`store_type_for`](crate::store_type_for)) chooses the
/// store column type from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F64,
    Char,
    String,
    DateTime,
    Bytes,
}

impl HostType {
    /// Returns `true` for the integer and floating-point types.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::U8 | Self::I16 | Self::I32 | Self::I64 | Self::F64
        )
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A nullable, dynamically typed host value.
///
/// # Examples
///
/// ```
/// use relmap_core::{HostType, Value};
///
/// let v = Value::from("Shipped");
/// assert_eq!(v.host_type(), Some(HostType::String));
///
/// let missing: Option<i64> = None;
/// assert!(Value::from(missing).is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Char(char),
    Text(String),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns `true` if this is [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the host type of this value, or `None` for `Null`.
    pub const fn host_type(&self) -> Option<HostType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(HostType::Bool),
            Self::U8(_) => Some(HostType::U8),
            Self::I16(_) => Some(HostType::I16),
            Self::I32(_) => Some(HostType::I32),
            Self::I64(_) => Some(HostType::I64),
            Self::F64(_) => Some(HostType::F64),
            Self::Char(_) => Some(HostType::Char),
            Self::Text(_) => Some(HostType::String),
            Self::DateTime(_) => Some(HostType::DateTime),
            Self::Bytes(_) => Some(HostType::Bytes),
        }
    }

    /// Interprets the value as an integer the way a scalar result is read.
    ///
    /// Integer values and text holding a base-10 integer succeed; booleans,
    /// fractional numbers, timestamps, blobs, and `Null` yield `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::U8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            Self::F64(v) if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 => {
                Some(*v as i64)
            }
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converts this value into the given host type.
    ///
    /// Used when a store value is assigned to an entity field: SQLite keeps
    /// booleans as integers, timestamps as text and so on, so the decoded
    /// value is reshaped into the field's declared type. `Null` converts to
    /// `Null` for every target.
    pub fn convert(self, target: HostType) -> Result<Self> {
        if self.host_type() == Some(target) || self.is_null() {
            return Ok(self);
        }

        let converted = match (target, &self) {
            (HostType::Bool, v) => v.as_i64().map(|i| Self::Bool(i != 0)),
            (HostType::U8, v) => v.as_i64().and_then(|i| u8::try_from(i).ok()).map(Self::U8),
            (HostType::I16, v) => v
                .as_i64()
                .and_then(|i| i16::try_from(i).ok())
                .map(Self::I16),
            (HostType::I32, v) => v
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Self::I32),
            (HostType::I64, Self::Bool(b)) => Some(Self::I64(i64::from(*b))),
            (HostType::I64, v) => v.as_i64().map(Self::I64),
            (HostType::F64, Self::Text(s)) => s.trim().parse().ok().map(Self::F64),
            #[allow(clippy::cast_precision_loss)]
            (HostType::F64, v) => v.as_i64().map(|i| Self::F64(i as f64)),
            (HostType::Char, Self::Text(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Self::Char(c)),
                    _ => None,
                }
            }
            (HostType::String, Self::Char(c)) => Some(Self::Text(c.to_string())),
            (HostType::String, Self::DateTime(dt)) => {
                Some(Self::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            (HostType::String, Self::Bytes(b)) => String::from_utf8(b.clone()).ok().map(Self::Text),
            (HostType::String, v) => v.as_i64().map(|i| Self::Text(i.to_string())),
            (HostType::DateTime, Self::Text(s)) => parse_datetime(s).map(Self::DateTime),
            (HostType::Bytes, Self::Text(s)) => Some(Self::Bytes(s.clone().into_bytes())),
            _ => None,
        };

        converted.ok_or_else(|| CoreError::Conversion {
            value: self.to_string(),
            target,
        })
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DATETIME_FORMAT_ISO))
        .ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "'{v}'"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::DateTime(v) => write!(f, "'{}'", v.format(DATETIME_FORMAT)),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    u8 => U8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f64 => F64,
    char => Char,
    String => Text,
    NaiveDateTime => DateTime,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F64(f64::from(v))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Typed extraction of a [`Value`], used by entity setters and scalar reads.
///
/// Implementations accept the exact variant and otherwise go through
/// [`Value::convert`]. `Option<T>` maps `Null` to `None`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $host:ident, $variant:ident);* $(;)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    match value.convert(HostType::$host)? {
                        Value::$variant(v) => Ok(v),
                        other => Err(CoreError::Conversion {
                            value: other.to_string(),
                            target: HostType::$host,
                        }),
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool, Bool;
    u8 => U8, U8;
    i16 => I16, I16;
    i32 => I32, I32;
    i64 => I64, I64;
    f64 => F64, F64;
    char => Char, Char;
    String => String, Text;
    NaiveDateTime => DateTime, DateTime;
    Vec<u8> => Bytes, Bytes;
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}
