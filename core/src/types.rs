//! Type Mapping Table between host value types and store column types.
//!
//! The mapping is pure: [`store_type_for`] picks the column type a host
//! field or argument is bound as, [`host_type_for`] picks the host type a
//! store column decodes into, and [`StoreType::from_declared`] reads the
//! declared type of a catalog column.

use std::fmt;

use crate::value::HostType;

/// Native column type of the relational store.
///
/// The variant set follows the classic SQL type names; SQLite accepts all of
/// them as declared types and assigns each an affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Char,
    NChar,
    VarChar,
    NVarChar,
    Text,
    Date,
    DateTime,
    Binary,
    VarBinary,
    /// Untyped; used for `NULL` arguments whose host type is unknown.
    Variant,
}

impl StoreType {
    /// Returns `true` for integer, floating-point and decimal columns.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::TinyInt
                | Self::SmallInt
                | Self::Int
                | Self::BigInt
                | Self::Real
                | Self::Float
                | Self::Decimal
        )
    }

    /// Returns `true` for fixed and variable width character columns.
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            Self::Char | Self::NChar | Self::VarChar | Self::NVarChar | Self::Text
        )
    }

    /// Returns `true` for floating-point and decimal columns.
    pub const fn is_fractional(self) -> bool {
        matches!(self, Self::Real | Self::Float | Self::Decimal)
    }

    /// SQL spelling of the type.
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Bit => "BIT",
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Float => "FLOAT",
            Self::Decimal => "DECIMAL",
            Self::Char => "CHAR",
            Self::NChar => "NCHAR",
            Self::VarChar => "VARCHAR",
            Self::NVarChar => "NVARCHAR",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Binary => "BINARY",
            Self::VarBinary => "VARBINARY",
            Self::Variant => "VARIANT",
        }
    }

    /// Parses a declared column type as reported by the store catalog.
    ///
    /// Length and precision suffixes (`NVARCHAR(50)`, `DECIMAL(10, 2)`) are
    /// ignored. Unknown names fall back to SQLite's affinity rules: anything
    /// containing `INT` is an integer, `CHAR`/`CLOB`/`TEXT` is text, `BLOB`
    /// is binary, `REAL`/`FLOA`/`DOUB` is floating point. An empty declared
    /// type yields [`StoreType::Variant`].
    ///
    /// # Examples
    ///
    /// ```
    /// use relmap_core::StoreType;
    ///
    /// assert_eq!(StoreType::from_declared("nvarchar(50)"), StoreType::NVarChar);
    /// assert_eq!(StoreType::from_declared("INTEGER"), StoreType::BigInt);
    /// assert_eq!(StoreType::from_declared(""), StoreType::Variant);
    /// ```
    pub fn from_declared(declared: &str) -> Self {
        let name = declared
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();

        match name.as_str() {
            "" => Self::Variant,
            "BIT" | "BOOL" | "BOOLEAN" => Self::Bit,
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "INT" | "MEDIUMINT" => Self::Int,
            "INTEGER" | "BIGINT" => Self::BigInt,
            "REAL" => Self::Real,
            "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => Self::Float,
            "DECIMAL" | "NUMERIC" | "MONEY" | "SMALLMONEY" => Self::Decimal,
            "CHAR" | "CHARACTER" => Self::Char,
            "NCHAR" | "NATIVE CHARACTER" => Self::NChar,
            "VARCHAR" | "VARYING CHARACTER" => Self::VarChar,
            "NVARCHAR" => Self::NVarChar,
            "TEXT" | "NTEXT" | "CLOB" | "XML" => Self::Text,
            "DATE" => Self::Date,
            "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "TIMESTAMP" => Self::DateTime,
            "BINARY" => Self::Binary,
            "VARBINARY" | "BLOB" | "IMAGE" => Self::VarBinary,
            other if other.contains("INT") => Self::BigInt,
            other if other.contains("CHAR") || other.contains("CLOB") || other.contains("TEXT") => {
                Self::Text
            }
            other if other.contains("BLOB") => Self::VarBinary,
            other if other.contains("REAL") || other.contains("FLOA") || other.contains("DOUB") => {
                Self::Float
            }
            _ => Self::Decimal,
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Chooses the store column type for a host type.
///
/// # Examples
///
/// ```
/// use relmap_core::{HostType, StoreType, store_type_for};
///
/// assert_eq!(store_type_for(HostType::I64), StoreType::BigInt);
/// assert_eq!(store_type_for(HostType::String), StoreType::NVarChar);
/// ```
pub const fn store_type_for(host: HostType) -> StoreType {
    match host {
        HostType::Bool => StoreType::Bit,
        HostType::U8 => StoreType::TinyInt,
        HostType::I16 | HostType::I32 => StoreType::Int,
        HostType::I64 => StoreType::BigInt,
        HostType::F64 => StoreType::Float,
        HostType::Char => StoreType::NChar,
        HostType::String => StoreType::NVarChar,
        HostType::DateTime => StoreType::DateTime,
        HostType::Bytes => StoreType::VarBinary,
    }
}

/// Chooses the host type a store column decodes into.
///
/// Returns `None` for [`StoreType::Variant`], whose values keep whatever
/// shape the store hands back.
pub const fn host_type_for(store: StoreType) -> Option<HostType> {
    let host = match store {
        StoreType::Bit => HostType::Bool,
        StoreType::TinyInt => HostType::U8,
        StoreType::SmallInt => HostType::I16,
        StoreType::Int => HostType::I32,
        StoreType::BigInt => HostType::I64,
        StoreType::Real | StoreType::Float | StoreType::Decimal => HostType::F64,
        StoreType::Char | StoreType::NChar => HostType::Char,
        StoreType::VarChar | StoreType::NVarChar | StoreType::Text => HostType::String,
        StoreType::Date | StoreType::DateTime => HostType::DateTime,
        StoreType::Binary | StoreType::VarBinary => HostType::Bytes,
        StoreType::Variant => return None,
    };
    Some(host)
}
