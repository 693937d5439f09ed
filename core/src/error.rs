//! Error types for value conversion and entity access.

use thiserror::Error;

use crate::value::HostType;

/// Errors raised while moving values between the store and entities.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A value could not be reshaped into the requested host type.
    #[error("cannot convert {value} to {target}")]
    Conversion { value: String, target: HostType },

    /// An entity was asked for a field it does not declare.
    #[error("entity {entity} has no field named '{field}'")]
    UnknownField { entity: &'static str, field: String },

    /// A result set without columns was materialized into a scalar.
    #[error("result row has no columns")]
    EmptyRow,
}

/// Convenience alias for results with [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
