//! Error types for the mapping engine.
//!
//! Every failure that can be detected without the store (missing
//! configuration, a filter whose markers do not match its arguments, an
//! unset primary key, an empty column list) is raised before a connection
//! is opened. Store failures are translated exactly once: the reserved
//! validation code becomes [`Error::StoreValidation`], everything else
//! [`Error::StoreExecution`].

use std::sync::Arc;

use relmap_core::CoreError;
use thiserror::Error;

/// Extended result code SQLite reports for `RAISE(ABORT, ...)` in a trigger.
pub const DEFAULT_VALIDATION_CODE: i32 = rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER;

/// Errors that can occur while mapping, executing or materializing.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection string is missing or the configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The catalog did not report exactly one schema owning the table.
    #[error("no unique schema found for table '{table}' of {entity}")]
    SchemaNotFound { entity: &'static str, table: String },

    /// The catalog reported no columns for the table.
    #[error("no columns found for table '{schema}.{table}' of {entity}")]
    ColumnDiscovery {
        entity: &'static str,
        table: String,
        schema: String,
    },

    /// A filter clause's marker count differs from its argument count.
    #[error(
        "filter has {markers} parameter marker(s) but {arguments} argument(s) were supplied: {filter}"
    )]
    ParameterCountMismatch {
        filter: String,
        markers: usize,
        arguments: usize,
    },

    /// A bound parameter and the statement's parameters do not line up:
    /// either a value names a parameter the statement lacks, or the
    /// statement has a parameter no value was bound to.
    #[error("parameter '{name}' is not bound in: {query}")]
    UnboundParameter { name: String, query: String },

    /// The entity's primary key is not a positive integer.
    #[error("primary key '{column}' of {entity} is not set")]
    PrimaryKeyUnset { entity: &'static str, column: String },

    /// Insert or update found no non-null field to write.
    #[error("no columns to write for {entity}")]
    EmptyColumnList { entity: &'static str },

    /// A field name does not belong to the entity.
    #[error("{entity} has no field named '{field}'")]
    UnknownField { entity: &'static str, field: String },

    /// An identifier (savepoint, delimiter, ...) failed validation.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// A command was issued on a closed session.
    #[error("session is closed")]
    SessionClosed,

    /// A store-raised validation failure meant for the end user.
    #[error("{message}")]
    StoreValidation {
        message: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other store failure (connectivity, syntax, constraints).
    #[error("store error: {0}")]
    StoreExecution(#[source] rusqlite::Error),

    /// A value could not be converted between store and entity.
    #[error("conversion error: {0}")]
    Conversion(#[from] CoreError),

    /// Configuration file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The same failure, observed by a caller that waited on a concurrent
    /// cache fill.
    #[error(transparent)]
    Shared(Arc<Error>),
}

impl Error {
    /// Translates a store error, singling out the reserved validation code.
    pub fn from_store(err: rusqlite::Error, validation_code: i32) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.extended_code == validation_code =>
            {
                let message = message
                    .clone()
                    .unwrap_or_else(|| failure.to_string());
                Self::StoreValidation {
                    message,
                    source: err,
                }
            }
            _ => Self::StoreExecution(err),
        }
    }

    /// Unwraps a shared error when this caller holds the only reference.
    pub(crate) fn unshare(err: Arc<Self>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(Self::Shared)
    }

    /// Returns the underlying error, looking through [`Error::Shared`].
    pub fn root(&self) -> &Self {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Returns `true` for store-raised validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Self::StoreValidation { .. })
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(extended_code: i32, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(extended_code),
            Some(message.to_string()),
        )
    }

    #[test]
    fn test_reserved_code_becomes_validation_error() {
        let err = Error::from_store(failure(DEFAULT_VALIDATION_CODE, "Name is required"), DEFAULT_VALIDATION_CODE);
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Name is required");
    }

    #[test]
    fn test_other_codes_stay_execution_errors() {
        let err = Error::from_store(
            failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed"),
            DEFAULT_VALIDATION_CODE,
        );
        assert!(matches!(err, Error::StoreExecution(_)));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_custom_validation_code() {
        let err = Error::from_store(failure(rusqlite::ffi::SQLITE_CONSTRAINT_CHECK, "bad"), rusqlite::ffi::SQLITE_CONSTRAINT_CHECK);
        assert!(err.is_validation());
    }

    #[test]
    fn test_root_looks_through_shared() {
        let shared = Error::Shared(Arc::new(Error::SessionClosed));
        assert!(matches!(shared.root(), Error::SessionClosed));
        assert!(matches!(Error::unshare(Arc::new(Error::SessionClosed)), Error::SessionClosed));
    }
}
