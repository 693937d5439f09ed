//! Store configuration.
//!
//! Defines the YAML-serializable settings the engine needs: where the
//! store lives, how long a command may wait, and the dialect conventions
//! used when rendering statements.
//!
//! # Example YAML
//!
//! ```yaml
//! connection_string: "data/app.db"
//! command_timeout_ms: 30000
//! foreign_keys: true
//! quoting:
//!   begin: "\""
//!   end: "\""
//!   param_prefix: "@"
//! validation_error_code: 1811
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DEFAULT_VALIDATION_CODE, Error, Result};

/// Parameter marker prefixes SQLite understands for named parameters.
pub const PARAM_PREFIXES: [char; 3] = ['@', ':', '$'];

/// Identifier delimiters and parameter marker prefix.
///
/// # Examples
///
/// ```
/// # use relmap_sqlite::Quoting;
/// let q = Quoting::brackets();
/// assert_eq!(q.begin, "[");
/// assert_eq!(q.param_prefix, '@');
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Quoting {
    /// Opening identifier delimiter.
    pub begin: String,
    /// Closing identifier delimiter.
    pub end: String,
    /// Prefix character of parameter markers.
    pub param_prefix: char,
}

impl Quoting {
    /// `[name]` style delimiters, also accepted by SQLite.
    pub fn brackets() -> Self {
        Self {
            begin: "[".to_string(),
            end: "]".to_string(),
            ..Self::default()
        }
    }

    /// Checks that the delimiters are usable and the prefix is supported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        for delimiter in [&self.begin, &self.end] {
            if delimiter.is_empty() || delimiter.chars().any(char::is_whitespace) {
                return Err(Error::Configuration(format!(
                    "invalid identifier delimiter '{delimiter}'"
                )));
            }
        }
        if !PARAM_PREFIXES.contains(&self.param_prefix) {
            return Err(Error::Configuration(format!(
                "unsupported parameter prefix '{}': expected one of @, :, $",
                self.param_prefix
            )));
        }
        Ok(())
    }
}

impl Default for Quoting {
    fn default() -> Self {
        Self {
            begin: "\"".to_string(),
            end: "\"".to_string(),
            param_prefix: '@',
        }
    }
}

/// Top-level store configuration.
///
/// Usually loaded from the host application's YAML settings; the
/// connection string is the only required field.
///
/// # Examples
///
/// ```
/// use relmap_sqlite::StoreConfig;
///
/// let config = StoreConfig::new("app.db").with_command_timeout_ms(5_000);
/// assert_eq!(config.connection_string().unwrap(), "app.db");
/// assert_eq!(config.command_timeout().as_millis(), 5_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database path or `file:` URI.
    pub connection_string: Option<String>,
    /// Limit on each command's execution, and on its wait for a locked
    /// database, in milliseconds. Zero leaves execution unbounded.
    pub command_timeout_ms: u64,
    /// Enable `PRAGMA foreign_keys` on every opened connection.
    pub foreign_keys: bool,
    /// Identifier delimiters and parameter marker prefix.
    pub quoting: Quoting,
    /// Extended result code translated into a validation error.
    pub validation_error_code: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            command_timeout_ms: 30_000,
            foreign_keys: true,
            quoting: Quoting::default(),
            validation_error_code: DEFAULT_VALIDATION_CODE,
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration for the given connection string.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            ..Self::default()
        }
    }

    pub fn with_command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }

    pub fn with_validation_error_code(mut self, code: i32) -> Self {
        self.validation_error_code = code;
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Yaml`]
    /// if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be written, or
    /// [`Error::Yaml`] if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Returns the connection string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if it is missing or blank.
    pub fn connection_string(&self) -> Result<&str> {
        match self.connection_string.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(Error::Configuration(
                "connection string is not configured".to_string(),
            )),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Validates the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.connection_string()?;
        self.quoting.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
connection_string: "data/app.db"
command_timeout_ms: 1500
foreign_keys: false
quoting:
  begin: "["
  end: "]"
  param_prefix: ":"
validation_error_code: 275
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: StoreConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.connection_string().unwrap(), "data/app.db");
        assert_eq!(config.command_timeout_ms, 1500);
        assert!(!config.foreign_keys);
        assert_eq!(config.quoting.begin, "[");
        assert_eq!(config.quoting.param_prefix, ':');
        assert_eq!(config.validation_error_code, 275);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let config: StoreConfig = serde_yaml::from_str("connection_string: app.db").unwrap();
        assert_eq!(config.command_timeout_ms, 30_000);
        assert!(config.foreign_keys);
        assert_eq!(config.quoting, Quoting::default());
        assert_eq!(config.validation_error_code, DEFAULT_VALIDATION_CODE);
    }

    #[test]
    fn test_missing_connection_string() {
        let config = StoreConfig::default();
        assert!(matches!(config.connection_string(), Err(Error::Configuration(_))));

        let blank = StoreConfig::new("   ");
        assert!(matches!(blank.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_quoting() {
        let mut q = Quoting::default();
        q.param_prefix = '#';
        assert!(q.validate().is_err());

        let q = Quoting {
            begin: String::new(),
            ..Quoting::default()
        };
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yml");

        let original = StoreConfig::new("app.db")
            .with_command_timeout_ms(250)
            .with_quoting(Quoting::brackets());
        original.save(&path).unwrap();

        let loaded = StoreConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
