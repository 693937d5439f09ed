//! The engine entry point.

use std::any::TypeId;
use std::sync::Arc;

use relmap_core::Value;

use crate::cache::{MetadataCache, Operation, QueryKey};
use crate::config::StoreConfig;
use crate::crud::Crud;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::{self, Command, Handle};
use crate::mapping::BoundParameter;
use crate::session::Session;

/// Configuration, dialect and metadata caches for one store.
///
/// Cheap to share by reference across threads: every call through
/// [`Crud`] opens its own connection. Several `Orm`s may share one
/// [`MetadataCache`] through [`Orm::with_cache`].
#[derive(Debug)]
pub struct Orm {
    config: StoreConfig,
    dialect: Dialect,
    cache: Arc<MetadataCache>,
}

impl Orm {
    /// Creates an engine with its own metadata cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if the
    /// connection string is missing or the quoting is invalid.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_cache(config, Arc::new(MetadataCache::new()))
    }

    /// Creates an engine that shares `cache` with other engines.
    pub fn with_cache(config: StoreConfig, cache: Arc<MetadataCache>) -> Result<Self> {
        config.validate()?;
        let dialect = Dialect::new(config.quoting.clone())?;
        Ok(Self {
            config,
            dialect,
            cache,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Opens a session holding one connection for several calls.
    pub fn session(&self) -> Result<Session<'_>> {
        Session::open(self)
    }

    pub(crate) fn query_key<T: 'static>(
        &self,
        operation: Operation,
        filter: &str,
        args: &[Value],
        fields: Vec<&'static str>,
    ) -> QueryKey {
        QueryKey {
            entity: TypeId::of::<T>(),
            operation,
            filter: filter.to_string(),
            argument_types: args.iter().map(Value::host_type).collect(),
            fields,
            quoting: self.dialect.quoting().clone(),
        }
    }
}

impl Crud for Orm {
    fn orm(&self) -> &Orm {
        self
    }

    fn command(&self, text: &str, parameters: Vec<BoundParameter>) -> Result<Command<'_>> {
        let conn = executor::open(&self.config)?;
        Ok(Command::new(Handle::Owned(conn), text, parameters, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Quoting;
    use crate::error::Error;

    #[test]
    fn test_new_requires_connection_string() {
        let err = Orm::new(StoreConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_new_rejects_bad_quoting() {
        let config = StoreConfig::new("app.db").with_quoting(Quoting {
            param_prefix: '?',
            ..Quoting::default()
        });
        assert!(Orm::new(config).is_err());
    }

    #[test]
    fn test_query_key_carries_types_not_values() {
        let orm = Orm::new(StoreConfig::new("app.db")).unwrap();
        let a = orm.query_key::<()>(Operation::Find, "x = @p0", &[Value::from("a")], Vec::new());
        let b = orm.query_key::<()>(Operation::Find, "x = @p0", &[Value::from("b")], Vec::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_engines_share_cache() {
        let cache = Arc::new(MetadataCache::new());
        let a = Orm::with_cache(StoreConfig::new("a.db"), Arc::clone(&cache)).unwrap();
        let b = Orm::with_cache(StoreConfig::new("b.db"), Arc::clone(&cache)).unwrap();
        assert!(Arc::ptr_eq(a.cache(), b.cache()));
    }
}
