//! Metadata Cache.
//!
//! Two unbounded Moka caches: entity type → [`ModelDescriptor`], and
//! query key → [`QueryShape`]. Concurrent misses on the same key are
//! single-flight: one caller builds, the others wait for its result.
//!
//! Keys never include argument values, so the number of entries is bounded
//! by the distinct (entity, operation, filter, argument types, fields)
//! combinations the application's code produces.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::sync::Cache;
use relmap_core::{HostType, LayoutCache};
use tracing::debug;

use crate::config::Quoting;
use crate::descriptor::ModelDescriptor;
use crate::error::{Error, Result};
use crate::mapping::QueryShape;

/// The statement family a cached shape belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    ExistsBy,
    Count,
    FindFirst,
    Find,
    PagedFind { order_by: String },
    Insert,
    Update,
    Delete,
    DeleteById,
    Raw,
}

/// Identity of a cached query shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub entity: TypeId,
    pub operation: Operation,
    pub filter: String,
    /// Host types of the positional arguments, `None` for null.
    pub argument_types: Vec<Option<HostType>>,
    /// Written or compared field names, in order.
    pub fields: Vec<&'static str>,
    pub quoting: Quoting,
}

/// Snapshot of cache sizes and miss counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub descriptors: u64,
    pub descriptor_misses: u64,
    pub queries: u64,
    pub query_misses: u64,
}

/// Process-wide metadata caches, shared by every [`Orm`](crate::Orm) that
/// holds the same `Arc<MetadataCache>`.
pub struct MetadataCache {
    descriptors: Cache<TypeId, Arc<ModelDescriptor>>,
    queries: Cache<QueryKey, Arc<QueryShape>>,
    layouts: LayoutCache,
    descriptor_misses: AtomicU64,
    query_misses: AtomicU64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            descriptors: Cache::builder().build(),
            queries: Cache::builder().build(),
            layouts: LayoutCache::new(),
            descriptor_misses: AtomicU64::new(0),
            query_misses: AtomicU64::new(0),
        }
    }

    /// Returns the descriptor for `entity`, resolving it on first use.
    ///
    /// A failed resolution is not cached; the next caller retries.
    pub fn descriptor<F>(&self, entity: TypeId, resolve: F) -> Result<Arc<ModelDescriptor>>
    where
        F: FnOnce() -> Result<ModelDescriptor>,
    {
        if let Some(found) = self.descriptors.get(&entity) {
            return Ok(found);
        }
        self.descriptors
            .try_get_with(entity, || {
                self.descriptor_misses.fetch_add(1, Ordering::Relaxed);
                debug!(?entity, "Descriptor cache miss");
                resolve().map(Arc::new)
            })
            .map_err(Error::unshare)
    }

    /// Returns the cached shape for `key`, building it on a miss.
    pub fn shape<F>(&self, key: QueryKey, build: F) -> Arc<QueryShape>
    where
        F: FnOnce() -> QueryShape,
    {
        if let Some(found) = self.queries.get(&key) {
            debug!(operation = ?key.operation, "Query shape cache hit");
            return found;
        }
        self.queries.get_with(key, || {
            self.query_misses.fetch_add(1, Ordering::Relaxed);
            let shape = build();
            debug!(query = %shape.text, "Query shape cache miss");
            Arc::new(shape)
        })
    }

    pub fn layouts(&self) -> &LayoutCache {
        &self.layouts
    }

    pub fn contains_descriptor(&self, entity: TypeId) -> bool {
        self.descriptors.contains_key(&entity)
    }

    pub fn stats(&self) -> CacheStats {
        self.descriptors.run_pending_tasks();
        self.queries.run_pending_tasks();
        CacheStats {
            descriptors: self.descriptors.entry_count(),
            descriptor_misses: self.descriptor_misses.load(Ordering::Relaxed),
            queries: self.queries.entry_count(),
            query_misses: self.query_misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
