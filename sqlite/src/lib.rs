//! Lightweight relational mapping over SQLite.
//!
//! Turns [`Entity`] types into parameterized SQL, runs it through
//! `rusqlite`, and materializes result rows back into typed values.
//! Table, schema, primary key and column metadata are discovered from the
//! SQLite catalog on first use and cached for the process lifetime, as are
//! the statement shapes derived from them.
//!
//! # Architecture
//!
//! - **`config`**: YAML-loadable [`StoreConfig`] and [`Quoting`]
//! - **`dialect`**: identifier quoting and parameter marker scanning
//! - **`descriptor`**: [`ModelDescriptor`] resolution from overrides and the catalog
//! - **`cache`**: [`MetadataCache`] of descriptors and query shapes
//! - **`mapping`**: [`QueryMapping`] construction (property and filter modes)
//! - **`executor`**: [`Command`] execution and store error translation
//! - **`session`**: [`Session`] transaction scope
//! - **`crud`**: the [`Crud`] facade implemented by [`Orm`] and [`Session`]
//!
//! # Quick start
//!
//! ```no_run
//! use relmap_sqlite::{Crud, FieldSelection, Orm, StoreConfig, args};
//! # use relmap_sqlite::{CoreError, Entity, FieldDef, Value};
//! # #[derive(Default)] struct Order;
//! # impl Entity for Order {
//! #     const NAME: &'static str = "Order";
//! #     fn fields() -> &'static [FieldDef] { &[] }
//! #     fn get(&self, _: &str) -> Option<Value> { None }
//! #     fn set(&mut self, _: &str, _: Value) -> Result<(), CoreError> { Ok(()) }
//! # }
//!
//! let orm = Orm::new(StoreConfig::new("shop.db")).unwrap();
//!
//! let shipped: Vec<Order> = orm.find("Status = @p0", args!["Shipped"]).unwrap();
//! let open = orm.count::<Order>("Status = @p0", args!["Open"]).unwrap();
//! let id = orm.insert(&Order::default(), FieldSelection::All).unwrap();
//! println!("{} shipped, {open} open, new order {id}", shipped.len());
//! ```
//!
//! # Filter clauses
//!
//! Filters are free-form conditions with positional markers (`@p0`,
//! `@p1`, ...). Markers are paired with arguments left to right and their
//! counts must match. A leading `WHERE` is added when missing.

mod cache;
mod config;
mod crud;
mod descriptor;
mod dialect;
mod error;
mod executor;
mod mapping;
mod orm;
mod session;
mod statement;

pub use cache::{CacheStats, MetadataCache, Operation, QueryKey};
pub use config::{PARAM_PREFIXES, Quoting, StoreConfig};
pub use crud::{Crud, FilterKind, WriteKind};
pub use descriptor::ModelDescriptor;
pub use dialect::Dialect;
pub use error::{DEFAULT_VALIDATION_CODE, Error, Result};
pub use executor::Command;
pub use mapping::{BoundParameter, FieldSelection, ParamSpec, QueryMapping, QueryShape};
pub use orm::Orm;
pub use session::{Session, TransactionState};

pub use relmap_core::{
    CoreError, Entity, FieldDef, FromRecord, FromValue, HostType, Record, StoreType, Table, Value,
};

/// Builds a positional argument slice for filter clauses.
///
/// # Examples
///
/// ```
/// use relmap_sqlite::{Value, args};
///
/// let a: &[Value] = args!["Shipped", 10_i64, None::<String>];
/// assert_eq!(a.len(), 3);
/// assert!(a[2].is_null());
/// assert!(args![].is_empty());
/// ```
#[macro_export]
macro_rules! args {
    () => {
        &[] as &[$crate::Value]
    };
    ($($value:expr),+ $(,)?) => {
        &[$($crate::Value::from($value)),+][..]
    };
}
