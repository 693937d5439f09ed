//! Store-agnostic model for the relmap mapping layer.
//!
//! This crate defines what the engine maps between:
//!
//! - [`Value`] and [`HostType`]: nullable host values and their static
//!   types.
//! - [`StoreType`], [`store_type_for`], [`host_type_for`]: the Type
//!   Mapping Table between host types and store column types.
//! - [`Entity`] and [`FieldDef`]: the capability an entity type implements
//!   so it can be written to and read from a table.
//! - [`Record`], [`Table`], [`FromRecord`], [`LayoutCache`]: the Row
//!   Materializer turning result rows into entities or scalars.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use relmap_core::{FromRecord, LayoutCache, Record, Value};
//!
//! let columns: Arc<[String]> = Arc::from(vec!["total".to_string()]);
//! let row = Record::new(columns, vec![Value::I64(12)]);
//! let total = i64::from_record(&row, &LayoutCache::new()).unwrap();
//! assert_eq!(total, 12);
//! ```

mod entity;
mod error;
mod record;
mod types;
mod value;

pub use entity::{Entity, FieldDef};
pub use error::{CoreError, Result};
pub use record::{FromRecord, Layout, LayoutCache, Record, Slot, Table};
pub use types::{StoreType, host_type_for, store_type_for};
pub use value::{DATETIME_FORMAT, FromValue, HostType, Value};
