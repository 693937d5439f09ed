//! The entity capability: field enumeration, construction and field access.
//!
//! An entity type describes one table's row shape. Instead of walking
//! properties at runtime, each entity declares its fields once in a
//! `const` table and routes reads and writes through [`Entity::get`] and
//! [`Entity::set`]. Construction uses [`Default`].
//!
//! # Example
//!
//! ```
//! use relmap_core::{Entity, FieldDef, FromValue, HostType, Result, Value};
//!
//! #[derive(Debug, Default)]
//! struct Customer {
//!     customer_id: Option<i64>,
//!     name: Option<String>,
//! }
//!
//! impl Entity for Customer {
//!     const NAME: &'static str = "Customer";
//!
//!     fn fields() -> &'static [FieldDef] {
//!         const FIELDS: &[FieldDef] = &[
//!             FieldDef::new("CustomerID", HostType::I64),
//!             FieldDef::new("Name", HostType::String),
//!         ];
//!         FIELDS
//!     }
//!
//!     fn get(&self, field: &str) -> Option<Value> {
//!         match field {
//!             "CustomerID" => Some(self.customer_id.into()),
//!             "Name" => Some(self.name.clone().into()),
//!             _ => None,
//!         }
//!     }
//!
//!     fn set(&mut self, field: &str, value: Value) -> Result<()> {
//!         match field {
//!             "CustomerID" => self.customer_id = FromValue::from_value(value)?,
//!             "Name" => self.name = FromValue::from_value(value)?,
//!             _ => return Err(Self::unknown_field(field)),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut c = Customer::default();
//! c.set("Name", Value::from("Ada")).unwrap();
//! assert_eq!(c.get("Name"), Some(Value::from("Ada")));
//! ```

use crate::error::{CoreError, Result};
use crate::value::{HostType, Value};

/// Declaration of one entity field.
///
/// Field names double as column names. Flags mirror the attributes a
/// mapping layer needs: `ignored` fields never reach a statement,
/// `inherited` fields belong to a shared base shape and are skipped when
/// writing, and read-only fields are never assigned during
/// materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub host_type: HostType,
    pub ignored: bool,
    pub inherited: bool,
    pub writable: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, host_type: HostType) -> Self {
        Self {
            name,
            host_type,
            ignored: false,
            inherited: false,
            writable: true,
        }
    }

    /// Marks the field as excluded from insert and update statements.
    pub const fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Marks the field as declared on a shared base shape.
    pub const fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }

    /// Marks the field as not assignable from result rows.
    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Returns `true` if the field takes part in insert/update statements.
    pub const fn is_persisted(&self) -> bool {
        !self.ignored && !self.inherited
    }
}

/// A host type that maps onto a single store table.
///
/// Overrides (`table_name`, `schema_name`, `primary_key`, `columns`)
/// default to `None`, meaning the mapping layer derives or discovers the
/// value.
pub trait Entity: Default + Send + 'static {
    /// Bare type name; the default table name.
    const NAME: &'static str;

    /// Fields in declaration order.
    fn fields() -> &'static [FieldDef];

    /// Reads a field. Returns `None` for an undeclared field and
    /// `Some(Value::Null)` for an unset one.
    fn get(&self, field: &str) -> Option<Value>;

    /// Assigns a field from a value already converted to its host type.
    fn set(&mut self, field: &str, value: Value) -> Result<()>;

    fn table_name() -> Option<&'static str> {
        None
    }

    fn schema_name() -> Option<&'static str> {
        None
    }

    fn primary_key() -> Option<&'static str> {
        None
    }

    /// Bare column names to select instead of the catalog's column list.
    fn columns() -> Option<&'static [&'static str]> {
        None
    }

    /// Looks up a declared field by name, ignoring ASCII case.
    fn field(name: &str) -> Option<&'static FieldDef> {
        Self::fields()
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Builds the error returned by setters for undeclared fields.
    fn unknown_field(field: &str) -> CoreError {
        CoreError::UnknownField {
            entity: Self::NAME,
            field: field.to_string(),
        }
    }
}
