//! Row Materializer: result rows into typed host objects.
//!
//! A [`Record`] is one decoded result row; [`FromRecord`] turns records into
//! targets. Scalar targets (`i64`, `String`, ...) take the first column
//! directly. Entity targets are matched column-by-field through a
//! [`Layout`] that is resolved once per type and kept in a [`LayoutCache`].
//!
//! Every row of a batch is materialized into a freshly constructed entity.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use moka::sync::Cache;

use crate::entity::Entity;
use crate::error::{CoreError, Result};
use crate::value::{FromValue, HostType, Value};

/// One result row: shared column names plus this row's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A raw tabular result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn from_records(columns: &[String], records: Vec<Record>) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: records.into_iter().map(Record::into_values).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Assignable field of an entity, as seen by the materializer.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub field: &'static str,
    pub host_type: HostType,
}

/// Per-type materialization metadata: writable fields keyed by lowercase
/// name.
#[derive(Debug)]
pub struct Layout {
    slots: HashMap<String, Slot>,
}

impl Layout {
    fn of<T: Entity>() -> Self {
        let slots = T::fields()
            .iter()
            .filter(|f| f.writable)
            .map(|f| {
                (
                    f.name.to_ascii_lowercase(),
                    Slot {
                        field: f.name,
                        host_type: f.host_type,
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Resolves the slot for a result column.
    ///
    /// Qualified names (`Orders.Status`) match on the part after the last
    /// dot.
    pub fn slot(&self, column: &str) -> Option<&Slot> {
        let bare = column.rsplit('.').next().unwrap_or(column);
        self.slots.get(&bare.to_ascii_lowercase())
    }

    /// Pairs every result column with its slot, once per result set.
    pub fn bind(&self, columns: &[String]) -> Vec<Option<Slot>> {
        columns.iter().map(|c| self.slot(c).copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Process-wide cache of entity layouts, keyed by type identity.
///
/// Unbounded: the number of entries is bounded by the entity types the
/// application declares.
#[derive(Clone)]
pub struct LayoutCache {
    layouts: Cache<TypeId, Arc<Layout>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self {
            layouts: Cache::builder().build(),
        }
    }

    /// Returns the layout for `T`, building it on first use.
    pub fn layout<T: Entity>(&self) -> Arc<Layout> {
        self.layouts
            .get_with(TypeId::of::<T>(), || Arc::new(Layout::of::<T>()))
    }

}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LayoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutCache")
            .field("entries", &self.layouts.entry_count())
            .finish()
    }
}

/// A target that result rows can be materialized into.
pub trait FromRecord: Sized {
    fn from_record(record: &Record, layouts: &LayoutCache) -> Result<Self>;

    /// Materializes a whole result set, one fresh target per row.
    fn from_records(records: &[Record], layouts: &LayoutCache) -> Result<Vec<Self>> {
        records
            .iter()
            .map(|r| Self::from_record(r, layouts))
            .collect()
    }
}

impl<T: Entity> FromRecord for T {
    fn from_record(record: &Record, layouts: &LayoutCache) -> Result<Self> {
        let layout = layouts.layout::<T>();
        let bound = layout.bind(record.columns());
        fill(&bound, record)
    }

    fn from_records(records: &[Record], layouts: &LayoutCache) -> Result<Vec<Self>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        let layout = layouts.layout::<T>();
        let bound = layout.bind(first.columns());
        records.iter().map(|r| fill(&bound, r)).collect()
    }
}

fn fill<T: Entity>(bound: &[Option<Slot>], record: &Record) -> Result<T> {
    let mut target = T::default();
    for (slot, value) in bound.iter().zip(record.values()) {
        let Some(slot) = slot else { continue };
        if value.is_null() {
            continue;
        }
        let value = value.clone().convert(slot.host_type)?;
        target.set(slot.field, value)?;
    }
    Ok(target)
}

macro_rules! impl_scalar_from_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRecord for $ty {
                fn from_record(record: &Record, _layouts: &LayoutCache) -> Result<Self> {
                    let first = record.get(0).ok_or(CoreError::EmptyRow)?;
                    <$ty as FromValue>::from_value(first.clone())
                }
            }
        )*
    };
}

impl_scalar_from_record!(bool, u8, i16, i32, i64, f64, char, String, NaiveDateTime, Vec<u8>, Value);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldDef;

    #[derive(Debug, Default)]
    struct Order {
        order_id: Option<i64>,
        status: Option<String>,
        priority: Option<i32>,
        summary: Option<String>,
    }

    impl Entity for Order {
        const NAME: &'static str = "Order";

        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("OrderID", HostType::I64),
                FieldDef::new("Status", HostType::String),
                FieldDef::new("Priority", HostType::I32),
                FieldDef::new("Summary", HostType::String).read_only(),
            ];
            FIELDS
        }

        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "OrderID" => Some(self.order_id.into()),
                "Status" => Some(self.status.clone().into()),
                "Priority" => Some(self.priority.into()),
                "Summary" => Some(self.summary.clone().into()),
                _ => None,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> Result<()> {
            match field {
                "OrderID" => self.order_id = FromValue::from_value(value)?,
                "Status" => self.status = FromValue::from_value(value)?,
                "Priority" => self.priority = FromValue::from_value(value)?,
                "Summary" => self.summary = FromValue::from_value(value)?,
                _ => return Err(Self::unknown_field(field)),
            }
            Ok(())
        }
    }

    fn columns(names: &[&str]) -> Arc<[String]> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_entity_columns_match_case_insensitively() {
        let cols = columns(&["orderid", "STATUS", "Priority"]);
        let record = Record::new(
            cols,
            vec![Value::I64(3), Value::from("Shipped"), Value::I64(2)],
        );
        let order = Order::from_record(&record, &LayoutCache::new()).unwrap();
        assert_eq!(order.order_id, Some(3));
        assert_eq!(order.status.as_deref(), Some("Shipped"));
        assert_eq!(order.priority, Some(2));
    }

    #[test]
    fn test_unmatched_columns_and_nulls_keep_defaults() {
        let cols = columns(&["OrderID", "Status", "Warehouse", "Summary"]);
        let record = Record::new(
            cols,
            vec![
                Value::I64(1),
                Value::Null,
                Value::from("North"),
                Value::from("ignored"),
            ],
        );
        let order = Order::from_record(&record, &LayoutCache::new()).unwrap();
        assert_eq!(order.order_id, Some(1));
        assert_eq!(order.status, None);
        // Read-only fields are never assigned.
        assert_eq!(order.summary, None);
    }

    #[test]
    fn test_each_row_gets_a_fresh_object() {
        let cols = columns(&["OrderID", "Status"]);
        let records = vec![
            Record::new(cols.clone(), vec![Value::I64(1), Value::from("Open")]),
            Record::new(cols, vec![Value::I64(2), Value::Null]),
        ];
        let orders = Order::from_records(&records, &LayoutCache::new()).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_id, Some(1));
        assert_eq!(orders[0].status.as_deref(), Some("Open"));
        assert_eq!(orders[1].order_id, Some(2));
        // The second row's NULL must not inherit the first row's value.
        assert_eq!(orders[1].status, None);
    }

    #[test]
    fn test_scalar_targets_use_first_column() {
        let record = Record::new(columns(&["n", "other"]), vec![Value::I64(41), Value::from("x")]);
        let layouts = LayoutCache::new();
        assert_eq!(i64::from_record(&record, &layouts).unwrap(), 41);
        assert_eq!(String::from_record(&record, &layouts).unwrap(), "41");
    }

    #[test]
    fn test_scalar_from_empty_row_fails() {
        let record = Record::new(columns(&[]), vec![]);
        let err = i64::from_record(&record, &LayoutCache::new()).unwrap_err();
        assert_eq!(err, CoreError::EmptyRow);
    }

    #[test]
    fn test_layout_is_cached_per_type() {
        let layouts = LayoutCache::new();
        let a = layouts.layout::<Order>();
        let b = layouts.layout::<Order>();
        assert!(Arc::ptr_eq(&a, &b));
        // Summary is read-only and therefore absent.
        assert_eq!(a.len(), 3);
        assert!(a.slot("orders.STATUS").is_some());
    }

    #[test]
    fn test_conversion_failure_surfaces() {
        let record = Record::new(columns(&["Priority"]), vec![Value::from("high")]);
        assert!(Order::from_record(&record, &LayoutCache::new()).is_err());
    }
}
