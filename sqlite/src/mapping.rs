//! Query/Parameter Mapper.
//!
//! Builds [`QueryMapping`]s in one of two modes:
//!
//! - **Property mode** (insert/update): every persisted, non-null field of an
//!   entity becomes one column, one placeholder and one bound parameter.
//!   Null fields are left out of the statement entirely.
//! - **Filter mode** (count/find/delete/raw): parameter markers are scanned
//!   out of a free-form clause and paired, left to right, with positional
//!   argument values. The marker count must equal the argument count.
//!
//! The text and parameter *shape* of a mapping is cached; argument values
//! are bound onto the cached shape per call.

use std::sync::Arc;

use relmap_core::{Entity, FieldDef, StoreType, Value, store_type_for};

use crate::dialect::{self, Dialect};
use crate::error::{Error, Result};

/// Which entity fields an insert or update may write.
#[derive(Debug, Clone, Copy, Default)]
pub enum FieldSelection<'a> {
    /// Every persisted field.
    #[default]
    All,
    /// Only the named fields (whitelist).
    Only(&'a [&'a str]),
    /// Every persisted field except the named ones (blacklist).
    Except(&'a [&'a str]),
}

impl FieldSelection<'_> {
    fn admits(&self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n.eq_ignore_ascii_case(field)),
            Self::Except(names) => !names.iter().any(|n| n.eq_ignore_ascii_case(field)),
        }
    }

    fn names(&self) -> &[&str] {
        match self {
            Self::All => &[],
            Self::Only(names) | Self::Except(names) => names,
        }
    }
}

/// Name and store type of one parameter slot of a cached shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub store_type: StoreType,
}

/// The value-independent part of a mapping: statement text plus the
/// ordered parameter slots. This is what the metadata cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryShape {
    pub text: String,
    /// Written columns, for insert and update.
    pub columns: Vec<String>,
    /// Placeholders paired with `columns`, or the filter's markers.
    pub placeholders: Vec<String>,
    pub params: Vec<ParamSpec>,
}

/// A named, typed value ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub store_type: StoreType,
    pub value: Value,
}

impl BoundParameter {
    /// Creates a parameter, normalizing the value for its store type.
    ///
    /// Null stays null. An empty string becomes zero for numeric store
    /// types and null for the other non-text types.
    ///
    /// # Examples
    ///
    /// ```
    /// use relmap_core::{StoreType, Value};
    /// use relmap_sqlite::BoundParameter;
    ///
    /// let p = BoundParameter::new("@val0", StoreType::Int, Value::from(""));
    /// assert_eq!(p.value, Value::I64(0));
    ///
    /// let p = BoundParameter::new("@val1", StoreType::DateTime, Value::from(""));
    /// assert!(p.value.is_null());
    /// ```
    pub fn new(name: impl Into<String>, store_type: StoreType, value: Value) -> Self {
        let value = match value {
            Value::Text(s) if s.is_empty() && store_type.is_fractional() => Value::F64(0.0),
            Value::Text(s) if s.is_empty() && store_type.is_numeric() => Value::I64(0),
            Value::Text(s)
                if s.is_empty() && !store_type.is_text() && store_type != StoreType::Variant =>
            {
                Value::Null
            }
            other => other,
        };
        Self {
            name: name.into(),
            store_type,
            value,
        }
    }

    /// Creates a parameter whose store type follows the value's host type.
    pub fn inferred(name: impl Into<String>, value: Value) -> Self {
        let store_type = value
            .host_type()
            .map(store_type_for)
            .unwrap_or(StoreType::Variant);
        Self::new(name, store_type, value)
    }
}

/// Final statement text plus its ordered bound parameters.
#[derive(Debug, Clone)]
pub struct QueryMapping {
    shape: Arc<QueryShape>,
    parameters: Vec<BoundParameter>,
}

impl QueryMapping {
    /// Binds `values` onto the shape's parameter slots, in order.
    pub(crate) fn bind(shape: Arc<QueryShape>, values: Vec<Value>) -> Self {
        debug_assert_eq!(shape.params.len(), values.len());
        let parameters = shape
            .params
            .iter()
            .zip(values)
            .map(|(spec, value)| BoundParameter::new(spec.name.clone(), spec.store_type, value))
            .collect();
        Self { shape, parameters }
    }

    pub fn query_text(&self) -> &str {
        &self.shape.text
    }

    pub fn columns(&self) -> &[String] {
        &self.shape.columns
    }

    pub fn placeholders(&self) -> &[String] {
        &self.shape.placeholders
    }

    pub fn bound_parameters(&self) -> &[BoundParameter] {
        &self.parameters
    }

    pub fn shape(&self) -> &Arc<QueryShape> {
        &self.shape
    }

    pub(crate) fn into_parts(self) -> (String, Vec<BoundParameter>) {
        (self.shape.text.clone(), self.parameters)
    }
}

/// Scans the markers of a filter clause and checks them against the
/// supplied arguments.
///
/// # Errors
///
/// Returns [`Error::ParameterCountMismatch`] when the counts differ.
pub(crate) fn filter_markers<'f>(
    dialect: &Dialect,
    filter: &'f str,
    args: &[Value],
) -> Result<Vec<&'f str>> {
    let markers = dialect.markers(filter);
    if markers.len() != args.len() {
        return Err(Error::ParameterCountMismatch {
            filter: filter.to_string(),
            markers: markers.len(),
            arguments: args.len(),
        });
    }
    Ok(markers)
}

/// Pairs each marker with the store type of its argument.
pub(crate) fn filter_params(markers: &[&str], args: &[Value]) -> Vec<ParamSpec> {
    markers
        .iter()
        .zip(args)
        .map(|(marker, arg)| ParamSpec {
            name: (*marker).to_string(),
            store_type: arg
                .host_type()
                .map(store_type_for)
                .unwrap_or(StoreType::Variant),
        })
        .collect()
}

/// Prefixes a non-empty filter with `WHERE` unless it already has one.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(where_clause("Status = @p0"), "WHERE Status = @p0");
/// assert_eq!(where_clause("where x = 1"), "where x = 1");
/// assert_eq!(where_clause("  "), "");
/// ```
pub(crate) fn where_clause(filter: &str) -> String {
    let filter = filter.trim();
    if filter.is_empty() {
        String::new()
    } else if dialect::has_where(filter) {
        filter.to_string()
    } else {
        format!("WHERE {filter}")
    }
}

/// One field selected for writing.
#[derive(Debug, Clone)]
pub(crate) struct Written {
    pub field: &'static FieldDef,
    pub value: Value,
}

/// Collects the persisted, selected, non-null fields of an entity.
///
/// `exclude` names a field that is never written (the primary key on
/// update).
///
/// # Errors
///
/// Returns [`Error::UnknownField`] if the selection names a field the
/// entity does not declare, and [`Error::EmptyColumnList`] if nothing is
/// left to write.
pub(crate) fn written_fields<T: Entity>(
    entity: &T,
    selection: FieldSelection<'_>,
    exclude: Option<&str>,
) -> Result<Vec<Written>> {
    if let Some(unknown) = selection.names().iter().find(|n| T::field(n).is_none()) {
        return Err(Error::UnknownField {
            entity: T::NAME,
            field: (*unknown).to_string(),
        });
    }

    let written: Vec<Written> = T::fields()
        .iter()
        .filter(|f| f.is_persisted() && selection.admits(f.name))
        .filter(|f| exclude.is_none_or(|x| !f.name.eq_ignore_ascii_case(x)))
        .filter_map(|f| match entity.get(f.name) {
            Some(value) if !value.is_null() => Some(Written { field: f, value }),
            _ => None,
        })
        .collect();

    if written.is_empty() {
        return Err(Error::EmptyColumnList { entity: T::NAME });
    }
    Ok(written)
}

/// Placeholder name for the `index`th written column (`@val0`, ...).
pub(crate) fn property_placeholder(dialect: &Dialect, index: usize) -> String {
    dialect.marker(&format!("val{index}"))
}

/// Builds the column, placeholder and parameter lists for written fields.
pub(crate) fn property_parts(
    dialect: &Dialect,
    written: &[Written],
) -> (Vec<String>, Vec<String>, Vec<ParamSpec>) {
    let mut columns = Vec::with_capacity(written.len());
    let mut placeholders = Vec::with_capacity(written.len());
    let mut params = Vec::with_capacity(written.len());
    for (i, w) in written.iter().enumerate() {
        let placeholder = property_placeholder(dialect, i);
        columns.push(w.field.name.to_string());
        params.push(ParamSpec {
            name: placeholder.clone(),
            store_type: store_type_for(w.field.host_type),
        });
        placeholders.push(placeholder);
    }
    (columns, placeholders, params)
}

#[cfg(test)]
mod tests {
    use relmap_core::{CoreError, FromValue, HostType};

    use super::*;
    use crate::config::Quoting;

    #[derive(Debug, Default)]
    struct Invoice {
        invoice_id: Option<i64>,
        number: Option<String>,
        total: Option<f64>,
        notes: Option<String>,
        cached: Option<String>,
    }

    impl Entity for Invoice {
        const NAME: &'static str = "Invoice";

        fn fields() -> &'static [FieldDef] {
            const FIELDS: &[FieldDef] = &[
                FieldDef::new("InvoiceID", HostType::I64),
                FieldDef::new("Number", HostType::String),
                FieldDef::new("Total", HostType::F64),
                FieldDef::new("Notes", HostType::String).inherited(),
                FieldDef::new("Cached", HostType::String).ignored(),
            ];
            FIELDS
        }

        fn get(&self, field: &str) -> Option<Value> {
            match field {
                "InvoiceID" => Some(self.invoice_id.into()),
                "Number" => Some(self.number.clone().into()),
                "Total" => Some(self.total.into()),
                "Notes" => Some(self.notes.clone().into()),
                "Cached" => Some(self.cached.clone().into()),
                _ => None,
            }
        }

        fn set(&mut self, field: &str, value: Value) -> std::result::Result<(), CoreError> {
            match field {
                "InvoiceID" => self.invoice_id = FromValue::from_value(value)?,
                "Number" => self.number = FromValue::from_value(value)?,
                "Total" => self.total = FromValue::from_value(value)?,
                "Notes" => self.notes = FromValue::from_value(value)?,
                "Cached" => self.cached = FromValue::from_value(value)?,
                _ => return Err(Self::unknown_field(field)),
            }
            Ok(())
        }
    }

    fn dialect() -> Dialect {
        Dialect::new(Quoting::default()).unwrap()
    }

    fn names(written: &[Written]) -> Vec<&str> {
        written.iter().map(|w| w.field.name).collect()
    }

    #[test]
    fn test_filter_markers_pair_left_to_right() {
        let d = dialect();
        let args = [Value::from("Shipped"), Value::from(10_i64)];
        let markers = filter_markers(&d, "Status = @p0 AND Total > @p1", &args).unwrap();
        let params = filter_params(&markers, &args);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "@p0");
        assert_eq!(params[0].store_type, StoreType::NVarChar);
        assert_eq!(params[1].name, "@p1");
        assert_eq!(params[1].store_type, StoreType::BigInt);
    }

    #[test]
    fn test_filter_marker_count_mismatch() {
        let d = dialect();
        let err = filter_markers(&d, "a = @p0 AND b = @p1", &[Value::I64(1)]).unwrap_err();
        assert!(matches!(
            err,
            Error::ParameterCountMismatch {
                markers: 2,
                arguments: 1,
                ..
            }
        ));

        // Markers without any arguments are a mismatch too.
        assert!(filter_markers(&d, "a = @p0", &[]).is_err());
        // So are arguments without markers.
        assert!(filter_markers(&d, "a = 1", &[Value::I64(1)]).is_err());
    }

    #[test]
    fn test_null_argument_is_variant() {
        let params = filter_params(&["@p0"], &[Value::Null]);
        assert_eq!(params[0].store_type, StoreType::Variant);
    }

    #[test]
    fn test_where_clause() {
        assert_eq!(where_clause("Status = @p0"), "WHERE Status = @p0");
        assert_eq!(where_clause("WHERE Status = @p0"), "WHERE Status = @p0");
        assert_eq!(where_clause(" where x = 1 "), "where x = 1");
        assert_eq!(where_clause("Somewhere = 1"), "WHERE Somewhere = 1");
        assert_eq!(where_clause(""), "");
    }

    #[test]
    fn test_written_fields_skip_nulls_ignored_and_inherited() {
        let invoice = Invoice {
            invoice_id: None,
            number: Some("A-1".to_string()),
            total: Some(12.5),
            notes: Some("base".to_string()),
            cached: Some("skip".to_string()),
        };
        let written = written_fields(&invoice, FieldSelection::All, None).unwrap();
        assert_eq!(names(&written), vec!["Number", "Total"]);
    }

    #[test]
    fn test_written_fields_selection() {
        let invoice = Invoice {
            invoice_id: Some(4),
            number: Some("A-1".to_string()),
            total: Some(3.0),
            ..Invoice::default()
        };
        let only = written_fields(&invoice, FieldSelection::Only(&["number"]), None).unwrap();
        assert_eq!(names(&only), vec!["Number"]);

        let except =
            written_fields(&invoice, FieldSelection::Except(&["Total"]), Some("InvoiceID")).unwrap();
        assert_eq!(names(&except), vec!["Number"]);

        let err = written_fields(&invoice, FieldSelection::Only(&["Nope"]), None).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }

    #[test]
    fn test_all_null_entity_has_no_columns() {
        let err = written_fields(&Invoice::default(), FieldSelection::All, None).unwrap_err();
        assert!(matches!(err, Error::EmptyColumnList { entity: "Invoice" }));
    }

    #[test]
    fn test_property_parts_use_type_mapping() {
        let invoice = Invoice {
            number: Some("A-1".to_string()),
            total: Some(3.0),
            ..Invoice::default()
        };
        let written = written_fields(&invoice, FieldSelection::All, None).unwrap();
        let (columns, placeholders, params) = property_parts(&dialect(), &written);
        assert_eq!(columns, vec!["Number", "Total"]);
        assert_eq!(placeholders, vec!["@val0", "@val1"]);
        assert_eq!(params[0].store_type, StoreType::NVarChar);
        assert_eq!(params[1].store_type, StoreType::Float);
    }

    #[test]
    fn test_bind_normalizes_values() {
        let shape = Arc::new(QueryShape {
            text: "SELECT 1".to_string(),
            params: vec![
                ParamSpec {
                    name: "@a".to_string(),
                    store_type: StoreType::NVarChar,
                },
                ParamSpec {
                    name: "@b".to_string(),
                    store_type: StoreType::Float,
                },
            ],
            ..QueryShape::default()
        });
        let mapping = QueryMapping::bind(shape, vec![Value::from(""), Value::from("")]);
        let bound = mapping.bound_parameters();
        assert_eq!(bound[0].value, Value::from(""));
        assert_eq!(bound[1].value, Value::F64(0.0));
    }
}
