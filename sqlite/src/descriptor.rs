//! Model Descriptor Resolver.
//!
//! Resolves where an entity lives: table, schema, primary key and column
//! list. Overrides declared on the [`Entity`] win; anything missing is
//! discovered from SQLite's catalog (`pragma_table_list`,
//! `pragma_table_info`). Results are cached per entity type by
//! [`MetadataCache`](crate::MetadataCache) for the process lifetime, with
//! no refresh path: schemas are assumed stable while the process runs.

use std::any::TypeId;

use relmap_core::{Entity, StoreType, Value};
use tracing::info;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::executor::Command;
use crate::mapping::BoundParameter;

/// Lists the schemas owning a table or view of the given name.
const SCHEMA_QUERY: &str = "SELECT DISTINCT schema FROM pragma_table_list \
     WHERE name = @table COLLATE NOCASE AND type IN ('table', 'view')";

/// Lists the columns of a table in declaration order.
const COLUMN_QUERY: &str =
    "SELECT name, type, pk FROM pragma_table_info(@table, @schema) ORDER BY cid";

/// Resolved metadata about an entity's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub entity_type: TypeId,
    pub entity_name: &'static str,
    pub table_name: String,
    pub schema_name: String,
    pub primary_key: String,
    /// Bare column names in catalog order.
    pub columns: Vec<String>,
}

impl ModelDescriptor {
    /// `schema.table`, quoted.
    pub fn table_fully_qualified(&self, dialect: &Dialect) -> String {
        dialect.qualify(&self.schema_name, &self.table_name)
    }

    /// `alias.primary_key`, quoted; the alias is the table name.
    pub fn primary_key_fully_qualified(&self, dialect: &Dialect) -> String {
        dialect.qualify(&self.table_name, &self.primary_key)
    }

    /// Every column qualified with the table alias, comma separated.
    pub fn columns_fully_qualified(&self, dialect: &Dialect) -> String {
        self.columns
            .iter()
            .map(|c| dialect.qualify(&self.table_name, c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns the declared column matching `name`, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

/// A column as reported by the catalog.
#[derive(Debug, Clone)]
struct CatalogColumn {
    name: String,
    store_type: StoreType,
    primary_key: bool,
}

/// Builds the descriptor for `T`, querying the catalog for whatever the
/// entity does not override.
///
/// `command` opens one command per catalog query on the caller's
/// connection source.
pub(crate) fn resolve<'c, T, F>(command: F) -> Result<ModelDescriptor>
where
    T: Entity,
    F: Fn(&str, Vec<BoundParameter>) -> Result<Command<'c>>,
{
    let table_name = T::table_name().unwrap_or(T::NAME).to_string();

    let schema_name = match T::schema_name() {
        Some(schema) => schema.to_string(),
        None => discover_schema::<T, _>(&command, &table_name)?,
    };

    let (columns, catalog_key) = match T::columns() {
        Some(columns) => (
            columns.iter().map(|c| (*c).to_string()).collect::<Vec<String>>(),
            None,
        ),
        None => {
            let catalog = discover_columns::<T, _>(&command, &table_name, &schema_name)?;
            let keys: Vec<&CatalogColumn> = catalog.iter().filter(|c| c.primary_key).collect();
            // Only a single integer key column qualifies as the surrogate key.
            let key = match keys.as_slice() {
                [only] if matches!(only.store_type, StoreType::BigInt | StoreType::Int) => {
                    Some(only.name.clone())
                }
                _ => None,
            };
            (catalog.into_iter().map(|c| c.name).collect(), key)
        }
    };

    let primary_key = T::primary_key()
        .map(str::to_string)
        .or(catalog_key)
        .unwrap_or_else(|| format!("{}ID", T::NAME));

    info!(
        entity = T::NAME,
        table = %table_name,
        schema = %schema_name,
        primary_key = %primary_key,
        columns = columns.len(),
        "Resolved model descriptor"
    );

    Ok(ModelDescriptor {
        entity_type: TypeId::of::<T>(),
        entity_name: T::NAME,
        table_name,
        schema_name,
        primary_key,
        columns,
    })
}

fn discover_schema<'c, T, F>(command: &F, table: &str) -> Result<String>
where
    T: Entity,
    F: Fn(&str, Vec<BoundParameter>) -> Result<Command<'c>>,
{
    let params = vec![BoundParameter::inferred("@table", Value::from(table))];
    let table_result = command(SCHEMA_QUERY, params)?.table()?;

    match table_result.rows.as_slice() {
        [row] => match row.first() {
            Some(Value::Text(schema)) if !schema.trim().is_empty() => Ok(schema.clone()),
            _ => Err(Error::SchemaNotFound {
                entity: T::NAME,
                table: table.to_string(),
            }),
        },
        _ => Err(Error::SchemaNotFound {
            entity: T::NAME,
            table: table.to_string(),
        }),
    }
}

fn discover_columns<'c, T, F>(command: &F, table: &str, schema: &str) -> Result<Vec<CatalogColumn>>
where
    T: Entity,
    F: Fn(&str, Vec<BoundParameter>) -> Result<Command<'c>>,
{
    let params = vec![
        BoundParameter::inferred("@table", Value::from(table)),
        BoundParameter::inferred("@schema", Value::from(schema)),
    ];
    let result = command(COLUMN_QUERY, params)?.table()?;

    let columns: Vec<CatalogColumn> = result
        .rows
        .into_iter()
        .filter_map(|row| {
            let mut values = row.into_iter();
            let name = match values.next()? {
                Value::Text(name) => name,
                _ => return None,
            };
            let store_type = match values.next() {
                Some(Value::Text(declared)) => StoreType::from_declared(&declared),
                _ => StoreType::Variant,
            };
            // `pk` is the 1-based position within the key, 0 outside it.
            let primary_key = values.next().and_then(|v| v.as_i64()).is_some_and(|pk| pk > 0);
            Some(CatalogColumn {
                name,
                store_type,
                primary_key,
            })
        })
        .collect();

    if columns.is_empty() {
        return Err(Error::ColumnDiscovery {
            entity: T::NAME,
            table: table.to_string(),
            schema: schema.to_string(),
        });
    }

    Ok(columns)
}
