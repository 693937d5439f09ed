//! CRUD facade.
//!
//! [`Crud`] is implemented by [`Orm`] (one connection per call) and by
//! [`Session`](crate::Session) (one connection for the session). Every
//! operation follows the same path: resolve the entity's descriptor, look
//! up or build the query shape, bind the call's values, run the command,
//! materialize the result.
//!
//! Checks that need no store (marker count, field selection, primary key
//! presence) run before the command's connection is used.

use std::any::TypeId;
use std::sync::Arc;

use relmap_core::{Entity, FromRecord, StoreType, Table, Value};

use crate::cache::Operation;
use crate::descriptor::{self, ModelDescriptor};
use crate::error::{Error, Result};
use crate::executor::Command;
use crate::mapping::{
    self, BoundParameter, FieldSelection, ParamSpec, QueryMapping, QueryShape,
};
use crate::orm::Orm;
use crate::statement::{ID_MARKER, LIMIT_MARKER, OFFSET_MARKER, Statement, VALUE_MARKER};

/// Statement families built from a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Count,
    Find,
    Delete,
}

impl FilterKind {
    fn operation(self) -> Operation {
        match self {
            Self::Count => Operation::Count,
            Self::Find => Operation::Find,
            Self::Delete => Operation::Delete,
        }
    }
}

/// Statement families built from an entity's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
}

/// Single-table CRUD over [`Entity`] types.
pub trait Crud {
    /// The engine that owns configuration and caches.
    fn orm(&self) -> &Orm;

    /// Creates a command on this source's connection.
    fn command(&self, text: &str, parameters: Vec<BoundParameter>) -> Result<Command<'_>>;

    /// Returns the cached descriptor for `T`, resolving it on first use.
    fn descriptor<T: Entity>(&self) -> Result<Arc<ModelDescriptor>> {
        self.orm().cache().descriptor(TypeId::of::<T>(), || {
            descriptor::resolve::<T, _>(|text, params| self.command(text, params))
        })
    }

    /// Builds the mapping for a filter-clause statement.
    ///
    /// The returned text carries a leading `WHERE` whenever the filter is
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParameterCountMismatch`] before any store access
    /// when the filter's markers and `args` differ in number.
    fn filter_mapping<T: Entity>(
        &self,
        kind: FilterKind,
        filter: &str,
        args: &[Value],
    ) -> Result<QueryMapping> {
        let orm = self.orm();
        let markers = mapping::filter_markers(orm.dialect(), filter, args)?;
        let desc = self.descriptor::<T>()?;

        let key = orm.query_key::<T>(kind.operation(), filter, args, Vec::new());
        let shape = orm.cache().shape(key, || {
            let clause = mapping::where_clause(filter);
            let statement = match kind {
                FilterKind::Count => Statement::Count { filter: &clause },
                FilterKind::Find => Statement::Find { filter: &clause },
                FilterKind::Delete => Statement::Delete { filter: &clause },
            };
            QueryShape {
                text: statement.render(&desc, orm.dialect()),
                columns: Vec::new(),
                placeholders: markers.iter().map(|m| (*m).to_string()).collect(),
                params: mapping::filter_params(&markers, args),
            }
        });
        Ok(QueryMapping::bind(shape, args.to_vec()))
    }

    /// Builds the mapping for an insert or update of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyColumnList`] when no selected field is set,
    /// [`Error::UnknownField`] for a selection naming an undeclared field,
    /// and, for updates, [`Error::PrimaryKeyUnset`] when the key is not a
    /// positive integer.
    fn property_mapping<T: Entity>(
        &self,
        kind: WriteKind,
        entity: &T,
        fields: FieldSelection<'_>,
    ) -> Result<QueryMapping> {
        write_mapping(self, kind, entity, fields).map(|(mapping, _)| mapping)
    }

    /// Returns `true` if a row with primary key `id` exists.
    fn exists<T: Entity>(&self, id: i64) -> Result<bool> {
        let desc = self.descriptor::<T>()?;
        let orm = self.orm();
        let key = orm.query_key::<T>(Operation::Exists, "", &[], Vec::new());
        let shape = orm.cache().shape(key, || {
            let statement = Statement::Exists {
                column: &desc.primary_key,
                marker: ID_MARKER,
            };
            key_shape(orm, statement.render(&desc, orm.dialect()))
        });
        let count = run(self, QueryMapping::bind(shape, vec![Value::I64(id)]))?.scalar_int()?;
        Ok(count > 0)
    }

    /// Returns `true` if the row identified by `entity`'s key exists.
    fn exists_of<T: Entity>(&self, entity: &T) -> Result<bool> {
        let (_, id) = resolve_key(self, entity)?;
        self.exists::<T>(id)
    }

    /// Returns `true` if any row has `field` equal to `value`.
    fn exists_by<T: Entity>(&self, field: &str, value: impl Into<Value>) -> Result<bool> {
        let def = T::field(field).ok_or_else(|| Error::UnknownField {
            entity: T::NAME,
            field: field.to_string(),
        })?;
        let value = value.into();
        let desc = self.descriptor::<T>()?;
        let orm = self.orm();

        let args = std::slice::from_ref(&value);
        let key = orm.query_key::<T>(Operation::ExistsBy, "", args, vec![def.name]);
        let shape = orm.cache().shape(key, || {
            let column = desc.column(def.name).unwrap_or(def.name);
            let statement = Statement::Exists {
                column,
                marker: VALUE_MARKER,
            };
            let marker = orm.dialect().marker(VALUE_MARKER);
            QueryShape {
                text: statement.render(&desc, orm.dialect()),
                columns: Vec::new(),
                placeholders: vec![marker.clone()],
                params: mapping::filter_params(&[marker.as_str()], args),
            }
        });
        let count = run(self, QueryMapping::bind(shape, vec![value]))?.scalar_int()?;
        Ok(count > 0)
    }

    /// Counts the rows matching `filter`; an empty filter counts all rows.
    fn count<T: Entity>(&self, filter: &str, args: &[Value]) -> Result<i64> {
        let mapping = self.filter_mapping::<T>(FilterKind::Count, filter, args)?;
        run(self, mapping)?.scalar_int()
    }

    /// Reads the row with primary key `id`.
    fn find_first<T: Entity>(&self, id: i64) -> Result<Option<T>> {
        let desc = self.descriptor::<T>()?;
        let orm = self.orm();
        let key = orm.query_key::<T>(Operation::FindFirst, "", &[], Vec::new());
        let shape = orm.cache().shape(key, || {
            key_shape(orm, Statement::FindFirst.render(&desc, orm.dialect()))
        });
        run(self, QueryMapping::bind(shape, vec![Value::I64(id)]))?
            .query_one(orm.cache().layouts())
    }

    /// Re-reads the row identified by `entity`'s key.
    fn find_first_of<T: Entity>(&self, entity: &T) -> Result<Option<T>> {
        let (_, id) = resolve_key(self, entity)?;
        self.find_first::<T>(id)
    }

    /// Reads the first row matching `filter`.
    fn find_one<T: Entity>(&self, filter: &str, args: &[Value]) -> Result<Option<T>> {
        let mapping = self.filter_mapping::<T>(FilterKind::Find, filter, args)?;
        run(self, mapping)?.query_one(self.orm().cache().layouts())
    }

    /// Reads every row matching `filter`.
    fn find<T: Entity>(&self, filter: &str, args: &[Value]) -> Result<Vec<T>> {
        let mapping = self.filter_mapping::<T>(FilterKind::Find, filter, args)?;
        run(self, mapping)?.query_all(self.orm().cache().layouts())
    }

    /// Reads one page of the rows matching `filter`.
    ///
    /// Pages are 1-based; page 0 is treated as page 1. An empty `order_by`
    /// orders by the primary key.
    fn paged_find<T: Entity>(
        &self,
        filter: &str,
        args: &[Value],
        order_by: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<T>> {
        let orm = self.orm();
        let markers = mapping::filter_markers(orm.dialect(), filter, args)?;
        let desc = self.descriptor::<T>()?;

        let operation = Operation::PagedFind {
            order_by: order_by.trim().to_string(),
        };
        let key = orm.query_key::<T>(operation, filter, args, Vec::new());
        let shape = orm.cache().shape(key, || {
            let clause = mapping::where_clause(filter);
            let order_by = match order_by.trim() {
                "" => orm.dialect().quote(&desc.primary_key),
                given => given.to_string(),
            };
            let statement = Statement::PagedFind {
                filter: &clause,
                order_by: &order_by,
            };
            let mut placeholders: Vec<String> = markers.iter().map(|m| (*m).to_string()).collect();
            let mut params = mapping::filter_params(&markers, args);
            for name in [LIMIT_MARKER, OFFSET_MARKER] {
                let marker = orm.dialect().marker(name);
                params.push(ParamSpec {
                    name: marker.clone(),
                    store_type: StoreType::BigInt,
                });
                placeholders.push(marker);
            }
            QueryShape {
                text: statement.render(&desc, orm.dialect()),
                columns: Vec::new(),
                placeholders,
                params,
            }
        });

        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        let mut values = args.to_vec();
        values.push(Value::I64(i64::from(page_size)));
        values.push(Value::I64(offset));
        run(self, QueryMapping::bind(shape, values))?.query_all(orm.cache().layouts())
    }

    /// Inserts the selected, non-null fields of `entity`.
    ///
    /// Returns the row id the store generated.
    fn insert<T: Entity>(&self, entity: &T, fields: FieldSelection<'_>) -> Result<i64> {
        let (mapping, _) = write_mapping(self, WriteKind::Insert, entity, fields)?;
        run(self, mapping)?.insert()
    }

    /// Updates the selected, non-null fields of the row identified by
    /// `entity`'s key. The key itself is never assigned.
    ///
    /// Returns the key when a row changed, `-1` otherwise.
    fn update<T: Entity>(&self, entity: &T, fields: FieldSelection<'_>) -> Result<i64> {
        let (mapping, id) = write_mapping(self, WriteKind::Update, entity, fields)?;
        let changed = run(self, mapping)?.non_query()?;
        Ok(match id {
            Some(id) if changed > 0 => id,
            _ => -1,
        })
    }

    /// Deletes the row with primary key `id`; returns the affected count.
    fn delete<T: Entity>(&self, id: i64) -> Result<usize> {
        let desc = self.descriptor::<T>()?;
        let orm = self.orm();
        let key = orm.query_key::<T>(Operation::DeleteById, "", &[], Vec::new());
        let shape = orm.cache().shape(key, || {
            key_shape(orm, Statement::DeleteById.render(&desc, orm.dialect()))
        });
        run(self, QueryMapping::bind(shape, vec![Value::I64(id)]))?.non_query()
    }

    /// Deletes every row matching `filter`; returns the affected count.
    fn delete_where<T: Entity>(&self, filter: &str, args: &[Value]) -> Result<usize> {
        let mapping = self.filter_mapping::<T>(FilterKind::Delete, filter, args)?;
        run(self, mapping)?.non_query()
    }

    /// Runs raw SQL and materializes every row into `R`.
    fn query<R: FromRecord>(&self, sql: &str, args: &[Value]) -> Result<Vec<R>> {
        let mapping = raw_mapping(self.orm(), sql, args)?;
        run(self, mapping)?.query_all(self.orm().cache().layouts())
    }

    /// Runs raw SQL and returns its integer scalar, or `-1`.
    fn execute(&self, sql: &str, args: &[Value]) -> Result<i64> {
        let mapping = raw_mapping(self.orm(), sql, args)?;
        run(self, mapping)?.scalar_int()
    }

    /// Runs raw SQL and returns the untyped result.
    fn query_table(&self, sql: &str, args: &[Value]) -> Result<Table> {
        let mapping = raw_mapping(self.orm(), sql, args)?;
        run(self, mapping)?.table()
    }
}

fn run<C: Crud + ?Sized>(crud: &C, mapping: QueryMapping) -> Result<Command<'_>> {
    let (text, parameters) = mapping.into_parts();
    crud.command(&text, parameters)
}

/// Builds an insert or update mapping. Updates also return the key the
/// statement targets.
fn write_mapping<C: Crud + ?Sized, T: Entity>(
    crud: &C,
    kind: WriteKind,
    entity: &T,
    fields: FieldSelection<'_>,
) -> Result<(QueryMapping, Option<i64>)> {
    let orm = crud.orm();

    let (desc, written, id) = match kind {
        WriteKind::Insert => {
            let written = mapping::written_fields(entity, fields, None)?;
            (crud.descriptor::<T>()?, written, None)
        }
        WriteKind::Update => {
            let (desc, id) = resolve_key(crud, entity)?;
            let written = mapping::written_fields(entity, fields, Some(&desc.primary_key))?;
            (desc, written, Some(id))
        }
    };

    let names = written.iter().map(|w| w.field.name).collect();
    let operation = match kind {
        WriteKind::Insert => Operation::Insert,
        WriteKind::Update => Operation::Update,
    };
    let key = orm.query_key::<T>(operation, "", &[], names);
    let shape = orm.cache().shape(key, || {
        let (columns, placeholders, mut params) = mapping::property_parts(orm.dialect(), &written);
        let statement = match kind {
            WriteKind::Insert => Statement::Insert {
                columns: &columns,
                placeholders: &placeholders,
            },
            WriteKind::Update => {
                params.push(key_param(orm));
                Statement::Update {
                    columns: &columns,
                    placeholders: &placeholders,
                }
            }
        };
        QueryShape {
            text: statement.render(&desc, orm.dialect()),
            columns,
            placeholders,
            params,
        }
    });

    let mut values: Vec<Value> = written.into_iter().map(|w| w.value).collect();
    values.extend(id.map(Value::I64));
    Ok((QueryMapping::bind(shape, values), id))
}

/// Resolves `entity`'s descriptor and reads its primary key.
///
/// A key column declared on the entity is checked before the descriptor
/// is resolved, so an unset key never reaches the catalog.
fn resolve_key<C: Crud + ?Sized, T: Entity>(
    crud: &C,
    entity: &T,
) -> Result<(Arc<ModelDescriptor>, i64)> {
    let declared = T::primary_key()
        .map(|column| entity_key(entity, column))
        .transpose()?;
    let desc = crud.descriptor::<T>()?;
    let id = match declared {
        Some(id) => id,
        None => entity_key(entity, &desc.primary_key)?,
    };
    Ok((desc, id))
}

/// Reads `entity`'s primary key, which must be a positive integer.
fn entity_key<T: Entity>(entity: &T, column: &str) -> Result<i64> {
    let unset = || Error::PrimaryKeyUnset {
        entity: T::NAME,
        column: column.to_string(),
    };
    let field = T::field(column).ok_or_else(unset)?;
    match entity.get(field.name).and_then(|v| v.as_i64()) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(unset()),
    }
}

fn key_param(orm: &Orm) -> ParamSpec {
    ParamSpec {
        name: orm.dialect().marker(ID_MARKER),
        store_type: StoreType::BigInt,
    }
}

/// Shape of a statement whose only parameter is the primary key.
fn key_shape(orm: &Orm, text: String) -> QueryShape {
    let param = key_param(orm);
    QueryShape {
        text,
        columns: Vec::new(),
        placeholders: vec![param.name.clone()],
        params: vec![param],
    }
}

fn raw_mapping(orm: &Orm, sql: &str, args: &[Value]) -> Result<QueryMapping> {
    let markers = mapping::filter_markers(orm.dialect(), sql, args)?;
    let key = orm.query_key::<()>(Operation::Raw, sql, args, Vec::new());
    let shape = orm.cache().shape(key, || QueryShape {
        text: sql.to_string(),
        columns: Vec::new(),
        placeholders: markers.iter().map(|m| (*m).to_string()).collect(),
        params: mapping::filter_params(&markers, args),
    });
    Ok(QueryMapping::bind(shape, args.to_vec()))
}
