//! Command Executor.
//!
//! A [`Command`] is one statement plus its bound parameters, tied to the
//! connection it runs on. Outside a session every command owns a freshly
//! opened connection that is closed as soon as the command finishes;
//! inside a [`Session`](crate::Session) it borrows the session's connection
//! and leaves it open.
//!
//! Every statement runs under the configured command timeout: a progress
//! handler interrupts it once the deadline passes, and the interruption
//! surfaces as [`Error::StoreExecution`].
//!
//! Store errors are translated exactly once, here: the configured
//! validation code becomes [`Error::StoreValidation`], everything else
//! [`Error::StoreExecution`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use relmap_core::{DATETIME_FORMAT, FromRecord, LayoutCache, Record, Table, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::mapping::BoundParameter;

/// Virtual machine steps between two deadline checks.
const PROGRESS_STEPS: i32 = 1_000;

/// Opens and configures a connection for one call or one session.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if no connection string is set, or a
/// translated store error if opening fails.
pub(crate) fn open(config: &StoreConfig) -> Result<Connection> {
    let path = config.connection_string()?;
    let translate = |e| Error::from_store(e, config.validation_error_code);

    let conn = Connection::open_with_flags(path, OpenFlags::default()).map_err(translate)?;
    conn.busy_timeout(config.command_timeout())
        .map_err(translate)?;
    if config.foreign_keys {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(translate)?;
    }
    debug!(path, "Opened connection");
    Ok(conn)
}

/// Connection a command runs on.
pub(crate) enum Handle<'c> {
    /// Opened for this command; closed when it finishes.
    Owned(Connection),
    /// A session's connection; left open.
    Borrowed(&'c Connection),
}

/// One executable statement.
pub struct Command<'c> {
    handle: Handle<'c>,
    text: String,
    parameters: Vec<BoundParameter>,
    validation_code: i32,
    timeout: Duration,
}

impl<'c> Command<'c> {
    pub(crate) fn new(
        handle: Handle<'c>,
        text: impl Into<String>,
        parameters: Vec<BoundParameter>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            handle,
            text: text.into(),
            parameters,
            validation_code: config.validation_error_code,
            timeout: config.command_timeout(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[BoundParameter] {
        &self.parameters
    }

    /// Runs the statement and returns the first column of the first row.
    ///
    /// Returns `Value::Null` when there is no row.
    pub fn scalar(self) -> Result<Value> {
        let result = self.records(Some(1)).map(|(_, records)| {
            records
                .into_iter()
                .next()
                .and_then(|r| r.into_values().into_iter().next())
                .unwrap_or_default()
        });
        self.finish(result)
    }

    /// Runs the statement and reads the scalar result as an integer.
    ///
    /// Returns `-1` when the value is absent or not numeric.
    pub fn scalar_int(self) -> Result<i64> {
        Ok(self.scalar()?.as_i64().unwrap_or(-1))
    }

    /// Materializes the first row, if any.
    pub fn query_one<R: FromRecord>(self, layouts: &LayoutCache) -> Result<Option<R>> {
        let result = self.records(Some(1)).and_then(|(_, records)| {
            records
                .first()
                .map(|r| R::from_record(r, layouts))
                .transpose()
                .map_err(Error::from)
        });
        self.finish(result)
    }

    /// Materializes every row, one fresh target per row.
    pub fn query_all<R: FromRecord>(self, layouts: &LayoutCache) -> Result<Vec<R>> {
        let result = self
            .records(None)
            .and_then(|(_, records)| R::from_records(&records, layouts).map_err(Error::from));
        self.finish(result)
    }

    /// Returns the raw tabular result.
    pub fn table(self) -> Result<Table> {
        let result = self
            .records(None)
            .map(|(columns, records)| Table::from_records(&columns, records));
        self.finish(result)
    }

    /// Runs a statement that returns no rows; returns the affected row count.
    pub fn non_query(self) -> Result<usize> {
        let result = self.execute();
        self.finish(result)
    }

    /// Runs an insert and returns the row id it generated.
    pub fn insert(self) -> Result<i64> {
        let result = self
            .execute()
            .map(|_| self.connection().last_insert_rowid());
        self.finish(result)
    }

    fn connection(&self) -> &Connection {
        match &self.handle {
            Handle::Owned(conn) => conn,
            Handle::Borrowed(conn) => conn,
        }
    }

    fn translate(&self, err: rusqlite::Error) -> Error {
        if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
            warn!(query = %self.text, timeout = ?self.timeout, "Command exceeded its timeout");
        }
        let err = Error::from_store(err, self.validation_code);
        if err.is_validation() {
            warn!(query = %self.text, error = %err, "Store rejected command");
        }
        err
    }

    fn prepare(&self) -> Result<rusqlite::Statement<'_>> {
        debug!(
            query = %self.text,
            parameters = %trace(&self.parameters),
            "Executing command"
        );
        let conn = self.connection();
        self.arm_deadline(conn);
        let mut stmt = conn.prepare(&self.text).map_err(|e| self.translate(e))?;

        for p in &self.parameters {
            let index = stmt
                .parameter_index(&p.name)
                .map_err(|e| self.translate(e))?
                .ok_or_else(|| self.unbound(&p.name))?;
            stmt.raw_bind_parameter(index, to_sql(&p.value))
                .map_err(|e| self.translate(e))?;
        }

        // A repeated marker shares one index, so compare distinct names.
        let bound: HashSet<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        if stmt.parameter_count() != bound.len() {
            let missing = (1..=stmt.parameter_count())
                .find_map(|i| match stmt.parameter_name(i) {
                    Some(name) if bound.contains(name) => None,
                    Some(name) => Some(name.to_string()),
                    None => Some(format!("?{i}")),
                })
                .unwrap_or_default();
            return Err(self.unbound(&missing));
        }
        Ok(stmt)
    }

    /// Installs a progress handler that interrupts the statement once the
    /// command timeout has elapsed. A zero timeout leaves execution
    /// unbounded.
    fn arm_deadline(&self, conn: &Connection) {
        let deadline = if self.timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(self.timeout)
        };
        match deadline {
            Some(deadline) => {
                conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
            }
            None => conn.progress_handler(0, None::<fn() -> bool>),
        }
    }

    fn unbound(&self, name: &str) -> Error {
        Error::UnboundParameter {
            name: name.to_string(),
            query: self.text.clone(),
        }
    }

    fn execute(&self) -> Result<usize> {
        let mut stmt = self.prepare()?;
        stmt.raw_execute().map_err(|e| self.translate(e))
    }

    fn records(&self, limit: Option<usize>) -> Result<(Arc<[String]>, Vec<Record>)> {
        let mut stmt = self.prepare()?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();

        let mut records = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(|e| self.translate(e))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| self.translate(e))?;
                values.push(decode(value));
            }
            records.push(Record::new(Arc::clone(&columns), values));
            if limit.is_some_and(|l| records.len() >= l) {
                break;
            }
        }
        Ok((columns, records))
    }

    /// Closes an owned connection, then returns `result`.
    fn finish<T>(self, result: Result<T>) -> Result<T> {
        let validation_code = self.validation_code;
        let closed = match self.handle {
            Handle::Owned(conn) => conn
                .close()
                .map_err(|(_, e)| Error::from_store(e, validation_code)),
            Handle::Borrowed(conn) => {
                // The session's next statement must not inherit this deadline.
                conn.progress_handler(0, None::<fn() -> bool>);
                Ok(())
            }
        };
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl std::fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("parameters", &self.parameters)
            .field(
                "owned",
                &matches!(self.handle, Handle::Owned(_)),
            )
            .finish()
    }
}

/// Renders `name=value (TYPE)` pairs for the command log.
fn trace(parameters: &[BoundParameter]) -> String {
    parameters
        .iter()
        .map(|p| format!("{}={} ({})", p.name, p.value, p.store_type))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::U8(v) => SqlValue::Integer(i64::from(*v)),
        Value::I16(v) => SqlValue::Integer(i64::from(*v)),
        Value::I32(v) => SqlValue::Integer(i64::from(*v)),
        Value::I64(v) => SqlValue::Integer(*v),
        Value::F64(v) => SqlValue::Real(*v),
        Value::Char(c) => SqlValue::Text(c.to_string()),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::DateTime(dt) => SqlValue::Text(format_datetime(dt)),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn decode(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::I64(i),
        ValueRef::Real(f) => Value::F64(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use relmap_core::StoreType;

    use super::*;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Item (ItemID INTEGER PRIMARY KEY, Name TEXT, Price REAL);
             INSERT INTO Item (Name, Price) VALUES ('bolt', 0.25), ('nut', 0.1);",
        )
        .unwrap();
        conn
    }

    fn command<'c>(conn: &'c Connection, sql: &str, params: Vec<BoundParameter>) -> Command<'c> {
        Command::new(Handle::Borrowed(conn), sql, params, &StoreConfig::new(":memory:"))
    }

    const SLOW_QUERY: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000) \
         SELECT COUNT(*) FROM c";

    #[test]
    fn test_scalar_int_and_sentinel() {
        let conn = memory();
        assert_eq!(command(&conn, "SELECT COUNT(*) FROM Item", vec![]).scalar_int().unwrap(), 2);
        assert_eq!(
            command(&conn, "SELECT Name FROM Item WHERE ItemID = 1", vec![])
                .scalar_int()
                .unwrap(),
            -1
        );
        assert_eq!(
            command(&conn, "SELECT ItemID FROM Item WHERE 0", vec![])
                .scalar_int()
                .unwrap(),
            -1
        );
    }

    #[test]
    fn test_named_parameters_bind_by_marker() {
        let conn = memory();
        let params = vec![BoundParameter::new("@p0", StoreType::NVarChar, Value::from("nut"))];
        let table = command(&conn, "SELECT ItemID, Price FROM Item WHERE Name = @p0", params)
            .table()
            .unwrap();
        assert_eq!(table.columns, vec!["ItemID", "Price"]);
        assert_eq!(table.rows, vec![vec![Value::I64(2), Value::F64(0.1)]]);
    }

    #[test]
    fn test_insert_returns_rowid_and_non_query_counts() {
        let conn = memory();
        let params = vec![BoundParameter::inferred("@val0", Value::from("washer"))];
        let id = command(&conn, "INSERT INTO Item (Name) VALUES (@val0)", params)
            .insert()
            .unwrap();
        assert_eq!(id, 3);

        let changed = command(&conn, "UPDATE Item SET Price = 1", vec![])
            .non_query()
            .unwrap();
        assert_eq!(changed, 3);
    }

    #[test]
    fn test_scalar_targets() {
        let conn = memory();
        let names: Vec<String> = command(&conn, "SELECT Name FROM Item ORDER BY ItemID", vec![])
            .query_all(&LayoutCache::new())
            .unwrap();
        assert_eq!(names, vec!["bolt", "nut"]);

        let none: Option<i64> = command(&conn, "SELECT ItemID FROM Item WHERE 0", vec![])
            .query_one(&LayoutCache::new())
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_syntax_error_is_execution_error() {
        let conn = memory();
        let err = command(&conn, "SELEC nothing", vec![]).scalar().unwrap_err();
        assert!(matches!(err, Error::StoreExecution(_)));
    }

    #[test]
    fn test_values_cross_the_boundary() {
        let conn = memory();
        let dt = NaiveDateTime::parse_from_str("2024-03-01 08:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let params = vec![
            BoundParameter::inferred("@a", Value::Bool(true)),
            BoundParameter::inferred("@b", Value::DateTime(dt)),
            BoundParameter::inferred("@c", Value::Char('x')),
        ];
        let table = command(&conn, "SELECT @a, @b, @c", params).table().unwrap();
        assert_eq!(
            table.rows[0],
            vec![
                Value::I64(1),
                Value::from("2024-03-01 08:30:00"),
                Value::from("x"),
            ]
        );
    }

    #[test]
    fn test_parameter_missing_from_statement_is_rejected() {
        let conn = memory();
        // `@p_0` scans as the marker `@p`, which the statement does not declare.
        let params = vec![BoundParameter::inferred("@p", Value::from("x"))];
        let err = command(&conn, "SELECT @p_0 AS v", params).table().unwrap_err();
        assert!(matches!(err, Error::UnboundParameter { ref name, .. } if name == "@p"));
    }

    #[test]
    fn test_statement_parameter_without_value_is_rejected() {
        let conn = memory();
        let params = vec![BoundParameter::inferred("@a", Value::from(1_i64))];
        let err = command(&conn, "SELECT @a, @b", params).scalar().unwrap_err();
        assert!(matches!(err, Error::UnboundParameter { ref name, .. } if name == "@b"));
    }

    #[test]
    fn test_repeated_marker_binds_once() {
        let conn = memory();
        let params = vec![
            BoundParameter::inferred("@p0", Value::from("nut")),
            BoundParameter::inferred("@p0", Value::from("nut")),
        ];
        let count = command(&conn, "SELECT COUNT(*) FROM Item WHERE Name = @p0 OR Name || '' = @p0", params)
            .scalar_int()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_timeout_interrupts_long_statement() {
        let conn = memory();
        let config = StoreConfig::new(":memory:").with_command_timeout_ms(50);
        let started = Instant::now();
        let err = Command::new(Handle::Borrowed(&conn), SLOW_QUERY, vec![], &config)
            .scalar()
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            Error::StoreExecution(e) => {
                assert_eq!(e.sqlite_error_code(), Some(ErrorCode::OperationInterrupted));
            }
            other => panic!("expected an interrupted command, got {other:?}"),
        }

        // The deadline is cleared once the command finishes.
        let count = Command::new(
            Handle::Borrowed(&conn),
            "SELECT COUNT(*) FROM Item",
            vec![],
            &config,
        )
        .scalar_int()
        .unwrap();
        assert_eq!(count, 2);
    }
}
