//! Explicit transaction scope.
//!
//! A [`Session`] keeps one connection open across several CRUD calls so
//! they can share a transaction. Its state machine is
//! `Idle → Open → {Committed, RolledBack} → Closed`; `commit` and
//! `rollback` outside an open transaction do nothing.
//!
//! A session is not shared across threads: it is `Send` but not `Sync`.
//!
//! # Example
//!
//! ```no_run
//! use relmap_sqlite::{Crud, FieldSelection, Orm, StoreConfig};
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
//! let mut session = orm.session().unwrap();
//!
//! session.begin().unwrap();
//! session.insert(&Order::default(), FieldSelection::All).unwrap();
//! session.save("after_order").unwrap();
//! session.execute("DELETE FROM Audit", &[]).unwrap();
//! session.rollback(Some("after_order")).unwrap();
//! session.commit().unwrap();
//! ```

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::crud::Crud;
use crate::dialect::validate_identifier;
use crate::error::{Error, Result};
use crate::executor::{self, Command, Handle};
use crate::mapping::BoundParameter;
use crate::orm::Orm;

/// Lifecycle of a session's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Open,
    Committed,
    RolledBack,
    Closed,
}

/// A connection held open for a sequence of calls.
pub struct Session<'o> {
    orm: &'o Orm,
    conn: Option<Connection>,
    state: TransactionState,
}

impl<'o> Session<'o> {
    pub(crate) fn open(orm: &'o Orm) -> Result<Self> {
        let conn = executor::open(orm.config())?;
        Ok(Self {
            orm,
            conn: Some(conn),
            state: TransactionState::Idle,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn in_transaction(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// Starts a transaction. Does nothing if one is already open.
    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction() {
            debug!("Transaction already open");
            return Ok(());
        }
        self.batch("BEGIN")?;
        self.state = TransactionState::Open;
        Ok(())
    }

    /// Commits the open transaction, if any.
    pub fn commit(&mut self) -> Result<()> {
        if !self.in_transaction() {
            return Ok(());
        }
        self.batch("COMMIT")?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Rolls back the open transaction, if any.
    ///
    /// With a savepoint name, only the work after that savepoint is undone
    /// and the transaction stays open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for a malformed savepoint name.
    pub fn rollback(&mut self, savepoint: Option<&str>) -> Result<()> {
        if !self.in_transaction() {
            return Ok(());
        }
        match savepoint {
            Some(name) => {
                validate_identifier(name)?;
                self.batch(&format!("ROLLBACK TO SAVEPOINT {name}"))
            }
            None => {
                self.batch("ROLLBACK")?;
                self.state = TransactionState::RolledBack;
                Ok(())
            }
        }
    }

    /// Establishes a named savepoint inside the open transaction.
    ///
    /// Does nothing outside a transaction.
    pub fn save(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        if !self.in_transaction() {
            debug!(savepoint = name, "No open transaction, savepoint skipped");
            return Ok(());
        }
        self.batch(&format!("SAVEPOINT {name}"))
    }

    /// Rolls back any open transaction and closes the connection.
    ///
    /// Further calls on this session fail with [`Error::SessionClosed`].
    pub fn close(&mut self) -> Result<()> {
        self.rollback(None)?;
        if let Some(conn) = self.conn.take() {
            let code = self.orm.config().validation_error_code;
            conn.close()
                .map_err(|(_, e)| Error::from_store(e, code))?;
        }
        self.state = TransactionState::Closed;
        Ok(())
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::SessionClosed)
    }

    fn batch(&self, sql: &str) -> Result<()> {
        debug!(statement = sql, "Transaction control");
        let code = self.orm.config().validation_error_code;
        self.connection()?
            .execute_batch(sql)
            .map_err(|e| Error::from_store(e, code))
    }
}

impl Crud for Session<'_> {
    fn orm(&self) -> &Orm {
        self.orm
    }

    fn command(&self, text: &str, parameters: Vec<BoundParameter>) -> Result<Command<'_>> {
        Ok(Command::new(
            Handle::Borrowed(self.connection()?),
            text,
            parameters,
            self.orm.config(),
        ))
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.in_transaction() {
            if let Err(e) = self.rollback(None) {
                warn!(error = %e, "Failed to roll back abandoned transaction");
            }
        }
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("open", &self.conn.is_some())
            .finish()
    }
}
