//! SQLite persistence layer for notemerge.
//!
//! Provides a [`Database`] handle with WAL-mode journaling, automatic schema
//! migrations, and query helpers for documents, forks, pull requests and the
//! audit log.

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// Main database handle wrapping a SQLite connection.
///
/// The connection is opened in WAL mode with `PRAGMA foreign_keys = ON`. The
/// inner connection sits behind a `Mutex` so that `Database` is
/// `Send + Sync` and can be shared through an `Arc`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        debug!("database opened successfully with WAL mode");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run all schema migrations to bring the database up to date.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        info!("initializing database schema");
        let conn = self.conn();
        schema::run_migrations(&conn)?;
        debug!("database schema is up to date");
        Ok(())
    }

    /// Obtain a lock on the underlying connection.
    ///
    /// A poisoned mutex is recovered rather than propagating the panic.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Execute a closure inside a SQLite transaction. `Ok` commits, `Err`
    /// rolls back.
    ///
    /// The error type only needs a conversion from [`DatabaseError`], so
    /// services can abort a transaction with their own domain errors.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let result = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(result)
    }
}
