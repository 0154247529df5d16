// SQLite backend
//
// One rusqlite connection shared behind a mutex and driven from blocking tasks:
// - mod: opening, batch execution and interruption
// - params: conversion from middleware values to rusqlite values
// - query: result extraction and building
// - executor: batched statement execution

mod executor;
mod params;
mod query;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::VeloxError;

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

pub use params::row_value_to_sqlite_value;
pub use query::build_result_set;

/// A live `SQLite` handle.
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    interrupt: rusqlite::InterruptHandle,
}

impl SqliteConnection {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns `VeloxError::SqliteError` if the file cannot be opened or the busy timeout
    /// cannot be applied.
    pub async fn open(path: &str, busy_timeout: Option<Duration>) -> Result<Self, VeloxError> {
        let path = path.to_owned();
        let conn = tokio::task::spawn_blocking(move || -> Result<_, VeloxError> {
            let conn = rusqlite::Connection::open(&path)?;
            if let Some(timeout) = busy_timeout {
                conn.busy_timeout(timeout)?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| VeloxError::ExecutionError(format!("sqlite open join error: {e}")))??;
        let interrupt = conn.get_interrupt_handle();
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    pub(crate) fn conn_handle(&self) -> SharedSqliteConnection {
        Arc::clone(&self.conn)
    }

    /// Abort whatever statement is running on this connection.
    pub(crate) fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Run one or more `;`-separated statements without parameters.
    ///
    /// # Errors
    /// Returns `VeloxError::SqliteError` if any statement fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), VeloxError> {
        let sql_owned = sql.to_owned();
        run_blocking(self.conn_handle(), move |guard| {
            guard
                .execute_batch(&sql_owned)
                .map_err(VeloxError::SqliteError)
        })
        .await
    }

    /// Run synchronous work against the raw `rusqlite` connection on a blocking thread.
    ///
    /// # Errors
    /// Propagates the closure's error, or a join error if the blocking task panicked.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, VeloxError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, VeloxError> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(self.conn_handle(), func).await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, VeloxError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, VeloxError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| VeloxError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
