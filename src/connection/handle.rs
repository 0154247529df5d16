use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use super::Connection;
use crate::config::{ConnectionConfig, EngineOptions};
use crate::error::VeloxError;
use crate::types::Engine;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared reference to a [`Connection`].
///
/// Clones point at the same connection and share its id, which transactions use to track
/// which connections they have touched.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    engine: Engine,
    inner: Arc<Mutex<Connection>>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            engine: connection.engine(),
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Open a connection and wrap it.
    ///
    /// # Errors
    /// See [`Connection::open`].
    pub async fn open(config: &ConnectionConfig) -> Result<Self, VeloxError> {
        Ok(Self::new(Connection::open(config).await?))
    }

    /// # Errors
    /// See [`Connection::open_with`].
    pub async fn open_with(
        config: &ConnectionConfig,
        options: EngineOptions,
    ) -> Result<Self, VeloxError> {
        Ok(Self::new(Connection::open_with(config, options).await?))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Exclusive access to the connection for the duration of the guard.
    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.inner.lock().await
    }

    /// Shortcut for [`Connection::execute_batch`].
    ///
    /// # Errors
    /// See [`Connection::execute_batch`].
    pub async fn execute_batch(&self, sql: &str) -> Result<(), VeloxError> {
        self.lock().await.execute_batch(sql).await
    }
}

impl From<Connection> for ConnectionHandle {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
