mod handle;

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

pub use handle::ConnectionHandle;

use crate::config::{ConnectionConfig, EngineOptions};
use crate::error::VeloxError;
use crate::procedure::QueryType;
use crate::results::ResultSet;
use crate::translation::compile_named;
use crate::types::{Engine, ParameterSet, Value};

#[cfg(feature = "postgres")]
use crate::postgres::PostgresConnection;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteConnection;

/// Driver-specific handle, one variant per compiled-in engine.
enum Backend {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnection),
    #[cfg(feature = "postgres")]
    Postgres(PostgresConnection),
}

impl Backend {
    async fn execute_sets(
        &self,
        sql: String,
        sets: Vec<Vec<Value>>,
        query_type: QueryType,
    ) -> Result<Vec<ResultSet>, VeloxError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.execute_sets(sql, sets, query_type).await,
            #[cfg(feature = "postgres")]
            Backend::Postgres(conn) => conn.execute_sets(&sql, &sets, query_type).await,
        }
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), VeloxError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.execute_batch(sql).await,
            #[cfg(feature = "postgres")]
            Backend::Postgres(conn) => conn.execute_batch(sql).await,
        }
    }

    fn interrupt(&self) {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.interrupt(),
            #[cfg(feature = "postgres")]
            Backend::Postgres(conn) => conn.interrupt(),
        }
    }
}

/// One live database handle for one engine and credential set.
///
/// Not pooled and not meant to be shared across concurrent requests; wrap it in a
/// [`ConnectionHandle`] to hand it to procedures.
pub struct Connection {
    backend: Backend,
    engine: Engine,
    depth: usize,
    statement_timeout: Option<Duration>,
    options: EngineOptions,
}

impl Connection {
    /// Open a connection with default engine options.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid, or the driver error if the
    /// database cannot be reached.
    pub async fn open(config: &ConnectionConfig) -> Result<Self, VeloxError> {
        Self::open_with(config, EngineOptions::default()).await
    }

    /// Open a connection with explicit engine options.
    ///
    /// A statement timeout in `options` takes precedence over the one in `config`.
    ///
    /// # Errors
    /// Same as [`Connection::open`].
    pub async fn open_with(
        config: &ConnectionConfig,
        options: EngineOptions,
    ) -> Result<Self, VeloxError> {
        config.validate()?;
        let backend = match config.engine {
            Engine::Sqlite => {
                #[cfg(feature = "sqlite")]
                {
                    let path = config.path.as_deref().unwrap_or_default();
                    Backend::Sqlite(SqliteConnection::open(path, config.busy_timeout()).await?)
                }
                #[cfg(not(feature = "sqlite"))]
                {
                    return Err(VeloxError::EngineUnavailable(config.engine.to_string()));
                }
            }
            Engine::Postgres => {
                #[cfg(feature = "postgres")]
                {
                    let url = config.url.as_deref().unwrap_or_default();
                    Backend::Postgres(PostgresConnection::connect(url).await?)
                }
                #[cfg(not(feature = "postgres"))]
                {
                    return Err(VeloxError::EngineUnavailable(config.engine.to_string()));
                }
            }
        };
        debug!(engine = %config.engine, "connection opened");
        Ok(Self {
            backend,
            engine: config.engine,
            depth: 0,
            statement_timeout: options.statement_timeout.or(config.statement_timeout()),
            options,
        })
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Number of nested `begin_transaction` calls not yet committed.
    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Execute `sql` once per parameter set, returning one `ResultSet` per set.
    ///
    /// `sql` uses `:name` placeholders; every set is bound before anything is sent. With no
    /// sets the statement runs once with no parameters.
    ///
    /// # Errors
    /// `MissingParameter` for an unbound placeholder, `Cancelled`/`Timeout` when the round trip
    /// is interrupted, otherwise the driver error.
    pub async fn execute(
        &self,
        sql: &str,
        parameter_sets: &[ParameterSet],
        query_type: QueryType,
    ) -> Result<Vec<ResultSet>, VeloxError> {
        let named = compile_named(sql, self.engine.placeholder_style());
        let bound = if parameter_sets.is_empty() {
            vec![named.bind(&ParameterSet::new())?]
        } else {
            parameter_sets
                .iter()
                .map(|set| named.bind(set))
                .collect::<Result<Vec<_>, _>>()?
        };
        debug!(
            engine = %self.engine,
            sets = bound.len(),
            sql = named.sql(),
            "executing statement"
        );
        let sql = named.into_sql();
        self.guarded(self.backend.execute_sets(sql, bound, query_type))
            .await
    }

    /// Run parameterless `;`-separated SQL, typically DDL.
    ///
    /// # Errors
    /// Driver error, or `Cancelled`/`Timeout`.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), VeloxError> {
        debug!(engine = %self.engine, sql, "executing batch");
        self.guarded(self.backend.execute_batch(sql)).await
    }

    /// Enter a transaction. Only the outermost call issues `BEGIN`.
    ///
    /// # Errors
    /// Driver error, or `Cancelled`/`Timeout`.
    pub async fn begin_transaction(&mut self) -> Result<(), VeloxError> {
        if self.depth == 0 {
            self.guarded(self.backend.execute_batch("BEGIN")).await?;
            debug!(engine = %self.engine, "transaction started");
        }
        self.depth += 1;
        Ok(())
    }

    /// Leave one transaction level. Only the outermost call issues `COMMIT`.
    ///
    /// Commit ignores the cancellation token so an already-decided outcome is not lost.
    ///
    /// # Errors
    /// `ExecutionError` when no transaction is open, otherwise the driver error. The depth is
    /// left unchanged on failure so the caller can still roll back.
    pub async fn commit(&mut self) -> Result<(), VeloxError> {
        match self.depth {
            0 => Err(VeloxError::ExecutionError(
                "commit without an open transaction".into(),
            )),
            1 => {
                self.backend.execute_batch("COMMIT").await?;
                self.depth = 0;
                info!(engine = %self.engine, "transaction committed");
                Ok(())
            }
            _ => {
                self.depth -= 1;
                Ok(())
            }
        }
    }

    /// Roll back the whole transaction regardless of nesting and reset the depth.
    ///
    /// A no-op when no transaction is open.
    ///
    /// # Errors
    /// Driver error from `ROLLBACK`; the depth is reset either way.
    pub async fn rollback(&mut self) -> Result<(), VeloxError> {
        if self.depth == 0 {
            return Ok(());
        }
        self.depth = 0;
        self.backend.execute_batch("ROLLBACK").await?;
        info!(engine = %self.engine, "transaction rolled back");
        Ok(())
    }

    /// Abort whatever statement the driver is running for this connection.
    pub(crate) fn interrupt(&self) {
        debug!(engine = %self.engine, "interrupting in-flight statement");
        self.backend.interrupt();
    }

    /// Await `fut` unless the cancellation token fires or the statement timeout elapses first,
    /// in which case the backend is interrupted.
    async fn guarded<T, F>(&self, fut: F) -> Result<T, VeloxError>
    where
        F: Future<Output = Result<T, VeloxError>>,
    {
        let cancel = &self.options.cancel;
        let outcome = match self.statement_timeout {
            Some(limit) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(VeloxError::Cancelled),
                res = tokio::time::timeout(limit, fut) => {
                    res.unwrap_or_else(|_| Err(VeloxError::Timeout(limit)))
                }
            },
            None => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(VeloxError::Cancelled),
                res = fut => res,
            },
        };
        if matches!(outcome, Err(VeloxError::Cancelled | VeloxError::Timeout(_))) {
            self.interrupt();
        }
        outcome
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine)
            .field("depth", &self.depth)
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}
