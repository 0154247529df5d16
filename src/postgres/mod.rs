// PostgreSQL backend
//
// - mod: connecting, batch execution and server-side cancellation
// - params: `ToSql` for middleware values
// - query: result extraction and building
// - executor: batched statement execution

mod executor;
mod params;
mod query;

use std::fmt;

use tokio_postgres::{CancelToken, Client, NoTls};
use tracing::warn;

use crate::error::VeloxError;

pub use query::{build_result_set_from_statement, postgres_extract_value};

/// A live Postgres client plus the token needed to cancel its running query.
pub struct PostgresConnection {
    client: Client,
    cancel: CancelToken,
}

impl PostgresConnection {
    /// Connect with a key/value or URL connection string.
    ///
    /// The connection future is driven on its own task; failures there are logged.
    ///
    /// # Errors
    /// Returns `VeloxError::PostgresError` if the server cannot be reached or rejects the login.
    pub async fn connect(url: &str) -> Result<Self, VeloxError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection task ended with error");
            }
        });
        let cancel = client.cancel_token();
        Ok(Self { client, cancel })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Ask the server to cancel whatever this session is running.
    pub(crate) fn interrupt(&self) {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = token.cancel_query(NoTls).await {
                warn!(error = %e, "postgres cancel request failed");
            }
        });
    }

    /// Run one or more `;`-separated statements without parameters.
    ///
    /// # Errors
    /// Returns `VeloxError::PostgresError` if any statement fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), VeloxError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}
