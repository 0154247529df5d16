use async_trait::async_trait;

use super::{InputKind, Procedure, QueryType, ResultSetOption, collapse, require_connection};
use crate::connection::ConnectionHandle;
use crate::error::VeloxError;
use crate::results::ResultSet;

/// Static SQL with no parameters.
#[derive(Debug, Clone)]
pub struct Query {
    connection: Option<ConnectionHandle>,
    sql: String,
    query_type: QueryType,
    result_option: ResultSetOption,
    results: Option<ResultSet>,
}

impl Query {
    pub fn new(connection: ConnectionHandle, sql: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            connection: Some(connection),
            sql: sql.into(),
            query_type,
            result_option: ResultSetOption::default(),
            results: None,
        }
    }

    /// A query bound later, e.g. by [`crate::Transaction::add_query`].
    pub fn unbound(sql: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            connection: None,
            sql: sql.into(),
            query_type,
            result_option: ResultSetOption::default(),
            results: None,
        }
    }

    #[must_use]
    pub fn with_result_option(mut self, option: ResultSetOption) -> Self {
        self.result_option = option;
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl Procedure for Query {
    async fn execute(&mut self) -> Result<ResultSet, VeloxError> {
        let handle = require_connection(self.connection.as_ref())?;
        let sets = handle
            .lock()
            .await
            .execute(&self.sql, &[], self.query_type)
            .await?;
        let result = collapse(sets, self.result_option)?;
        self.results = Some(result.clone());
        Ok(result)
    }

    fn results(&self) -> Result<&ResultSet, VeloxError> {
        self.results.as_ref().ok_or(VeloxError::ResultsNotAvailable)
    }

    fn clear(&mut self) {
        self.results = None;
    }

    fn query_type(&self) -> QueryType {
        self.query_type
    }

    fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    fn set_connection(&mut self, connection: ConnectionHandle) {
        self.connection = Some(connection);
    }

    fn input_kind(&self) -> InputKind {
        InputKind::None
    }
}
