use async_trait::async_trait;

use super::{InputKind, Procedure, QueryType, ResultSetOption, collapse, require_connection};
use crate::connection::ConnectionHandle;
use crate::error::VeloxError;
use crate::results::ResultSet;
use crate::translation::compile_named;
use crate::types::{ParameterSet, Value};

/// Named-placeholder SQL executed once per queued parameter set.
///
/// All sets go to the backend in one hop on one prepared statement. With no sets queued the
/// statement runs once without parameters.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    connection: Option<ConnectionHandle>,
    sql: String,
    query_type: QueryType,
    result_option: ResultSetOption,
    parameter_sets: Vec<ParameterSet>,
    results: Option<ResultSet>,
    result_array: Option<Vec<ResultSet>>,
}

impl PreparedStatement {
    pub fn new(connection: ConnectionHandle, sql: impl Into<String>, query_type: QueryType) -> Self {
        let mut stmt = Self::unbound(sql, query_type);
        stmt.connection = Some(connection);
        stmt
    }

    /// A statement bound later, e.g. by [`crate::Transaction::add_query`].
    pub fn unbound(sql: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            connection: None,
            sql: sql.into(),
            query_type,
            result_option: ResultSetOption::default(),
            parameter_sets: Vec::new(),
            results: None,
            result_array: None,
        }
    }

    #[must_use]
    pub fn with_result_option(mut self, option: ResultSetOption) -> Self {
        self.result_option = option;
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameter_sets.push(parameters);
        self
    }

    pub(crate) fn with_connection(mut self, connection: Option<ConnectionHandle>) -> Self {
        self.connection = connection;
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn parameter_sets(&self) -> &[ParameterSet] {
        &self.parameter_sets
    }

    #[must_use]
    pub fn result_option(&self) -> ResultSetOption {
        self.result_option
    }

    /// Per-set results from the last run, kept regardless of the result option.
    #[must_use]
    pub fn result_array(&self) -> Option<&[ResultSet]> {
        self.result_array.as_deref()
    }

    /// Run every queued set and return one `ResultSet` per set.
    ///
    /// # Errors
    /// Binding or driver errors.
    pub async fn execute_array(&mut self) -> Result<&[ResultSet], VeloxError> {
        let sets = self.run().await?;
        Ok(self.result_array.insert(sets).as_slice())
    }

    pub(crate) async fn run(&self) -> Result<Vec<ResultSet>, VeloxError> {
        let handle = require_connection(self.connection.as_ref())?;
        handle
            .lock()
            .await
            .execute(&self.sql, &self.parameter_sets, self.query_type)
            .await
    }
}

#[async_trait]
impl Procedure for PreparedStatement {
    async fn execute(&mut self) -> Result<ResultSet, VeloxError> {
        let sets = self.run().await?;
        self.result_array = Some(sets.clone());
        let result = collapse(sets, self.result_option)?;
        self.results = Some(result.clone());
        Ok(result)
    }

    fn results(&self) -> Result<&ResultSet, VeloxError> {
        self.results.as_ref().ok_or(VeloxError::ResultsNotAvailable)
    }

    fn clear(&mut self) {
        self.parameter_sets.clear();
        self.results = None;
        self.result_array = None;
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
        InputKind::ParameterSets
    }

    /// Bind every queued set against the placeholders, reporting `MissingParameter` early.
    fn prepare(&self) -> Result<(), VeloxError> {
        let Some(handle) = self.connection.as_ref() else {
            return Ok(());
        };
        let named = compile_named(&self.sql, handle.engine().placeholder_style());
        if self.parameter_sets.is_empty() {
            named.bind(&ParameterSet::new())?;
        }
        for set in &self.parameter_sets {
            named.bind(set)?;
        }
        Ok(())
    }

    fn add_parameters(&mut self, parameters: ParameterSet) -> Result<(), VeloxError> {
        self.parameter_sets.push(parameters);
        Ok(())
    }

    fn bind_all(&mut self, name: &str, value: Value) -> Result<(), VeloxError> {
        if self.parameter_sets.is_empty() {
            self.parameter_sets.push(ParameterSet::new());
        }
        for set in &mut self.parameter_sets {
            set.insert(name.to_owned(), value.clone());
        }
        Ok(())
    }
}
