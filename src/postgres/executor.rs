use crate::error::VeloxError;
use crate::procedure::QueryType;
use crate::results::ResultSet;
use crate::types::Value;

use super::PostgresConnection;
use super::params::as_refs;
use super::query::build_result_set_from_statement;

impl PostgresConnection {
    /// Prepare `sql` once and run it for every positional parameter set.
    ///
    /// Statements with result columns are queried, others report rows affected. For INSERTs
    /// with `RETURNING`, the first returned column becomes the affected keys.
    ///
    /// # Errors
    /// Returns `VeloxError::PostgresError` on the first failing preparation or execution.
    pub(crate) async fn execute_sets(
        &self,
        sql: &str,
        sets: &[Vec<Value>],
        query_type: QueryType,
    ) -> Result<Vec<ResultSet>, VeloxError> {
        let stmt = self.client().prepare(sql).await?;
        let returns_rows = !stmt.columns().is_empty();

        let mut results = Vec::with_capacity(sets.len());
        for set in sets {
            let refs = as_refs(set);
            let result_set = if returns_rows {
                let rows = self.client().query(&stmt, &refs).await?;
                let mut rs = build_result_set_from_statement(&stmt, &rows)?;
                if query_type == QueryType::Insert {
                    rs.affected_keys = rs
                        .iter()
                        .filter_map(|row| row.get_by_index(0).cloned())
                        .collect();
                }
                rs
            } else {
                let affected = self.client().execute(&stmt, &refs).await?;
                let mut rs = ResultSet::default();
                rs.rows_affected = usize::try_from(affected).map_err(|e| {
                    VeloxError::ExecutionError(format!("Invalid rows affected count: {e}"))
                })?;
                rs
            };
            results.push(result_set);
        }
        Ok(results)
    }
}
