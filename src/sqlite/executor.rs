use std::sync::Arc;

use crate::error::VeloxError;
use crate::procedure::QueryType;
use crate::results::{Columns, ResultSet};
use crate::types::Value;

use super::params::convert_params;
use super::query::build_result_set;
use super::{SqliteConnection, run_blocking};

impl SqliteConnection {
    /// Execute one statement once per positional parameter set, all on a single cached
    /// prepared statement inside one blocking hop.
    ///
    /// Statements that produce columns (SELECT, `RETURNING`) yield rows; others report rows
    /// affected. INSERTs record the new row ids (or the first `RETURNING` column) as affected
    /// keys.
    ///
    /// # Errors
    /// Returns `VeloxError::SqliteError` on the first failing preparation or execution.
    pub(crate) async fn execute_sets(
        &self,
        sql: String,
        sets: Vec<Vec<Value>>,
        query_type: QueryType,
    ) -> Result<Vec<ResultSet>, VeloxError> {
        let converted: Vec<_> = sets.iter().map(|set| convert_params(set)).collect();
        run_blocking(self.conn_handle(), move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let columns = Arc::new(Columns::new(
                stmt.column_names().into_iter().map(str::to_owned).collect(),
            ));
            let mut results = Vec::with_capacity(converted.len());
            for params in &converted {
                let result_set = if columns.is_empty() {
                    let affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
                    let mut rs = ResultSet::default();
                    rs.rows_affected = affected;
                    if query_type == QueryType::Insert && affected > 0 {
                        rs.affected_keys.push(Value::Int(conn.last_insert_rowid()));
                    }
                    rs
                } else {
                    let mut rs = build_result_set(&mut stmt, params, &columns)?;
                    if query_type == QueryType::Insert {
                        rs.affected_keys = rs
                            .iter()
                            .filter_map(|row| row.get_by_index(0).cloned())
                            .collect();
                    }
                    rs
                };
                results.push(result_set);
            }
            Ok(results)
        })
        .await
    }
}
