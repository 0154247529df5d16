use std::sync::Arc;

use rusqlite::Statement;
use rusqlite::types::Value as SqlValue;

use crate::error::VeloxError;
use crate::results::{Columns, ResultSet};
use crate::types::Value;

/// Extract a `Value` from a `SQLite` row.
///
/// # Errors
///
/// Returns `VeloxError` if the value cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<Value, VeloxError> {
    let value: SqlValue = row.get(idx).map_err(VeloxError::SqliteError)?;
    match value {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(i) => Ok(Value::Int(i)),
        SqlValue::Real(f) => Ok(Value::Float(f)),
        SqlValue::Text(s) => Ok(Value::Text(s)),
        SqlValue::Blob(b) => Ok(Value::Blob(b)),
    }
}

/// Run a row-returning statement once and materialize its rows.
///
/// # Errors
/// Returns `VeloxError::SqliteError` if query execution or row extraction fails.
pub fn build_result_set(
    stmt: &mut Statement,
    params: &[SqlValue],
    columns: &Arc<Columns>,
) -> Result<ResultSet, VeloxError> {
    let mut rows_iter = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::clone(columns));

    let col_count = columns.len();
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
