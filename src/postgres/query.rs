use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use tokio_postgres::Statement;

use crate::error::VeloxError;
use crate::results::{Columns, ResultSet};
use crate::types::Value;

/// Extracts a `Value` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `VeloxError::PostgresError` if the column cannot be retrieved.
pub fn postgres_extract_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value, VeloxError> {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            val.map_or(Value::Null, |v| Value::Int(i64::from(v)))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            val.map_or(Value::Null, |v| Value::Int(i64::from(v)))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Int)
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            val.map_or(Value::Null, |v| Value::Float(f64::from(v)))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Float)
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Bool)
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Timestamp)
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = row.try_get(idx)?;
            val.map_or(Value::Null, |v| Value::Timestamp(v.naive_utc()))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            val.map_or(Value::Null, |d| Value::Timestamp(d.and_time(chrono::NaiveTime::MIN)))
        }
        "json" | "jsonb" => {
            let val: Option<JsonValue> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Json)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Blob)
        }
        // text, varchar, bpchar, name and anything else with a text representation
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            val.map_or(Value::Null, Value::Text)
        }
    };
    Ok(value)
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, VeloxError> {
    let columns = Arc::new(Columns::new(
        stmt.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
    ));
    let column_count = columns.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(columns);

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
