use rusqlite::types::Value as SqlValue;

use crate::types::Value;

/// Convert a single `Value` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &Value) -> SqlValue {
    match value {
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        // SQLite has no timestamp type; store the canonical text form.
        Value::Timestamp(dt) => SqlValue::Text(dt.format("%F %T%.f").to_string()),
        Value::Null => SqlValue::Null,
        Value::Json(jval) => SqlValue::Text(jval.to_string()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

pub(super) fn convert_params(params: &[Value]) -> Vec<SqlValue> {
    let mut converted = Vec::with_capacity(params.len());
    for p in params {
        converted.push(row_value_to_sqlite_value(p));
    }
    converted
}
