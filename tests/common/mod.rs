#![allow(dead_code)]

use tempfile::tempdir;
use velox_sql::prelude::*;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

pub async fn open(prefix: &str) -> Result<ConnectionHandle, VeloxError> {
    init_tracing();
    let config = ConnectionConfig::sqlite(unique_db_path(prefix))
        .with_busy_timeout(std::time::Duration::from_secs(2));
    ConnectionHandle::open(&config).await
}

/// `addresses(id, city, state)` with five rows, three of them in Falls City.
pub async fn addresses(prefix: &str) -> Result<ConnectionHandle, VeloxError> {
    let conn = open(prefix).await?;
    conn.execute_batch(
        "CREATE TABLE addresses (
             id INTEGER PRIMARY KEY,
             city TEXT NOT NULL,
             state TEXT NOT NULL DEFAULT 'TX'
         );
         INSERT INTO addresses (id, city, state) VALUES
             (1, 'Falls City', 'TX'),
             (2, 'Falls City', 'NE'),
             (3, 'Austin', 'TX'),
             (4, 'Omaha', 'NE'),
             (5, 'Falls City', 'TX');",
    )
    .await?;
    Ok(conn)
}

pub async fn ids(conn: &ConnectionHandle, sql: &str) -> Result<Vec<i64>, VeloxError> {
    let mut query = Query::new(conn.clone(), sql, QueryType::Select);
    let rows = query.execute().await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get_by_index(0).and_then(Value::as_int).copied())
        .collect())
}
