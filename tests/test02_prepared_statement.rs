#![cfg(feature = "sqlite")]

mod common;

use common::{TestResult, addresses, ids};
use velox_sql::prelude::*;

fn by_state(conn: &ConnectionHandle) -> PreparedStatement {
    PreparedStatement::new(
        conn.clone(),
        "SELECT id, city FROM addresses WHERE state = :state ORDER BY id",
        QueryType::Select,
    )
    .with_parameters(params! { "state" => "TX" })
    .with_parameters(params! { "state" => "TX" })
    .with_parameters(params! { "state" => "NE" })
}

#[tokio::test]
async fn union_all_concatenates_and_union_deduplicates() -> TestResult {
    let conn = addresses("prepared_union").await?;

    let mut all = by_state(&conn);
    let rows = all.execute().await?;
    assert_eq!(rows.len(), 3 + 3 + 2);
    assert_eq!(rows.columns(), ["id", "city"]);

    let mut distinct = by_state(&conn).with_result_option(ResultSetOption::Union);
    assert_eq!(distinct.execute().await?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn array_mode_keeps_sets_apart() -> TestResult {
    let conn = addresses("prepared_array").await?;
    let mut stmt = by_state(&conn).with_result_option(ResultSetOption::Array);

    let err = stmt.execute().await.unwrap_err();
    assert!(matches!(err, VeloxError::MultipleResultSets));
    assert_eq!(err.code(), 5001);
    assert_eq!(err.to_string(), "multiple result sets returned, check resultSetOption");
    assert_eq!(stmt.result_array().map(<[ResultSet]>::len), Some(3));

    let sets = stmt.execute_array().await?;
    let sizes: Vec<usize> = sets.iter().map(ResultSet::len).collect();
    assert_eq!(sizes, vec![3, 3, 2]);

    let mut single = PreparedStatement::new(
        conn,
        "SELECT id FROM addresses WHERE id = :id",
        QueryType::Select,
    )
    .with_result_option(ResultSetOption::Array)
    .with_parameters(params! { "id" => 4 });
    assert_eq!(single.execute().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn none_and_fields_only() -> TestResult {
    let conn = addresses("prepared_none").await?;

    let mut counts = by_state(&conn).with_result_option(ResultSetOption::None);
    let rows = counts.execute().await?;
    assert!(rows.is_empty());
    assert!(rows.columns().is_empty());
    assert_eq!(rows.rows_affected, 8);

    let mut fields = Query::new(conn, "SELECT * FROM addresses", QueryType::Select)
        .with_result_option(ResultSetOption::FieldsOnly);
    let rows = fields.execute().await?;
    assert!(rows.is_empty());
    assert_eq!(rows.columns(), ["id", "city", "state"]);
    Ok(())
}

#[tokio::test]
async fn results_require_execute_and_clear_resets() -> TestResult {
    let conn = addresses("prepared_results").await?;
    let mut stmt = by_state(&conn);
    assert_eq!(stmt.results().unwrap_err().code(), 5002);

    stmt.execute().await?;
    assert_eq!(stmt.results()?.len(), 8);

    stmt.clear();
    assert!(stmt.parameter_sets().is_empty());
    assert!(stmt.results().is_err());
    Ok(())
}

#[tokio::test]
async fn missing_parameter_fails_before_executing_any_set() -> TestResult {
    let conn = addresses("prepared_missing").await?;
    let mut insert = PreparedStatement::new(
        conn.clone(),
        "INSERT INTO addresses (city, state) VALUES (:city, :state)",
        QueryType::Insert,
    )
    .with_parameters(params! { "city" => "Tulsa", "state" => "OK" })
    .with_parameters(params! { "city" => "Norman" });

    let err = insert.execute().await.unwrap_err();
    assert!(matches!(err, VeloxError::MissingParameter(ref name) if name == "state"));
    assert_eq!(ids(&conn, "SELECT id FROM addresses").await?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn inserts_report_affected_keys() -> TestResult {
    let conn = addresses("prepared_keys").await?;

    let mut insert = PreparedStatement::new(
        conn.clone(),
        "INSERT INTO addresses (city, state) VALUES (:city, :state)",
        QueryType::Insert,
    )
    .with_parameters(params! { "city" => "Tulsa", "state" => "OK" })
    .with_parameters(params! { "city" => "Norman", "state" => "OK" });
    let result = insert.execute().await?;
    assert_eq!(result.rows_affected, 2);
    assert_eq!(result.affected_keys, vec![Value::Int(6), Value::Int(7)]);

    let mut returning = PreparedStatement::new(
        conn,
        "INSERT INTO addresses (city) VALUES (:city) RETURNING id, state",
        QueryType::Insert,
    );
    returning.bind_all("city", Value::from("Enid"))?;
    let result = returning.execute().await?;
    assert_eq!(result.affected_keys, vec![Value::Int(8)]);
    assert_eq!(result.get(0).and_then(|r| r.get("state")), Some(&Value::from("TX")));
    Ok(())
}

#[tokio::test]
async fn wrong_input_kind_is_rejected() -> TestResult {
    let conn = addresses("prepared_input_kind").await?;
    let mut query = Query::new(conn.clone(), "SELECT 1", QueryType::Select);
    assert_eq!(query.input_kind(), InputKind::None);
    assert_eq!(query.add_parameters(params! { "a" => 1 }).unwrap_err().code(), 2009);

    let mut stmt = PreparedStatement::new(conn, "SELECT :a", QueryType::Select);
    assert_eq!(stmt.add_criterion(Criterion::new()).unwrap_err().code(), 2009);
    Ok(())
}
