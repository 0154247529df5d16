#![cfg(feature = "sqlite")]

mod common;

use common::{TestResult, addresses, ids, open};
use tokio_util::sync::CancellationToken;
use velox_sql::prelude::*;

fn id_list(rs: &ResultSet) -> Vec<i64> {
    rs.iter()
        .filter_map(|row| row.get("id").and_then(Value::as_int).copied())
        .collect()
}

#[tokio::test]
async fn addresses_example_compiles_to_one_statement() -> TestResult {
    let conn = addresses("addresses_example").await?;
    let diff: Diff = serde_json::from_str(
        r#"{"select":[{"where":[{"city":["=","Falls City"],"state":["=","TX"]}]}]}"#,
    )?;

    let mut set = StatementSet::new(
        conn,
        "SELECT id, city, state FROM addresses WHERE <<condition>> ORDER BY id",
        QueryType::Select,
    );
    for criterion in diff.select {
        set.add_criterion(criterion)?;
    }

    let compiled = set.compile()?;
    assert_eq!(compiled.len(), 1);
    assert_eq!(
        compiled[0].sql(),
        "SELECT id, city, state FROM addresses WHERE (city = :w0_0 AND state = :w0_1) ORDER BY id"
    );
    assert_eq!(compiled[0].parameter_sets().len(), 1);

    let rows = set.execute().await?;
    assert_eq!(id_list(&rows), vec![1, 5]);
    assert_eq!(rows.columns(), ["id", "city", "state"]);
    assert_eq!(id_list(set.results()?), vec![1, 5]);
    Ok(())
}

#[tokio::test]
async fn one_statement_per_shape_not_per_row() -> TestResult {
    let conn = addresses("shape_minimal").await?;
    let criteria = vec![
        Criterion::new().with_condition("id", Condition::eq(1)),
        Criterion::new().with_condition("state", Condition::is_in(["NE"])),
        Criterion::new().with_condition("id", Condition::eq(3)),
        Criterion::new().with_condition("id", Condition::eq(4)),
        Criterion::new().with_condition("state", Condition::is_in(["OK"])),
    ];

    let mut all = StatementSet::new(
        conn.clone(),
        "SELECT id FROM addresses WHERE <<condition>> ORDER BY id",
        QueryType::Select,
    );
    for c in criteria.clone() {
        all.add_criterion(c)?;
    }
    let compiled = all.compile()?;
    assert_eq!(compiled.len(), 2);
    assert_eq!(compiled[0].parameter_sets().len(), 3);
    assert_eq!(compiled[1].parameter_sets().len(), 2);

    let rows = all.execute().await?;
    assert_eq!(id_list(&rows), vec![1, 3, 4, 2, 4]);

    let mut distinct = StatementSet::new(
        conn,
        "SELECT id FROM addresses WHERE <<condition>> ORDER BY id",
        QueryType::Select,
    )
    .with_result_option(ResultSetOption::Union);
    for c in criteria {
        distinct.add_criterion(c)?;
    }
    assert_eq!(id_list(&distinct.execute().await?), vec![1, 3, 4, 2]);
    Ok(())
}

#[tokio::test]
async fn or_groups_between_and_not_in() -> TestResult {
    let conn = addresses("or_groups").await?;
    let criterion = Criterion::new()
        .with_condition("id", Condition::between(1, 3))
        .with_condition("state", Condition::not_in(["NE"]))
        .or()
        .with_condition("city", Condition::like("Om%"));
    let mut set = StatementSet::new(
        conn,
        "SELECT id FROM addresses WHERE <<condition>> ORDER BY id",
        QueryType::Select,
    )
    .with_criterion(criterion);
    assert_eq!(id_list(&set.execute().await?), vec![1, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn malformed_operands_fail_before_any_round_trip() -> TestResult {
    // Any round trip on this connection would fail with `Cancelled` instead.
    let cancel = CancellationToken::new();
    cancel.cancel();
    let conn = ConnectionHandle::open_with(
        &ConnectionConfig::sqlite(common::unique_db_path("no_round_trip")),
        EngineOptions::default().with_cancellation(cancel),
    )
    .await?;

    let cases = [
        (r#"{"where":[{"id":["BETWEEN", 1]}]}"#, 2003),
        (r#"{"where":[{"id":["IN", 3]}]}"#, 2004),
        (r#"{"where":[{"id":["NOT IN", []]}]}"#, 2004),
        (r#"{"where":[{"id":["~", 3]}]}"#, 2002),
        (r#"{"where":[{"id":["=", 1, 2]}]}"#, 2005),
        (r#"{"where":[{"id or 1=1":["=", 1]}]}"#, 2006),
    ];
    for (json, code) in cases {
        let criterion: Criterion = serde_json::from_str(json)?;
        let mut set = StatementSet::new(
            conn.clone(),
            "SELECT * FROM addresses WHERE <<condition>>",
            QueryType::Select,
        )
        .with_criterion(criterion);
        let err = set.execute().await.unwrap_err();
        assert_eq!(err.code(), code, "{json}: {err}");
        assert!(set.results().is_err());
    }

    let mut empty = StatementSet::new(conn, "SELECT * FROM addresses", QueryType::Select);
    assert_eq!(empty.execute().await.unwrap_err().code(), 2001);
    Ok(())
}

#[tokio::test]
async fn writes_through_templates() -> TestResult {
    let conn = addresses("statement_set_writes").await?;

    let mut insert = StatementSet::new(
        conn.clone(),
        "INSERT INTO addresses (<<columns>>) VALUES (<<values>>)",
        QueryType::Insert,
    )
    .with_criterion(Criterion::new().with_value("city", "Lincoln").with_value("state", "NE"))
    .with_criterion(Criterion::new().with_value("city", "Dallas").with_value("state", "TX"))
    .with_criterion(Criterion::new().with_value("city", "Waco"));
    assert_eq!(insert.compile()?.len(), 2);
    let inserted = insert.execute().await?;
    assert_eq!(inserted.rows_affected, 3);
    assert_eq!(inserted.affected_keys, vec![Value::Int(6), Value::Int(7), Value::Int(8)]);

    let mut update = StatementSet::new(
        conn.clone(),
        "UPDATE addresses SET <<values>> WHERE <<condition>>",
        QueryType::Update,
    )
    .with_criterion(
        Criterion::new()
            .with_value("state", "KS")
            .with_condition("city", Condition::eq("Falls City")),
    );
    assert_eq!(update.execute().await?.rows_affected, 3);

    let mut delete = StatementSet::new(
        conn.clone(),
        "DELETE FROM addresses WHERE <<condition>>",
        QueryType::Delete,
    )
    .with_criterion(Criterion::new().with_condition("state", Condition::eq("KS")))
    .with_criterion(Criterion::new().with_condition("id", Condition::compare(">=", 7)));
    assert_eq!(delete.execute().await?.rows_affected, 5);

    assert_eq!(
        ids(&conn, "SELECT id FROM addresses ORDER BY id").await?,
        vec![3, 4, 6]
    );

    let missing = open("template_mismatch").await?;
    let mut bad = StatementSet::new(missing, "DELETE FROM addresses", QueryType::Delete)
        .with_criterion(Criterion::new().with_value("city", "x"));
    assert_eq!(bad.execute().await.unwrap_err().code(), 2008);
    Ok(())
}
