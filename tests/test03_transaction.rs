#![cfg(feature = "sqlite")]

mod common;

use std::time::{Duration, Instant};

use common::{TestResult, ids, open, unique_db_path};
use tokio_util::sync::CancellationToken;
use velox_sql::prelude::*;

async fn orders_and_audit(prefix: &str) -> Result<(ConnectionHandle, ConnectionHandle), VeloxError> {
    let orders = open(&format!("{prefix}_orders")).await?;
    orders
        .execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT NOT NULL)")
        .await?;
    let audit = open(&format!("{prefix}_audit")).await?;
    audit
        .execute_batch(
            "CREATE TABLE audit (id INTEGER PRIMARY KEY, order_id INTEGER NOT NULL, note TEXT)",
        )
        .await?;
    Ok((orders, audit))
}

fn insert_order(conn: &ConnectionHandle, item: &str) -> PreparedStatement {
    PreparedStatement::new(
        conn.clone(),
        "INSERT INTO orders (item) VALUES (:item)",
        QueryType::Insert,
    )
    .with_parameters(params! { "item" => item })
}

#[tokio::test]
async fn failing_middle_step_rolls_back_both_connections() -> TestResult {
    let (orders, audit) = orders_and_audit("atomic").await?;

    let mut tx = Transaction::new();
    tx.add_query(insert_order(&orders, "widget"), None);
    tx.add_query(
        PreparedStatement::unbound(
            "INSERT INTO audit (order_id, note) VALUES (:order_id, :note)",
            QueryType::Insert,
        )
        .with_parameters(params! { "order_id" => Value::Null, "note" => "violates NOT NULL" }),
        Some(audit.clone()),
    );
    tx.add_query(insert_order(&orders, "gadget"), None);

    let err = tx.execute().await.unwrap_err();
    match &err {
        VeloxError::TransactionAborted {
            step,
            source,
            rollback_failures,
        } => {
            assert_eq!(*step, 1);
            assert_eq!(source.code(), 3001);
            assert!(rollback_failures.is_empty());
        }
        other => panic!("expected TransactionAborted, got {other:?}"),
    }
    assert_eq!(err.code(), 4001);
    assert!(tx.is_finished());
    assert!(tx.results(0).is_some());
    assert!(tx.results(2).is_none());

    assert!(ids(&orders, "SELECT id FROM orders").await?.is_empty());
    assert!(ids(&audit, "SELECT id FROM audit").await?.is_empty());
    assert!(!orders.lock().await.in_transaction());
    assert!(!audit.lock().await.in_transaction());
    Ok(())
}

#[tokio::test]
async fn function_step_injects_generated_key() -> TestResult {
    let (orders, audit) = orders_and_audit("inject").await?;

    let mut tx = Transaction::new();
    tx.add_query(insert_order(&orders, "widget"), None)
        .add_function(|previous, next| {
            let key = previous
                .and_then(|rs| rs.affected_keys.first().cloned())
                .ok_or_else(|| VeloxError::InvalidInput("no key from previous step".into()))?;
            match next {
                Some(procedure) => procedure.bind_all("order_id", key),
                None => Err(VeloxError::InvalidInput("no next step".into())),
            }
        })
        .add_query(
            PreparedStatement::new(
                audit.clone(),
                "INSERT INTO audit (order_id, note) VALUES (:order_id, :note)",
                QueryType::Insert,
            )
            .with_parameters(params! { "note" => "created" }),
            None,
        );
    assert_eq!(tx.len(), 3);

    let last = tx.execute().await?;
    assert_eq!(last.affected_keys, vec![Value::Int(1)]);
    assert_eq!(tx.last_results().map(|rs| rs.rows_affected), Some(1));

    let mut check = Query::new(audit, "SELECT order_id, note FROM audit", QueryType::Select);
    let rows = check.execute().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.get(0).and_then(|r| r.get("order_id")), Some(&Value::Int(1)));
    assert_eq!(ids(&orders, "SELECT id FROM orders").await?, vec![1]);
    Ok(())
}

#[tokio::test]
async fn work_is_invisible_until_commit() -> TestResult {
    let path = unique_db_path("visibility");
    let config = ConnectionConfig::sqlite(path.clone())
        .with_busy_timeout(std::time::Duration::from_secs(2));
    let writer = ConnectionHandle::open(&config).await?;
    writer
        .execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT NOT NULL)")
        .await?;
    let reader = ConnectionHandle::open(&config).await?;

    let mut tx = Transaction::new();
    tx.add_query(insert_order(&writer, "widget"), None);
    assert_eq!(tx.execute_next().await?, Some(0));
    assert_eq!(writer.lock().await.transaction_depth(), 1);
    assert!(ids(&reader, "SELECT id FROM orders").await?.is_empty());

    assert_eq!(tx.execute_next().await?, None);
    tx.commit().await?;
    assert_eq!(ids(&reader, "SELECT id FROM orders").await?, vec![1]);
    assert!(tx.commit().await.is_err());
    Ok(())
}

#[tokio::test]
async fn commit_requires_every_step() -> TestResult {
    let (orders, _audit) = orders_and_audit("pending").await?;
    let mut tx = Transaction::new();
    tx.add_query(insert_order(&orders, "a"), None);
    tx.add_query(insert_order(&orders, "b"), None);
    tx.execute_next().await?;
    assert_eq!(tx.commit().await.unwrap_err().code(), 2009);

    tx.rollback().await?;
    assert!(ids(&orders, "SELECT id FROM orders").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn cancellation_between_steps_aborts_and_rolls_back() -> TestResult {
    let (orders, audit) = orders_and_audit("cancel").await?;
    let cancel = CancellationToken::new();

    let mut tx = Transaction::new().with_cancellation(cancel.clone());
    tx.add_query(insert_order(&orders, "widget"), None);
    tx.add_query(
        PreparedStatement::new(
            audit.clone(),
            "INSERT INTO audit (order_id) VALUES (:order_id)",
            QueryType::Insert,
        )
        .with_parameters(params! { "order_id" => 1 }),
        None,
    );

    tx.execute_next().await?;
    cancel.cancel();
    let err = tx.execute().await.unwrap_err();
    assert!(matches!(
        err,
        VeloxError::TransactionAborted { step: 1, ref source, .. } if matches!(**source, VeloxError::Cancelled)
    ));
    assert!(ids(&orders, "SELECT id FROM orders").await?.is_empty());
    assert!(ids(&audit, "SELECT id FROM audit").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unbound_step_aborts_with_configuration_error() -> TestResult {
    let mut tx = Transaction::new();
    tx.add_query(Query::unbound("SELECT 1", QueryType::Select), None);
    let err = tx.execute().await.unwrap_err();
    assert_eq!(err.root_cause().code(), 1001);
    Ok(())
}

#[tokio::test]
async fn cancelling_interrupts_the_running_statement() -> TestResult {
    let conn = open("interrupt").await?;
    let cancel = CancellationToken::new();

    let mut tx = Transaction::new().with_cancellation(cancel.clone());
    tx.add_query(
        Query::new(
            conn.clone(),
            "WITH RECURSIVE r(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM r WHERE x < 500000000) \
             SELECT count(*) FROM r",
            QueryType::Select,
        ),
        None,
    );

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let started = Instant::now();
    let err = tx.execute().await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.root_cause().code(), 3004);
    assert!(elapsed < Duration::from_secs(5), "cancel took {elapsed:?}");
    assert!(!conn.lock().await.in_transaction());
    assert_eq!(ids(&conn, "SELECT 7").await?, vec![7]);
    Ok(())
}

#[tokio::test]
async fn every_commit_is_attempted_and_failures_collected() -> TestResult {
    let strict = open("commit_strict").await?;
    strict
        .execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER NOT NULL REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
             );",
        )
        .await?;
    let (orders, _audit) = orders_and_audit("commit_lenient").await?;

    let mut tx = Transaction::new();
    // Deferred: the insert succeeds and only COMMIT sees the missing parent.
    tx.add_query(
        PreparedStatement::new(
            strict.clone(),
            "INSERT INTO child (parent_id) VALUES (:parent_id)",
            QueryType::Insert,
        )
        .with_parameters(params! { "parent_id" => 99 }),
        None,
    );
    tx.add_query(insert_order(&orders, "widget"), None);

    let err = tx.execute().await.unwrap_err();
    match &err {
        VeloxError::CommitFailed(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].code(), 3001);
        }
        other => panic!("expected CommitFailed, got {other:?}"),
    }
    assert_eq!(err.code(), 4002);
    assert!(tx.is_finished());

    assert_eq!(ids(&orders, "SELECT id FROM orders").await?, vec![1]);
    assert!(ids(&strict, "SELECT id FROM child").await?.is_empty());
    assert!(!strict.lock().await.in_transaction());
    assert!(!orders.lock().await.in_transaction());
    Ok(())
}

#[tokio::test]
async fn compile_errors_fail_a_step_before_begin() -> TestResult {
    // Every round trip on this connection fails with `Cancelled`, so any other error proves
    // nothing was sent.
    let cancel = CancellationToken::new();
    cancel.cancel();
    let conn = ConnectionHandle::open_with(
        &ConnectionConfig::sqlite(unique_db_path("compile_first")),
        EngineOptions::default().with_cancellation(cancel),
    )
    .await?;

    let mut tx = Transaction::new();
    tx.add_query(
        StatementSet::new(conn.clone(), "SELECT * FROM t WHERE <<condition>>", QueryType::Select)
            .with_criterion(Criterion::new().with_condition("id", Condition::compare("~", 1))),
        None,
    );
    let err = tx.execute().await.unwrap_err();
    assert_eq!(err.root_cause().code(), 2002);

    let mut tx = Transaction::new();
    tx.add_query(
        PreparedStatement::new(conn.clone(), "INSERT INTO t (n) VALUES (:n)", QueryType::Insert)
            .with_parameters(params! { "other" => 1 }),
        None,
    );
    let err = tx.execute().await.unwrap_err();
    assert!(matches!(err.root_cause(), VeloxError::MissingParameter(n) if n == "n"));
    assert!(!conn.lock().await.in_transaction());
    Ok(())
}
