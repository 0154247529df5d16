//! Criteria-compiled SQL procedures, multi-connection transactions and diff-synchronized
//! models over `SQLite` (rusqlite) and `PostgreSQL` (tokio-postgres).
//!
//! ```rust,no_run
//! use velox_sql::prelude::*;
//!
//! # async fn demo() -> Result<(), VeloxError> {
//! let conn = ConnectionHandle::open(&ConnectionConfig::sqlite("app.db")).await?;
//!
//! let select = StatementSet::new(conn.clone(), "SELECT * FROM addresses WHERE <<condition>>", QueryType::Select)
//!     .with_criterion(Criterion::new().with_condition("state", Condition::eq("TX")));
//! let insert = StatementSet::new(
//!     conn.clone(),
//!     "INSERT INTO addresses (<<columns>>) VALUES (<<values>>)",
//!     QueryType::Insert,
//! );
//!
//! let mut model = Model::builder(select).insert(insert).key_column("id").build().await?;
//! model
//!     .insert(vec![Criterion::new().with_value("city", "Austin").with_value("state", "TX")])
//!     .await?;
//! println!("{}", serde_json::to_string(&model).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable at least one backend feature: `sqlite` or `postgres`");

pub mod config;
pub mod connection;
pub mod criteria;
pub mod error;
pub mod model;
pub mod prelude;
pub mod procedure;
pub mod results;
pub mod transaction;
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{ConnectionConfig, EngineOptions};
pub use connection::{Connection, ConnectionHandle};
pub use criteria::{Condition, Criterion, Diff, Operand, Operator, WhereGroup};
pub use error::{ErrorCategory, ErrorReport, ErrorReporting, VeloxError};
pub use model::{Model, ModelBuilder, ModelDiff, ModelState, SortDirection, SortKey, SortMode};
pub use procedure::{
    InputKind, PreparedStatement, Procedure, Query, QueryType, ResultSetOption, StatementSet,
};
pub use results::{ResultSet, Row};
pub use transaction::{Transaction, UserFunction};
pub use types::{Engine, ParameterSet, Value};
