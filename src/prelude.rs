//! Convenient imports for common functionality.
//!
//! ```rust
//! use velox_sql::prelude::*;
//! ```

pub use crate::config::{ConnectionConfig, EngineOptions};
pub use crate::connection::{Connection, ConnectionHandle};
pub use crate::criteria::{Condition, Criterion, Diff, Operand, Operator};
pub use crate::error::{ErrorReporting, VeloxError};
pub use crate::model::{Model, ModelDiff, ModelState, SortDirection, SortKey, SortMode};
pub use crate::params;
pub use crate::procedure::{
    InputKind, PreparedStatement, Procedure, Query, QueryType, ResultSetOption, StatementSet,
};
pub use crate::results::{ResultSet, Row};
pub use crate::transaction::Transaction;
pub use crate::types::{Engine, ParameterSet, Value};
