use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VeloxError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine not enabled in this build: {0}")]
    EngineUnavailable(String),

    #[error("criteria must not be empty")]
    EmptyCriteria,

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("{operator} on column {column} requires exactly two operands")]
    BetweenOperands { column: String, operator: String },

    #[error("{operator} on column {column} requires a non-empty array operand")]
    InOperand { column: String, operator: String },

    #[error("{operator} on column {column} requires exactly one scalar operand")]
    OperandCount { column: String, operator: String },

    #[error("invalid column name: {0:?}")]
    InvalidColumn(String),

    #[error("no value bound for placeholder :{0}")]
    MissingParameter(String),

    #[error("template mismatch: {0}")]
    TemplateMismatch(String),

    #[error("invalid procedure input: {0}")]
    InvalidInput(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(
        "transaction aborted at step {step} ({} rollback failure(s)): {source}",
        .rollback_failures.len()
    )]
    TransactionAborted {
        step: usize,
        #[source]
        source: Box<VeloxError>,
        rollback_failures: Vec<VeloxError>,
    },

    #[error("commit failed on {} connection(s)", .0.len())]
    CommitFailed(Vec<VeloxError>),

    #[error("multiple result sets returned, check resultSetOption")]
    MultipleResultSets,

    #[error("results not yet available, execute the procedure first")]
    ResultsNotAvailable,

    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// Broad failure classes; each maps onto a block of numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Compilation,
    Execution,
    Transaction,
    Consistency,
}

impl VeloxError {
    /// Stable numeric code. Callers branch on this, never on the message text.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            VeloxError::ConfigError(_) => 1001,
            VeloxError::EngineUnavailable(_) => 1002,
            VeloxError::EmptyCriteria => 2001,
            VeloxError::UnsupportedOperator(_) => 2002,
            VeloxError::BetweenOperands { .. } => 2003,
            VeloxError::InOperand { .. } => 2004,
            VeloxError::OperandCount { .. } => 2005,
            VeloxError::InvalidColumn(_) => 2006,
            VeloxError::MissingParameter(_) => 2007,
            VeloxError::TemplateMismatch(_) => 2008,
            VeloxError::InvalidInput(_) => 2009,
            #[cfg(feature = "sqlite")]
            VeloxError::SqliteError(_) => 3001,
            #[cfg(feature = "postgres")]
            VeloxError::PostgresError(_) => 3002,
            VeloxError::ExecutionError(_) => 3003,
            VeloxError::Cancelled => 3004,
            VeloxError::Timeout(_) => 3005,
            VeloxError::TransactionAborted { .. } => 4001,
            VeloxError::CommitFailed(_) => 4002,
            VeloxError::MultipleResultSets => 5001,
            VeloxError::ResultsNotAvailable => 5002,
            VeloxError::UnknownColumn(_) => 5003,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            1000..=1999 => ErrorCategory::Configuration,
            2000..=2999 => ErrorCategory::Compilation,
            3000..=3999 => ErrorCategory::Execution,
            4000..=4999 => ErrorCategory::Transaction,
            _ => ErrorCategory::Consistency,
        }
    }

    /// The failure that started a transaction abort, or `self` otherwise.
    #[must_use]
    pub fn root_cause(&self) -> &VeloxError {
        match self {
            VeloxError::TransactionAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Render this error for a boundary layer according to its reporting policy.
    #[must_use]
    pub fn report(&self, reporting: ErrorReporting) -> ErrorReport {
        let message = match reporting {
            ErrorReporting::Verbose => self.to_string(),
            ErrorReporting::CodeOnly => format!("{:?} error", self.category()).to_lowercase(),
        };
        ErrorReport {
            code: self.code(),
            category: self.category(),
            message,
        }
    }
}

/// How much detail a boundary layer exposes when surfacing an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorReporting {
    /// Full message text, including driver output.
    #[default]
    Verbose,
    /// Code and category only; driver text is redacted.
    CodeOnly,
}

/// Serializable error summary handed to whatever sits at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: u16,
    pub category: ErrorCategory,
    pub message: String,
}
