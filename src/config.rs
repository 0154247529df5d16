use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorReport, ErrorReporting, VeloxError};
use crate::types::Engine;

/// Parameters for opening one live connection.
///
/// Deserializable so it can come straight from a config file:
/// ```rust
/// use velox_sql::prelude::*;
///
/// let cfg: ConnectionConfig =
///     serde_json::from_str(r#"{ "engine": "sqlite", "path": "app.db", "busy_timeout_ms": 500 }"#)
///         .unwrap();
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub engine: Engine,
    /// Database file for `SQLite` (`:memory:` is accepted).
    #[serde(default)]
    pub path: Option<String>,
    /// Connection string for Postgres (key/value or URL form).
    #[serde(default)]
    pub url: Option<String>,
    /// `SQLite` busy timeout.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// Upper bound for a single round trip.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            engine: Engine::Sqlite,
            path: Some(path.into()),
            url: None,
            busy_timeout_ms: None,
            statement_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            engine: Engine::Postgres,
            path: None,
            url: Some(url.into()),
            busy_timeout_ms: None,
            statement_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(duration_ms(timeout));
        self
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(duration_ms(timeout));
        self
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// Check required and contradictory parameters before anything is opened.
    ///
    /// # Errors
    /// Returns `VeloxError::EngineUnavailable` when the engine's feature is off, or
    /// `VeloxError::ConfigError` naming the offending field.
    pub fn validate(&self) -> Result<(), VeloxError> {
        if !self.engine.is_available() {
            return Err(VeloxError::EngineUnavailable(self.engine.to_string()));
        }
        match self.engine {
            Engine::Sqlite => {
                if self.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(VeloxError::ConfigError("sqlite requires path".into()));
                }
                if self.url.is_some() {
                    return Err(VeloxError::ConfigError(
                        "sqlite takes path, not url".into(),
                    ));
                }
            }
            Engine::Postgres => {
                if self.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                    return Err(VeloxError::ConfigError("postgres requires url".into()));
                }
                if self.path.is_some() {
                    return Err(VeloxError::ConfigError(
                        "postgres takes url, not path".into(),
                    ));
                }
                if self.busy_timeout_ms.is_some() {
                    return Err(VeloxError::ConfigError(
                        "busy_timeout_ms only applies to sqlite".into(),
                    ));
                }
            }
        }
        if self.statement_timeout_ms == Some(0) {
            return Err(VeloxError::ConfigError(
                "statement_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Per-connection engine settings, passed explicitly at open time.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// How errors are rendered for the request boundary.
    pub reporting: ErrorReporting,
    /// Overrides the config's statement timeout when set.
    pub statement_timeout: Option<Duration>,
    /// Cancelling this token fails the in-flight and every later round trip.
    pub cancel: CancellationToken,
}

impl EngineOptions {
    #[must_use]
    pub fn with_reporting(mut self, reporting: ErrorReporting) -> Self {
        self.reporting = reporting;
        self
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Render `err` according to the configured reporting policy.
    #[must_use]
    pub fn report(&self, err: &VeloxError) -> ErrorReport {
        err.report(self.reporting)
    }
}
