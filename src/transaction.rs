//! Ordered procedures and user functions run atomically across connections.

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::VeloxError;
use crate::procedure::{InputKind, Procedure, QueryType, require_connection};
use crate::results::ResultSet;

/// Interstitial logic between steps.
///
/// Called with the previous step's result (none if it is the first step or follows another
/// function) and the next step's procedure (none if the next step is not a procedure), which it
/// may modify before that step runs.
pub type UserFunction = Box<
    dyn FnMut(Option<&ResultSet>, Option<&mut dyn Procedure>) -> Result<(), VeloxError> + Send,
>;

enum Step {
    Query(Box<dyn Procedure>),
    Function(UserFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Committed,
    RolledBack,
}

/// A sequence of steps with all-or-nothing commit across every connection it touches.
///
/// Each connection enters a database transaction the first time a step uses it. A failing
/// step rolls back every touched connection and abandons the rest; after the last step every
/// touched connection is committed.
///
/// ```rust,no_run
/// # async fn demo(orders: velox_sql::ConnectionHandle, audit: velox_sql::ConnectionHandle)
/// #     -> Result<(), velox_sql::VeloxError> {
/// use velox_sql::prelude::*;
///
/// let mut tx = Transaction::new();
/// tx.add_query(
///     PreparedStatement::new(orders, "INSERT INTO orders (item) VALUES (:item)", QueryType::Insert)
///         .with_parameters(params! { "item" => "widget" }),
///     None,
/// );
/// tx.add_function(|prev, next| {
///     let id = prev.and_then(|rs| rs.affected_keys.first().cloned()).unwrap_or(Value::Null);
///     match next {
///         Some(step) => step.bind_all("order_id", id),
///         None => Ok(()),
///     }
/// });
/// tx.add_query(
///     PreparedStatement::new(audit, "INSERT INTO audit (order_id) VALUES (:order_id)", QueryType::Insert),
///     None,
/// );
/// tx.execute().await?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction {
    steps: Vec<Step>,
    results: Vec<Option<ResultSet>>,
    next: usize,
    touched: Vec<ConnectionHandle>,
    cancel: CancellationToken,
    phase: Phase,
    outcome: Option<ResultSet>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            results: Vec::new(),
            next: 0,
            touched: Vec::new(),
            cancel: CancellationToken::new(),
            phase: Phase::Open,
            outcome: None,
        }
    }

    /// Abort at the next step boundary (or the in-flight step) once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Append a procedure step. An explicit `connection` rebinds the procedure.
    pub fn add_query<P>(&mut self, procedure: P, connection: Option<ConnectionHandle>) -> &mut Self
    where
        P: Procedure + 'static,
    {
        self.add_boxed(Box::new(procedure), connection)
    }

    pub fn add_boxed(
        &mut self,
        mut procedure: Box<dyn Procedure>,
        connection: Option<ConnectionHandle>,
    ) -> &mut Self {
        if let Some(connection) = connection {
            procedure.set_connection(connection);
        }
        self.steps.push(Step::Query(procedure));
        self.results.push(None);
        self
    }

    pub fn add_function<F>(&mut self, function: F) -> &mut Self
    where
        F: FnMut(Option<&ResultSet>, Option<&mut dyn Procedure>) -> Result<(), VeloxError>
            + Send
            + 'static,
    {
        self.steps.push(Step::Function(Box::new(function)));
        self.results.push(None);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every step has run and the transaction was committed or rolled back.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase != Phase::Open
    }

    /// Result of procedure step `step`, once it has run.
    #[must_use]
    pub fn results(&self, step: usize) -> Option<&ResultSet> {
        self.results.get(step).and_then(Option::as_ref)
    }

    /// Result of the most recently executed procedure step.
    #[must_use]
    pub fn last_results(&self) -> Option<&ResultSet> {
        self.results[..self.next]
            .iter()
            .rev()
            .find_map(Option::as_ref)
    }

    /// Run every remaining step, then commit.
    ///
    /// # Errors
    /// `TransactionAborted` when a step fails (everything touched is rolled back first),
    /// `CommitFailed` when one or more commits fail.
    pub async fn execute(&mut self) -> Result<ResultSet, VeloxError> {
        while self.execute_next().await?.is_some() {}
        self.commit().await?;
        let outcome = self.last_results().cloned().unwrap_or_default();
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Run the next step. Returns its index, or `None` when no steps remain.
    ///
    /// # Errors
    /// `TransactionAborted` when the step fails; `InvalidInput` once the transaction is finished.
    pub async fn execute_next(&mut self) -> Result<Option<usize>, VeloxError> {
        self.ensure_open()?;
        let step = self.next;
        if step >= self.steps.len() {
            return Ok(None);
        }
        if let Err(source) = self.run_step(step).await {
            return Err(self.abort(step, source).await);
        }
        self.next += 1;
        Ok(Some(step))
    }

    /// Commit every touched connection, attempting all of them.
    ///
    /// # Errors
    /// `InvalidInput` if steps remain or the transaction is finished; `CommitFailed` with every
    /// individual failure otherwise.
    pub async fn commit(&mut self) -> Result<(), VeloxError> {
        self.ensure_open()?;
        if self.next < self.steps.len() {
            return Err(VeloxError::InvalidInput(format!(
                "cannot commit with {} step(s) not yet executed",
                self.steps.len() - self.next
            )));
        }
        let touched = std::mem::take(&mut self.touched);
        let mut failures = Vec::new();
        for handle in &touched {
            let mut conn = handle.lock().await;
            if let Err(e) = conn.commit().await {
                warn!(connection = handle.id(), error = %e, "commit failed");
                if let Err(rb) = conn.rollback().await {
                    warn!(connection = handle.id(), error = %rb, "rollback after failed commit");
                }
                failures.push(e);
            }
        }
        self.phase = Phase::Committed;
        if failures.is_empty() {
            info!(connections = touched.len(), "transaction committed");
            Ok(())
        } else {
            Err(VeloxError::CommitFailed(failures))
        }
    }

    /// Roll back every touched connection and abandon remaining steps.
    ///
    /// # Errors
    /// `ExecutionError` summarising any rollback failures; all connections are attempted.
    pub async fn rollback(&mut self) -> Result<(), VeloxError> {
        self.ensure_open()?;
        let failures = self.rollback_touched().await;
        self.phase = Phase::RolledBack;
        if failures.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
        Err(VeloxError::ExecutionError(format!(
            "rollback failed: {}",
            messages.join("; ")
        )))
    }

    fn ensure_open(&self) -> Result<(), VeloxError> {
        if self.phase == Phase::Open {
            Ok(())
        } else {
            Err(VeloxError::InvalidInput("transaction already finished".into()))
        }
    }

    async fn run_step(&mut self, step: usize) -> Result<(), VeloxError> {
        if self.cancel.is_cancelled() {
            return Err(VeloxError::Cancelled);
        }
        let (head, tail) = self.steps.split_at_mut(step + 1);
        match &mut head[step] {
            Step::Query(procedure) => {
                let handle = require_connection(procedure.connection())?.clone();
                procedure.prepare()?;
                if !self.touched.iter().any(|h| h.id() == handle.id()) {
                    handle.lock().await.begin_transaction().await?;
                    self.touched.push(handle.clone());
                }
                debug!(step, connection = handle.id(), "running transaction step");
                let outcome = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(VeloxError::Cancelled),
                    res = procedure.execute() => res,
                };
                // The dropped step future released the handle, but the driver may still be
                // running its statement.
                if matches!(outcome, Err(VeloxError::Cancelled)) {
                    handle.lock().await.interrupt();
                }
                self.results[step] = Some(outcome?);
            }
            Step::Function(function) => {
                let previous = step
                    .checked_sub(1)
                    .and_then(|p| self.results[p].as_ref());
                let next = match tail.first_mut() {
                    Some(Step::Query(procedure)) => Some(procedure.as_mut() as &mut dyn Procedure),
                    _ => None,
                };
                debug!(step, "running transaction function");
                function(previous, next)?;
            }
        }
        Ok(())
    }

    async fn abort(&mut self, step: usize, source: VeloxError) -> VeloxError {
        let rollback_failures = self.rollback_touched().await;
        self.phase = Phase::RolledBack;
        warn!(
            step,
            error = %source,
            rollback_failures = rollback_failures.len(),
            "transaction aborted"
        );
        VeloxError::TransactionAborted {
            step,
            source: Box::new(source),
            rollback_failures,
        }
    }

    async fn rollback_touched(&mut self) -> Vec<VeloxError> {
        let touched = std::mem::take(&mut self.touched);
        let mut failures = Vec::new();
        for handle in touched.iter().rev() {
            if let Err(e) = handle.lock().await.rollback().await {
                warn!(connection = handle.id(), error = %e, "rollback failed");
                failures.push(e);
            }
        }
        if !touched.is_empty() {
            info!(connections = touched.len(), "transaction rolled back");
        }
        failures
    }
}

#[async_trait]
impl Procedure for Transaction {
    async fn execute(&mut self) -> Result<ResultSet, VeloxError> {
        Transaction::execute(self).await
    }

    fn results(&self) -> Result<&ResultSet, VeloxError> {
        self.outcome.as_ref().ok_or(VeloxError::ResultsNotAvailable)
    }

    /// Reset run state so the same steps can run again.
    fn clear(&mut self) {
        self.results.iter_mut().for_each(|r| *r = None);
        self.next = 0;
        self.phase = Phase::Open;
        self.outcome = None;
    }

    fn query_type(&self) -> QueryType {
        self.steps
            .iter()
            .rev()
            .find_map(|s| match s {
                Step::Query(p) => Some(p.query_type()),
                Step::Function(_) => None,
            })
            .unwrap_or(QueryType::Proc)
    }

    fn connection(&self) -> Option<&ConnectionHandle> {
        None
    }

    fn set_connection(&mut self, _connection: ConnectionHandle) {}

    fn input_kind(&self) -> InputKind {
        InputKind::None
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.touched.is_empty() {
            return;
        }
        let touched = std::mem::take(&mut self.touched);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                for conn in touched.iter().rev() {
                    let _ = conn.lock().await.rollback().await;
                }
            });
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("steps", &self.steps.len())
            .field("next", &self.next)
            .field("touched", &self.touched)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_transaction_is_a_no_op() {
        let mut tx = Transaction::new();
        let result = tx.execute().await.unwrap();
        assert!(result.is_empty());
        assert!(tx.is_finished());
        assert!(Procedure::results(&tx).is_ok());

        Procedure::clear(&mut tx);
        assert!(!tx.is_finished());
        assert!(Procedure::execute(&mut tx).await.is_ok());
    }

    #[tokio::test]
    async fn function_steps_see_no_previous_result_when_first() {
        let mut tx = Transaction::new();
        tx.add_function(|prev, next| {
            assert!(prev.is_none());
            assert!(next.is_none());
            Ok(())
        });
        tx.add_function(|_, _| Err(VeloxError::InvalidInput("stop".into())));
        let err = tx.execute().await.unwrap_err();
        match err {
            VeloxError::TransactionAborted { step, ref source, ref rollback_failures } => {
                assert_eq!(step, 1);
                assert_eq!(source.code(), 2009);
                assert!(rollback_failures.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(tx.execute_next().await.is_err());
    }

    #[tokio::test]
    async fn cancelled_before_first_step() {
        let cancel = CancellationToken::new();
        let mut tx = Transaction::new().with_cancellation(cancel.clone());
        tx.add_function(|_, _| Ok(()));
        cancel.cancel();
        let err = tx.execute().await.unwrap_err();
        assert_eq!(err.root_cause().code(), 3004);
    }
}
