//! A query-backed, in-memory dataset kept in step with the database by diffing.

mod diff;
mod sort;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::debug;

pub use diff::ModelDiff;
pub use sort::{SortDirection, SortKey, SortMode};

use crate::criteria::{Criterion, Diff};
use crate::error::VeloxError;
use crate::procedure::{InputKind, Procedure, feed};
use crate::results::{ResultSet, Row};
use crate::transaction::Transaction;
use crate::types::Value;

/// Where a model is in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Data reflects the last select.
    Fresh,
    /// A write went out and no refresh has happened since.
    Dirty,
    /// A batch of writes is running with refreshes suppressed.
    Synchronizing,
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Update,
    Insert,
    Delete,
}

/// A snapshot of `(columns, rows, last refresh)` backed by a select procedure and optional
/// write procedures.
///
/// Writes go through the matching procedure and are followed by a diffing refresh, so the
/// snapshot always reflects what the database actually holds.
pub struct Model {
    select: Box<dyn Procedure>,
    update: WriteSlot,
    insert: WriteSlot,
    delete: WriteSlot,
    columns: Vec<String>,
    data: Vec<Row>,
    last_query: Option<DateTime<Utc>>,
    key_column: Option<String>,
    delay_select: bool,
    state: ModelState,
    last_diff: ModelDiff,
}

/// A write procedure, or the empty transaction standing in when none was configured.
struct WriteSlot {
    procedure: Box<dyn Procedure>,
    configured: bool,
}

impl WriteSlot {
    fn new(procedure: Option<Box<dyn Procedure>>) -> Self {
        match procedure {
            Some(procedure) => Self {
                procedure,
                configured: true,
            },
            None => Self {
                procedure: Box::new(Transaction::new()),
                configured: false,
            },
        }
    }
}

/// Configures the optional parts of a [`Model`] before the first select runs.
pub struct ModelBuilder {
    select: Box<dyn Procedure>,
    update: Option<Box<dyn Procedure>>,
    insert: Option<Box<dyn Procedure>>,
    delete: Option<Box<dyn Procedure>>,
    key_column: Option<String>,
}

impl ModelBuilder {
    #[must_use]
    pub fn update(mut self, procedure: impl Procedure + 'static) -> Self {
        self.update = Some(Box::new(procedure));
        self
    }

    #[must_use]
    pub fn insert(mut self, procedure: impl Procedure + 'static) -> Self {
        self.insert = Some(Box::new(procedure));
        self
    }

    #[must_use]
    pub fn delete(mut self, procedure: impl Procedure + 'static) -> Self {
        self.delete = Some(Box::new(procedure));
        self
    }

    /// Column identifying rows for [`Model::find_by_key`].
    #[must_use]
    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    /// Create the model and load its first snapshot.
    ///
    /// # Errors
    /// Whatever the select procedure fails with.
    pub async fn build(self) -> Result<Model, VeloxError> {
        let mut model = Model {
            select: self.select,
            update: WriteSlot::new(self.update),
            insert: WriteSlot::new(self.insert),
            delete: WriteSlot::new(self.delete),
            columns: Vec::new(),
            data: Vec::new(),
            last_query: None,
            key_column: self.key_column,
            delay_select: false,
            state: ModelState::Dirty,
            last_diff: ModelDiff::default(),
        };
        model.select(false).await?;
        Ok(model)
    }
}

impl Model {
    /// Create a read-only model and load its first snapshot.
    ///
    /// # Errors
    /// Whatever the select procedure fails with.
    pub async fn new(select: impl Procedure + 'static) -> Result<Self, VeloxError> {
        Self::builder(select).build().await
    }

    pub fn builder(select: impl Procedure + 'static) -> ModelBuilder {
        ModelBuilder {
            select: Box::new(select),
            update: None,
            insert: None,
            delete: None,
            key_column: None,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn data(&self) -> &[Row] {
        &self.data
    }

    /// When the select procedure last succeeded.
    #[must_use]
    pub fn last_query(&self) -> Option<DateTime<Utc>> {
        self.last_query
    }

    #[must_use]
    pub fn last_diff(&self) -> &ModelDiff {
        &self.last_diff
    }

    #[must_use]
    pub fn state(&self) -> ModelState {
        self.state
    }

    #[must_use]
    pub fn key_column(&self) -> Option<&str> {
        self.key_column.as_deref()
    }

    #[must_use]
    pub fn delay_select(&self) -> bool {
        self.delay_select
    }

    /// Suppress (or restore) the refresh that follows each write. While suppressed the model
    /// stays `Dirty` after a write until [`Model::select`] runs.
    pub fn set_delay_select(&mut self, on: bool) {
        self.delay_select = on;
    }

    /// First row whose key column equals `key`; `None` without a key column.
    #[must_use]
    pub fn find_by_key(&self, key: &Value) -> Option<&Row> {
        let column = self.key_column.as_deref()?;
        self.data.iter().find(|row| row.get(column) == Some(key))
    }

    /// Re-run the select procedure.
    ///
    /// Without `diff` the snapshot is replaced wholesale. With `diff` it is reconciled against
    /// the fresh rows: rows gone from the database are removed, new ones appended.
    ///
    /// # Errors
    /// Whatever the select procedure fails with, including `MultipleResultSets`.
    pub async fn select(&mut self, diff: bool) -> Result<ModelDiff, VeloxError> {
        let fresh = self.select.execute().await?;
        self.last_query = Some(Utc::now());

        let changes = if diff {
            let (data, changes) = diff::reconcile(&self.data, fresh.rows());
            self.data = data;
            if !fresh.columns().is_empty() {
                self.columns = fresh.columns().to_vec();
            }
            changes
        } else {
            self.columns = fresh.columns().to_vec();
            self.data = fresh.into_rows();
            ModelDiff::default()
        };

        debug!(
            rows = self.data.len(),
            inserted = changes.inserted.len(),
            deleted = changes.deleted.len(),
            "model refreshed"
        );
        self.state = ModelState::Fresh;
        self.last_diff = changes.clone();
        Ok(changes)
    }

    /// # Errors
    /// See [`Model::synchronize`].
    pub async fn update(&mut self, rows: Vec<Criterion>) -> Result<ResultSet, VeloxError> {
        self.write(WriteKind::Update, rows).await
    }

    /// # Errors
    /// See [`Model::synchronize`].
    pub async fn insert(&mut self, rows: Vec<Criterion>) -> Result<ResultSet, VeloxError> {
        self.write(WriteKind::Insert, rows).await
    }

    /// # Errors
    /// See [`Model::synchronize`].
    pub async fn delete(&mut self, rows: Vec<Criterion>) -> Result<ResultSet, VeloxError> {
        self.write(WriteKind::Delete, rows).await
    }

    /// Apply a diff's update, delete and insert lists in that order, then refresh once.
    ///
    /// The diff's `select` list is not used; the model always refreshes through its own select
    /// procedure.
    ///
    /// # Errors
    /// The first failing write (later writes are skipped and no refresh happens), or the
    /// refresh error.
    pub async fn synchronize(&mut self, diff: Diff) -> Result<ModelDiff, VeloxError> {
        let Diff {
            update,
            insert,
            delete,
            ..
        } = diff;
        let delayed = self.delay_select;
        self.delay_select = true;
        self.state = ModelState::Synchronizing;

        let applied = async {
            self.update(update).await?;
            self.delete(delete).await?;
            self.insert(insert).await?;
            Ok::<_, VeloxError>(())
        }
        .await;

        self.delay_select = delayed;
        if let Err(e) = applied {
            self.state = ModelState::Dirty;
            return Err(e);
        }
        self.select(true).await
    }

    /// Reorder rows in place by `keys`; equal rows keep their order.
    ///
    /// # Errors
    /// `UnknownColumn` for the first key not among the model's columns; rows are untouched.
    pub fn sort(&mut self, keys: &[SortKey]) -> Result<(), VeloxError> {
        if let Some(missing) = keys
            .iter()
            .find(|key| !self.columns.iter().any(|c| *c == key.column))
        {
            return Err(VeloxError::UnknownColumn(missing.column.clone()));
        }
        self.data.sort_by(|a, b| sort::compare_rows(a, b, keys));
        Ok(())
    }

    async fn write(&mut self, kind: WriteKind, rows: Vec<Criterion>) -> Result<ResultSet, VeloxError> {
        if rows.is_empty() {
            return Ok(ResultSet::default());
        }
        let slot = match kind {
            WriteKind::Update => &mut self.update,
            WriteKind::Insert => &mut self.insert,
            WriteKind::Delete => &mut self.delete,
        };
        let takes_input = slot.procedure.input_kind() != InputKind::None;
        if slot.configured && !takes_input {
            return Err(VeloxError::InvalidInput(format!(
                "{kind:?} procedure takes no input; {} row(s) not written",
                rows.len()
            )));
        }
        slot.procedure.clear();
        if takes_input {
            feed(slot.procedure.as_mut(), rows)?;
        } else {
            debug!(?kind, rows = rows.len(), "no write procedure configured; rows not written");
        }
        let result = slot.procedure.execute().await?;

        if self.state != ModelState::Synchronizing {
            self.state = ModelState::Dirty;
        }
        if !self.delay_select {
            self.select(true).await?;
        }
        Ok(result)
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Model", 3)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("data", &self.data)?;
        state.serialize_field("last_query", &self.last_query)?;
        state.end()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("columns", &self.columns)
            .field("rows", &self.data.len())
            .field("last_query", &self.last_query)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
