use std::collections::HashSet;
use std::sync::Arc;

use super::row::{Columns, Row};
use crate::types::Value;

/// A result set from a procedure execution.
///
/// Rows keep insertion order unless reassigned by index. The column list is fixed by the first
/// row (or by statement metadata) and only grows through [`ResultSet::merge`].
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
    column_names: Option<Arc<Columns>>,
    /// Rows returned by a read or touched by a write
    pub rows_affected: usize,
    /// Identities of the rows touched by the most recent write (insert ids, `RETURNING` keys)
    pub affected_keys: Vec<Value>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            rows: Vec::with_capacity(capacity),
            column_names: None,
            rows_affected: 0,
            affected_keys: Vec::new(),
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Columns>) {
        self.column_names = Some(column_names);
    }

    /// Get the shared column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Columns>> {
        self.column_names.as_ref()
    }

    /// Column names in result order; empty until a row or statement metadata fixes them.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.column_names.as_ref().map_or(&[], |cols| cols.names())
    }

    /// Add a row built from raw values using the shared column names.
    ///
    /// Values are dropped when no column names have been set yet.
    pub fn add_row_values(&mut self, row_values: Vec<Value>) {
        if let Some(column_names) = &self.column_names {
            self.rows.push(Row::new(Arc::clone(column_names), row_values));
            self.rows_affected += 1;
        }
    }

    /// Append a row; the first row pushed fixes the column list if none is set.
    pub fn push_row(&mut self, row: Row) {
        if self.column_names.is_none() {
            self.column_names = Some(Arc::clone(row.shared_columns()));
        }
        self.rows.push(row);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Reassign the row at `index`, returning the previous one. An index at or past the end
    /// appends instead and returns `None`.
    pub fn set(&mut self, index: usize, row: Row) -> Option<Row> {
        match self.rows.get_mut(index) {
            Some(slot) => Some(std::mem::replace(slot, row)),
            None => {
                self.push_row(row);
                None
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop the rows but keep columns, row counts and affected keys.
    pub fn clear_rows(&mut self) {
        self.rows.clear();
    }

    /// Append `other` to this set. Columns missing here are appended in `other`'s order;
    /// row counts and affected keys accumulate. With `distinct`, exact-duplicate rows are
    /// removed afterwards, keeping first occurrences.
    pub fn merge(&mut self, other: ResultSet, distinct: bool) {
        match (&self.column_names, &other.column_names) {
            (None, Some(theirs)) => self.column_names = Some(Arc::clone(theirs)),
            (Some(ours), Some(theirs)) if !Arc::ptr_eq(ours, theirs) => {
                let extra: Vec<&String> = theirs
                    .names()
                    .iter()
                    .filter(|name| ours.position(name).is_none())
                    .collect();
                if !extra.is_empty() {
                    let mut names = ours.names().to_vec();
                    names.extend(extra.into_iter().cloned());
                    self.column_names = Some(Arc::new(Columns::new(names)));
                }
            }
            _ => {}
        }
        self.rows.extend(other.rows);
        self.rows_affected += other.rows_affected;
        self.affected_keys.extend(other.affected_keys);
        if distinct {
            self.dedup();
        }
    }

    /// Remove exact-duplicate rows, keeping the first occurrence of each.
    pub fn dedup(&mut self) {
        let keep: Vec<bool> = {
            let mut seen: HashSet<&Row> = HashSet::with_capacity(self.rows.len());
            self.rows.iter().map(|row| seen.insert(row)).collect()
        };
        let mut flags = keep.into_iter();
        self.rows.retain(|_| flags.next().unwrap_or(true));
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
