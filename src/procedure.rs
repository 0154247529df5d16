//! Executable units that yield a [`ResultSet`].
//!
//! Three implementations share one interface: [`Query`] (static SQL), [`PreparedStatement`]
//! (named SQL plus batched parameter sets) and [`StatementSet`] (SQL template compiled from
//! criteria). [`crate::Transaction`] implements it as well.

mod prepared;
mod query;
mod statement_set;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use prepared::PreparedStatement;
pub use query::Query;
pub use statement_set::StatementSet;

use crate::connection::ConnectionHandle;
use crate::criteria::Criterion;
use crate::error::VeloxError;
use crate::results::ResultSet;
use crate::types::{ParameterSet, Value};

/// What kind of statement a procedure runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Select,
    Update,
    Insert,
    Delete,
    /// Stored procedure call; returns rows like a select.
    Proc,
}

impl QueryType {
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, QueryType::Update | QueryType::Insert | QueryType::Delete)
    }
}

/// How per-parameter-set results are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSetOption {
    /// Keep only row counts and affected keys.
    None,
    /// One result per set; asking for a single result when there are several is an error.
    Array,
    /// Concatenate and drop exact-duplicate rows.
    Union,
    /// Concatenate.
    #[default]
    UnionAll,
    /// Keep the column list, drop the rows.
    FieldsOnly,
}

/// The kind of input a procedure accepts, used instead of inspecting its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Named parameter sets ([`PreparedStatement`]).
    ParameterSets,
    /// Criteria descriptors ([`StatementSet`]).
    Criteria,
    /// Nothing to feed ([`Query`], [`crate::Transaction`]).
    None,
}

#[async_trait]
pub trait Procedure: Send {
    /// Run against the bound connection, store and return the combined result.
    async fn execute(&mut self) -> Result<ResultSet, VeloxError>;

    /// Result of the last successful `execute`.
    ///
    /// # Errors
    /// `ResultsNotAvailable` before the first `execute`.
    fn results(&self) -> Result<&ResultSet, VeloxError>;

    /// Drop pending input (parameter sets, criteria) and stored results.
    fn clear(&mut self);

    fn query_type(&self) -> QueryType;

    fn connection(&self) -> Option<&ConnectionHandle>;

    fn set_connection(&mut self, connection: ConnectionHandle);

    fn input_kind(&self) -> InputKind;

    /// Check pending input without touching the database.
    ///
    /// # Errors
    /// The compilation error `execute` would otherwise fail with.
    fn prepare(&self) -> Result<(), VeloxError> {
        Ok(())
    }

    /// Queue one parameter set.
    ///
    /// # Errors
    /// `InvalidInput` unless [`Procedure::input_kind`] is [`InputKind::ParameterSets`].
    fn add_parameters(&mut self, _parameters: ParameterSet) -> Result<(), VeloxError> {
        Err(VeloxError::InvalidInput(format!(
            "{:?} procedure does not take parameter sets",
            self.input_kind()
        )))
    }

    /// Queue one criterion.
    ///
    /// # Errors
    /// `InvalidInput` unless [`Procedure::input_kind`] is [`InputKind::Criteria`].
    fn add_criterion(&mut self, _criterion: Criterion) -> Result<(), VeloxError> {
        Err(VeloxError::InvalidInput(format!(
            "{:?} procedure does not take criteria",
            self.input_kind()
        )))
    }

    /// Set `name` to `value` in every pending input, e.g. to inject a key produced by an
    /// earlier step.
    ///
    /// # Errors
    /// `InvalidInput` for procedures that take no input.
    fn bind_all(&mut self, name: &str, _value: Value) -> Result<(), VeloxError> {
        Err(VeloxError::InvalidInput(format!(
            "cannot bind {name}: procedure takes no input"
        )))
    }
}

/// Feed criteria into `procedure` according to what it accepts.
///
/// # Errors
/// `InvalidInput` for procedures that take no input, or a criterion that cannot become a
/// parameter set.
pub fn feed(procedure: &mut dyn Procedure, rows: Vec<Criterion>) -> Result<(), VeloxError> {
    match procedure.input_kind() {
        InputKind::Criteria => rows
            .into_iter()
            .try_for_each(|row| procedure.add_criterion(row)),
        InputKind::ParameterSets => rows
            .into_iter()
            .try_for_each(|row| procedure.add_parameters(row.into_parameter_set()?)),
        InputKind::None => Err(VeloxError::InvalidInput(
            "procedure takes no input".into(),
        )),
    }
}

/// Combine per-set results according to `option`.
///
/// # Errors
/// `MultipleResultSets` for [`ResultSetOption::Array`] with more than one result.
pub fn collapse(sets: Vec<ResultSet>, option: ResultSetOption) -> Result<ResultSet, VeloxError> {
    if option == ResultSetOption::Array {
        if sets.len() > 1 {
            return Err(VeloxError::MultipleResultSets);
        }
        return Ok(sets.into_iter().next().unwrap_or_default());
    }

    let distinct = option == ResultSetOption::Union;
    let mut iter = sets.into_iter();
    let mut combined = iter.next().unwrap_or_default();
    for next in iter {
        combined.merge(next, false);
    }
    if distinct {
        combined.dedup();
    }

    match option {
        ResultSetOption::FieldsOnly => combined.clear_rows(),
        ResultSetOption::None => {
            let mut counts = ResultSet::default();
            counts.rows_affected = combined.rows_affected;
            counts.affected_keys = combined.affected_keys;
            combined = counts;
        }
        _ => {}
    }
    Ok(combined)
}

pub(crate) fn require_connection(
    connection: Option<&ConnectionHandle>,
) -> Result<&ConnectionHandle, VeloxError> {
    connection.ok_or_else(|| VeloxError::ConfigError("procedure has no connection".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Row;

    fn rs(ids: &[i64]) -> ResultSet {
        let mut out = ResultSet::default();
        for id in ids {
            out.push_row(Row::from_pairs([("id", *id)]));
        }
        out
    }

    fn ids(set: &ResultSet) -> Vec<i64> {
        set.iter().filter_map(|r| r.get("id").and_then(Value::as_int).copied()).collect()
    }

    #[test]
    fn union_all_concatenates_and_union_dedups() {
        let all = collapse(vec![rs(&[1, 2]), rs(&[2, 3])], ResultSetOption::UnionAll).unwrap();
        assert_eq!(ids(&all), vec![1, 2, 2, 3]);
        let distinct = collapse(vec![rs(&[1, 2]), rs(&[2, 3])], ResultSetOption::Union).unwrap();
        assert_eq!(ids(&distinct), vec![1, 2, 3]);
    }

    #[test]
    fn array_rejects_multiple_sets() {
        let err = collapse(vec![rs(&[1]), rs(&[2])], ResultSetOption::Array).unwrap_err();
        assert_eq!(err.code(), 5001);
        assert_eq!(
            err.to_string(),
            "multiple result sets returned, check resultSetOption"
        );
        assert_eq!(ids(&collapse(vec![rs(&[7])], ResultSetOption::Array).unwrap()), vec![7]);
    }

    #[test]
    fn none_and_fields_only_drop_rows() {
        let fields = collapse(vec![rs(&[1, 2])], ResultSetOption::FieldsOnly).unwrap();
        assert!(fields.is_empty());
        assert_eq!(fields.columns(), ["id"]);

        let none = collapse(vec![rs(&[1, 2])], ResultSetOption::None).unwrap();
        assert!(none.is_empty() && none.columns().is_empty());
        assert_eq!(none.rows_affected, 2);
    }
}
