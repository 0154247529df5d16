use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::{
    InputKind, PreparedStatement, Procedure, QueryType, ResultSetOption, collapse,
};
use crate::connection::ConnectionHandle;
use crate::criteria::{Criterion, Operator, validate_column};
use crate::error::VeloxError;
use crate::results::ResultSet;
use crate::types::{ParameterSet, Value};

const VALUES_TOKEN: &str = "<<values>>";
const COLUMNS_TOKEN: &str = "<<columns>>";
const CONDITION_TOKEN: &str = "<<condition>>";

/// Per where-group `(column, operator, operand count)`, plus the value columns.
///
/// Criteria with equal shapes render to the same SQL and differ only in bound values.
type Shape = (Vec<Vec<(String, Operator, usize)>>, Vec<String>);

/// SQL template compiled from criteria into the fewest prepared statements.
///
/// Two criteria share a statement only when their shapes match exactly: the same where groups
/// in the same order, each with the same columns, operators and operand counts, and the same
/// value columns. `IN [1, 2]` and `IN [3]` on one column therefore compile to two statements.
///
/// The template may contain `<<columns>>`, `<<values>>` and `<<condition>>`:
///
/// ```rust
/// use velox_sql::prelude::*;
///
/// let set = StatementSet::unbound("SELECT * FROM addresses WHERE <<condition>>", QueryType::Select)
///     .with_criterion(
///         Criterion::new()
///             .with_condition("city", Condition::eq("Falls City"))
///             .with_condition("state", Condition::eq("TX")),
///     );
/// let compiled = set.compile().unwrap();
/// assert_eq!(compiled.len(), 1);
/// assert_eq!(
///     compiled[0].sql(),
///     "SELECT * FROM addresses WHERE (city = :w0_0 AND state = :w0_1)"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct StatementSet {
    connection: Option<ConnectionHandle>,
    sql: String,
    query_type: QueryType,
    result_option: ResultSetOption,
    criteria: Vec<Criterion>,
    results: Option<ResultSet>,
}

impl StatementSet {
    pub fn new(connection: ConnectionHandle, sql: impl Into<String>, query_type: QueryType) -> Self {
        let mut set = Self::unbound(sql, query_type);
        set.connection = Some(connection);
        set
    }

    pub fn unbound(sql: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            connection: None,
            sql: sql.into(),
            query_type,
            result_option: ResultSetOption::default(),
            criteria: Vec::new(),
            results: None,
        }
    }

    #[must_use]
    pub fn with_result_option(mut self, option: ResultSetOption) -> Self {
        self.result_option = option;
        self
    }

    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    #[must_use]
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Validate the queued criteria and group them by shape, one statement per shape in order
    /// of first appearance. Nothing is sent to the database.
    ///
    /// # Errors
    /// `EmptyCriteria`, operator/operand/column validation errors, or `TemplateMismatch`.
    pub fn compile(&self) -> Result<Vec<PreparedStatement>, VeloxError> {
        if self.criteria.is_empty() {
            return Err(VeloxError::EmptyCriteria);
        }
        let mut by_shape: HashMap<Shape, usize> = HashMap::new();
        let mut statements: Vec<PreparedStatement> = Vec::new();
        for criterion in &self.criteria {
            let (shape, parameters) = self.analyze(criterion)?;
            let idx = if let Some(idx) = by_shape.get(&shape) {
                *idx
            } else {
                let sql = self.render(&shape);
                statements.push(
                    PreparedStatement::unbound(sql, self.query_type)
                        .with_result_option(self.result_option)
                        .with_connection(self.connection.clone()),
                );
                by_shape.insert(shape, statements.len() - 1);
                statements.len() - 1
            };
            statements[idx].add_parameters(parameters)?;
        }
        Ok(statements)
    }

    fn analyze(&self, criterion: &Criterion) -> Result<(Shape, ParameterSet), VeloxError> {
        let mut parameters = ParameterSet::new();
        let mut where_shape = Vec::with_capacity(criterion.where_groups.len());
        for (g, group) in criterion.where_groups.iter().enumerate() {
            if group.is_empty() {
                return Err(VeloxError::InvalidInput("empty where group".into()));
            }
            let mut conditions = Vec::with_capacity(group.len());
            for (c, (column, condition)) in group.iter().enumerate() {
                validate_column(column)?;
                let op = condition.validate(column)?;
                let values: Vec<&Value> = condition.values().collect();
                if op.is_range() || op.is_membership() {
                    for (k, value) in values.iter().enumerate() {
                        parameters.insert(format!("w{g}_{c}_{k}"), (*value).clone());
                    }
                } else if let Some(value) = values.first() {
                    parameters.insert(format!("w{g}_{c}"), (*value).clone());
                }
                conditions.push((column.clone(), op, values.len()));
            }
            where_shape.push(conditions);
        }

        let mut value_columns = Vec::with_capacity(criterion.values.len());
        for (i, (column, value)) in criterion.values.iter().enumerate() {
            validate_column(column)?;
            parameters.insert(format!("v{i}"), value.clone());
            value_columns.push(column.clone());
        }

        let wants_values = self.sql.contains(VALUES_TOKEN) || self.sql.contains(COLUMNS_TOKEN);
        if wants_values && value_columns.is_empty() {
            return Err(VeloxError::TemplateMismatch(format!(
                "template uses {VALUES_TOKEN} or {COLUMNS_TOKEN} but a criterion has no values"
            )));
        }
        if !wants_values && !value_columns.is_empty() {
            return Err(VeloxError::TemplateMismatch(format!(
                "criterion has values but template has neither {VALUES_TOKEN} nor {COLUMNS_TOKEN}"
            )));
        }
        if !where_shape.is_empty() && !self.sql.contains(CONDITION_TOKEN) {
            return Err(VeloxError::TemplateMismatch(format!(
                "criterion has where groups but template has no {CONDITION_TOKEN}"
            )));
        }

        Ok(((where_shape, value_columns), parameters))
    }

    fn render(&self, (where_shape, columns): &Shape) -> String {
        let mut sql = self.sql.clone();
        if sql.contains(COLUMNS_TOKEN) {
            sql = sql.replace(COLUMNS_TOKEN, &columns.join(", "));
        }
        if sql.contains(VALUES_TOKEN) {
            let values: Vec<String> = if self.query_type == QueryType::Insert {
                (0..columns.len()).map(|i| format!(":v{i}")).collect()
            } else {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| format!("{column} = :v{i}"))
                    .collect()
            };
            sql = sql.replace(VALUES_TOKEN, &values.join(", "));
        }
        if sql.contains(CONDITION_TOKEN) {
            sql = sql.replace(CONDITION_TOKEN, &render_condition(where_shape));
        }
        sql
    }
}

fn render_condition(where_shape: &[Vec<(String, Operator, usize)>]) -> String {
    if where_shape.is_empty() {
        return "1 = 1".to_owned();
    }
    let groups: Vec<String> = where_shape
        .iter()
        .enumerate()
        .map(|(g, group)| {
            let leaves: Vec<String> = group
                .iter()
                .enumerate()
                .map(|(c, (column, op, arity))| {
                    if op.is_range() {
                        format!("{column} {op} :w{g}_{c}_0 AND :w{g}_{c}_1")
                    } else if op.is_membership() {
                        let list: Vec<String> =
                            (0..*arity).map(|k| format!(":w{g}_{c}_{k}")).collect();
                        format!("{column} {op} ({})", list.join(", "))
                    } else {
                        format!("{column} {op} :w{g}_{c}")
                    }
                })
                .collect();
            format!("({})", leaves.join(" AND "))
        })
        .collect();
    groups.join(" OR ")
}

#[async_trait]
impl Procedure for StatementSet {
    async fn execute(&mut self) -> Result<ResultSet, VeloxError> {
        let statements = self.compile()?;
        debug!(
            criteria = self.criteria.len(),
            statements = statements.len(),
            "compiled statement set"
        );
        let mut sets = Vec::new();
        for statement in &statements {
            sets.extend(statement.run().await?);
        }
        let result = collapse(sets, self.result_option)?;
        self.results = Some(result.clone());
        Ok(result)
    }

    fn results(&self) -> Result<&ResultSet, VeloxError> {
        self.results.as_ref().ok_or(VeloxError::ResultsNotAvailable)
    }

    fn clear(&mut self) {
        self.criteria.clear();
        self.results = None;
    }

    fn query_type(&self) -> QueryType {
        self.query_type
    }

    fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    fn set_connection(&mut self, connection: ConnectionHandle) {
        self.connection = Some(connection);
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Criteria
    }

    fn prepare(&self) -> Result<(), VeloxError> {
        self.compile().map(drop)
    }

    fn add_criterion(&mut self, criterion: Criterion) -> Result<(), VeloxError> {
        self.criteria.push(criterion);
        Ok(())
    }

    fn bind_all(&mut self, name: &str, value: Value) -> Result<(), VeloxError> {
        if self.criteria.is_empty() {
            self.criteria.push(Criterion::new());
        }
        for criterion in &mut self.criteria {
            criterion.values.insert(name.to_owned(), value.clone());
        }
        Ok(())
    }
}
