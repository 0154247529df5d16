//! Wire-level description of select/update/insert/delete operations.
//!
//! A [`Criterion`] is one `{ where, values }` descriptor: `where` is an OR-list of AND-groups,
//! each group mapping a column to `[operator, operand...]`; `values` maps columns to the values
//! written by INSERT/UPDATE. A [`Diff`] bundles four such lists:
//!
//! ```rust
//! use velox_sql::prelude::*;
//!
//! let diff: Diff = serde_json::from_str(
//!     r#"{"select":[{"where":[{"city":["=","Falls City"],"state":["=","TX"]}]}]}"#,
//! )
//! .unwrap();
//! assert_eq!(diff.select.len(), 1);
//! assert!(diff.update.is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::VeloxError;
use crate::types::{ParameterSet, Value};

static COLUMN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("column name pattern is valid")
});

/// Reject anything that is not a plain or table-qualified identifier.
///
/// # Errors
/// Returns `VeloxError::InvalidColumn`.
pub fn validate_column(name: &str) -> Result<(), VeloxError> {
    if COLUMN_NAME.is_match(name) {
        Ok(())
    } else {
        Err(VeloxError::InvalidColumn(name.to_owned()))
    }
}

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    NotEq,
    Between,
    NotBetween,
    In,
    NotIn,
    Like,
    NotLike,
}

impl Operator {
    /// Parse an operator, ignoring case and repeated whitespace (`not  in` is `NOT IN`).
    ///
    /// # Errors
    /// Returns `VeloxError::UnsupportedOperator` for anything outside the supported set.
    pub fn parse(raw: &str) -> Result<Self, VeloxError> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Gte,
            "<=" => Operator::Lte,
            "<>" => Operator::NotEq,
            "BETWEEN" => Operator::Between,
            "NOT BETWEEN" => Operator::NotBetween,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            _ => return Err(VeloxError::UnsupportedOperator(raw.to_owned())),
        };
        Ok(op)
    }

    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::NotEq => "<>",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
        }
    }

    #[must_use]
    pub fn is_range(self) -> bool {
        matches!(self, Operator::Between | Operator::NotBetween)
    }

    #[must_use]
    pub fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Scalar(Value),
    List(Vec<Value>),
}

impl Operand {
    fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Array(items) => Operand::List(items.into_iter().map(Value::from).collect()),
            other => Operand::Scalar(Value::from(other)),
        }
    }
}

impl From<Operand> for JsonValue {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Scalar(v) => v.into(),
            Operand::List(vs) => JsonValue::Array(vs.into_iter().map(Into::into).collect()),
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Scalar(value)
    }
}

/// `[operator, operand...]` as it appears on the wire.
///
/// The operator is kept verbatim so that an unsupported one is reported at compile time with a
/// proper error code rather than as a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<JsonValue>", into = "Vec<JsonValue>")]
pub struct Condition {
    pub operator: String,
    pub operands: Vec<Operand>,
}

impl Condition {
    pub fn new(operator: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            operator: operator.into(),
            operands,
        }
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Self::compare("=", value)
    }

    pub fn compare(operator: &str, value: impl Into<Value>) -> Self {
        Self::new(operator, vec![Operand::Scalar(value.into())])
    }

    pub fn like(pattern: impl Into<String>) -> Self {
        Self::new("LIKE", vec![Operand::Scalar(Value::Text(pattern.into()))])
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(
            "BETWEEN",
            vec![Operand::Scalar(low.into()), Operand::Scalar(high.into())],
        )
    }

    pub fn is_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new("IN", vec![Operand::List(values.into_iter().map(Into::into).collect())])
    }

    pub fn not_in<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(
            "NOT IN",
            vec![Operand::List(values.into_iter().map(Into::into).collect())],
        )
    }

    /// Check operator membership and operand arity for `column`, returning the parsed operator.
    ///
    /// # Errors
    /// `UnsupportedOperator`, `BetweenOperands`, `InOperand` or `OperandCount`.
    pub fn validate(&self, column: &str) -> Result<Operator, VeloxError> {
        let op = Operator::parse(&self.operator)?;
        let scalars = self
            .operands
            .iter()
            .all(|o| matches!(o, Operand::Scalar(_)));
        let ok = if op.is_range() {
            self.operands.len() == 2 && scalars
        } else if op.is_membership() {
            matches!(self.operands.as_slice(), [Operand::List(items)] if !items.is_empty())
        } else {
            self.operands.len() == 1 && scalars
        };
        if ok {
            return Ok(op);
        }
        let column = column.to_owned();
        let operator = op.to_string();
        Err(if op.is_range() {
            VeloxError::BetweenOperands { column, operator }
        } else if op.is_membership() {
            VeloxError::InOperand { column, operator }
        } else {
            VeloxError::OperandCount { column, operator }
        })
    }

    /// Operand values flattened in placeholder order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.operands.iter().flat_map(|o| match o {
            Operand::Scalar(v) => std::slice::from_ref(v),
            Operand::List(vs) => vs.as_slice(),
        })
    }
}

impl TryFrom<Vec<JsonValue>> for Condition {
    type Error = String;

    fn try_from(mut raw: Vec<JsonValue>) -> Result<Self, Self::Error> {
        if raw.is_empty() {
            return Err("condition must be [operator, operand...]".into());
        }
        let operands = raw.split_off(1);
        match raw.pop() {
            Some(JsonValue::String(operator)) => Ok(Self {
                operator,
                operands: operands.into_iter().map(Operand::from_json).collect(),
            }),
            other => Err(format!("condition operator must be a string, got {other:?}")),
        }
    }
}

impl From<Condition> for Vec<JsonValue> {
    fn from(condition: Condition) -> Self {
        std::iter::once(JsonValue::String(condition.operator))
            .chain(condition.operands.into_iter().map(JsonValue::from))
            .collect()
    }
}

/// Conditions AND-ed together, keyed by column.
pub type WhereGroup = BTreeMap<String, Condition>;

/// One `{ where, values }` descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// OR-ed groups; empty means "no filter".
    #[serde(rename = "where", default)]
    pub where_groups: Vec<WhereGroup>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Criterion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// AND a condition into the current (last) group, opening one if needed.
    #[must_use]
    pub fn with_condition(mut self, column: impl Into<String>, condition: Condition) -> Self {
        if self.where_groups.is_empty() {
            self.where_groups.push(WhereGroup::new());
        }
        if let Some(group) = self.where_groups.last_mut() {
            group.insert(column.into(), condition);
        }
        self
    }

    /// Start a new OR-ed group; following conditions go there.
    #[must_use]
    pub fn or(mut self) -> Self {
        self.where_groups.push(WhereGroup::new());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: WhereGroup) -> Self {
        self.where_groups.push(group);
        self
    }

    /// Flatten into named parameters for a hand-written statement: the `values` plus the
    /// equality conditions of a single where group, keyed by column.
    ///
    /// # Errors
    /// `InvalidInput` for more than one where group or a non-equality condition.
    pub fn into_parameter_set(self) -> Result<ParameterSet, VeloxError> {
        if self.where_groups.len() > 1 {
            return Err(VeloxError::InvalidInput(
                "parameter sets take at most one where group".into(),
            ));
        }
        let mut set: ParameterSet = self.values;
        for (column, condition) in self.where_groups.into_iter().flatten() {
            let op = condition.validate(&column)?;
            if op != Operator::Eq {
                return Err(VeloxError::InvalidInput(format!(
                    "parameter sets only take '=' conditions, got {op} on {column}"
                )));
            }
            if let Some(Operand::Scalar(value)) = condition.operands.into_iter().next() {
                set.insert(column, value);
            }
        }
        Ok(set)
    }
}

/// A combined change description; each list defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub select: Vec<Criterion>,
    #[serde(default)]
    pub update: Vec<Criterion>,
    #[serde(default)]
    pub insert: Vec<Criterion>,
    #[serde(default)]
    pub delete: Vec<Criterion>,
}

impl Diff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.select.is_empty()
            && self.update.is_empty()
            && self.insert.is_empty()
            && self.delete.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_parsing_is_case_and_space_insensitive() {
        assert_eq!(Operator::parse("not   between").unwrap(), Operator::NotBetween);
        assert_eq!(Operator::parse("Like").unwrap(), Operator::Like);
        assert_eq!(Operator::parse("!=").unwrap_err().code(), 2002);
    }

    #[test]
    fn column_names() {
        assert!(validate_column("addresses.city").is_ok());
        assert!(validate_column("_id2").is_ok());
        for bad in ["1a", "a b", "a;drop", "a.b.c", ""] {
            assert_eq!(validate_column(bad).unwrap_err().code(), 2006, "{bad}");
        }
    }

    #[test]
    fn condition_arity_checks() {
        assert!(Condition::between(1, 5).validate("n").is_ok());
        let one = Condition::new("BETWEEN", vec![Operand::from(Value::Int(1))]);
        assert_eq!(one.validate("n").unwrap_err().code(), 2003);

        let scalar_in = Condition::new("IN", vec![Operand::from(Value::Int(1))]);
        assert_eq!(scalar_in.validate("n").unwrap_err().code(), 2004);
        let empty_in = Condition::is_in(Vec::<i64>::new());
        assert_eq!(empty_in.validate("n").unwrap_err().code(), 2004);

        let two_eq = Condition::new("=", vec![Operand::from(Value::Int(1)), Operand::from(Value::Int(2))]);
        assert_eq!(two_eq.validate("n").unwrap_err().code(), 2005);
    }

    #[test]
    fn condition_wire_format() {
        let cond: Condition = serde_json::from_str(r#"["in", [1, 2, 3]]"#).unwrap();
        assert_eq!(cond.operator, "in");
        assert_eq!(cond.values().count(), 3);
        assert_eq!(
            serde_json::to_string(&Condition::between(1, 2)).unwrap(),
            r#"["BETWEEN",1,2]"#
        );
        assert!(serde_json::from_str::<Condition>("[]").is_err());
        assert!(serde_json::from_str::<Condition>("[1, 2]").is_err());
    }

    #[test]
    fn criterion_builder_and_parameter_flattening() {
        let c = Criterion::new()
            .with_value("city", "Austin")
            .with_condition("id", Condition::eq(4));
        let set = c.clone().into_parameter_set().unwrap();
        assert_eq!(set["id"], Value::Int(4));
        assert_eq!(set["city"], Value::Text("Austin".into()));

        let ranged = Criterion::new().with_condition("id", Condition::compare(">", 1));
        assert_eq!(ranged.into_parameter_set().unwrap_err().code(), 2009);

        let two = c.or().with_condition("id", Condition::eq(5));
        assert_eq!(two.where_groups.len(), 2);
        assert!(two.into_parameter_set().is_err());
    }

    #[test]
    fn diff_defaults_missing_lists() {
        let diff: Diff = serde_json::from_str(r#"{"insert":[{"values":{"id":1}}]}"#).unwrap();
        assert!(diff.select.is_empty() && diff.delete.is_empty());
        assert_eq!(diff.insert[0].values["id"], Value::Int(1));
        assert!(Diff::default().is_empty());
    }
}
