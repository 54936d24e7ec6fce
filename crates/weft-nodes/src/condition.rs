//! Branch condition evaluation.
//!
//! Evaluation is total: a missing variable, a null value, or a comparison
//! between incompatible types yields `false` instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    #[default]
    Contains,
    Equals,
    NumberEquals,
    GreaterThan,
    LessThan,
    StartsWith,
    NotStartsWith,
    IsEmpty,
    IsNotEmpty,
}

/// How a condition's result joins the accumulated result of the
/// conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    #[serde(default)]
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "logicalOperator", alias = "logical_operator")]
    pub logical_operator: LogicalOperator,
}

impl Condition {
    pub fn new(variable: impl Into<String>, operator: ComparisonOperator, value: Value) -> Self {
        Self {
            variable: variable.into(),
            operator,
            value,
            logical_operator: LogicalOperator::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.logical_operator = LogicalOperator::Or;
        self
    }
}

/// One routing branch: a chain of conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchCondition {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl BranchCondition {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }
}

/// Evaluate one condition against a mapping of variables.
///
/// Evaluates to false when the variable name is empty, the variable is
/// missing or null, or a numeric operator meets a non-numeric side. Booleans
/// count as non-numeric, so `true greater_than 0` is false.
pub fn evaluate_condition(variables: &Value, condition: &Condition) -> bool {
    if condition.variable.is_empty() {
        return false;
    }
    let actual = match variables.get(&condition.variable) {
        Some(Value::Null) | None => return false,
        Some(v) => v,
    };
    let expected = &condition.value;

    match condition.operator {
        ComparisonOperator::Contains => render(actual).contains(render(expected).as_str()),
        ComparisonOperator::Equals => render(actual) == render(expected),
        ComparisonOperator::NumberEquals => compare_numbers(actual, expected, |a, b| a == b),
        ComparisonOperator::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
        ComparisonOperator::LessThan => compare_numbers(actual, expected, |a, b| a < b),
        ComparisonOperator::StartsWith => render(actual).starts_with(render(expected).as_str()),
        ComparisonOperator::NotStartsWith => {
            !render(actual).starts_with(render(expected).as_str())
        }
        ComparisonOperator::IsEmpty => is_falsy(actual),
        ComparisonOperator::IsNotEmpty => !is_falsy(actual),
    }
}

/// Evaluate a branch's conditions left to right.
///
/// Every condition is evaluated; results are folded with each condition's
/// own logical operator. An empty chain is true.
pub fn evaluate_branch(variables: &Value, conditions: &[Condition]) -> bool {
    let mut results = conditions
        .iter()
        .map(|c| (c.logical_operator, evaluate_condition(variables, c)));
    let Some((_, first)) = results.next() else {
        return true;
    };
    results.fold(first, |acc, (op, result)| match op {
        LogicalOperator::And => acc & result,
        LogicalOperator::Or => acc | result,
    })
}

/// Pick the 1-based branch to route to.
///
/// Branch 1 is the default; branches 2..N are tried in order and the first
/// match wins.
pub fn select_branch(branches: &[BranchCondition], variables: &Value) -> usize {
    branches
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, branch)| evaluate_branch(variables, &branch.conditions))
        .map(|(i, _)| i + 1)
        .unwrap_or(1)
}

/// String form used by the text operators: strings verbatim, all else as
/// compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn compare_numbers(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
