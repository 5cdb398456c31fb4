//! Condition evaluation for decision nodes
//!
//! Supports:
//! - `node_id.key == literal` / `!=`
//! - `node_id.key > n`, `<`, `>=`, `<=` (numeric)
//! - bare `node_id.key` truthiness

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::engine::context::RunContext;

static CONDITION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-]+)\s*(?:(==|!=|>=|<=|>|<)\s*(.+?))?\s*$")
        .unwrap()
});

/// Errors that can occur while evaluating a decision condition
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("Invalid condition syntax: {0}")]
    InvalidSyntax(String),

    #[error("Cannot order non-numeric values in: {0}")]
    NotComparable(String),
}

/// Evaluate a condition string against the run context.
///
/// The left-hand side always references a context slot as `node_id.key`; an
/// absent slot or key evaluates as null (falsy, never equal to a literal).
pub async fn evaluate_condition(
    condition: &str,
    ctx: &RunContext,
) -> Result<bool, ConditionError> {
    let caps = CONDITION_REGEX
        .captures(condition)
        .ok_or_else(|| ConditionError::InvalidSyntax(condition.to_string()))?;

    let node_id = caps.get(1).unwrap().as_str();
    let key = caps.get(2).unwrap().as_str();
    let value = ctx
        .get_value(node_id, key)
        .await
        .unwrap_or(Value::Null);

    let Some(op) = caps.get(3) else {
        return Ok(is_truthy(&value));
    };
    let literal = parse_literal(caps.get(4).unwrap().as_str());

    match op.as_str() {
        "==" => Ok(loosely_equal(&value, &literal)),
        "!=" => Ok(!loosely_equal(&value, &literal)),
        op => {
            let (left, right) = match (
                as_comparable_number(&value),
                as_comparable_number(&literal),
            ) {
                (Some(left), Some(right)) => (left, right),
                _ => return Err(ConditionError::NotComparable(condition.to_string())),
            };
            Ok(match op {
                ">" => left > right,
                "<" => left < right,
                ">=" => left >= right,
                "<=" => left <= right,
                _ => unreachable!("operator set fixed by regex"),
            })
        }
    }
}

/// Parse the right-hand literal: quoted string, bool, null, number, or a
/// bare word treated as a string.
fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
    if let Some(s) = unquoted {
        return Value::String(s.to_string());
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => serde_json::from_str::<serde_json::Number>(raw)
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

/// Equality that tolerates the editor storing numbers as strings.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    if let (Some(l), Some(r)) = (as_comparable_number(left), as_comparable_number(right)) {
        return l == r;
    }
    match (left, right) {
        (Value::String(s), other) | (other, Value::String(s)) => match other {
            Value::Bool(b) => s == &b.to_string(),
            _ => false,
        },
        _ => false,
    }
}

fn as_comparable_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
