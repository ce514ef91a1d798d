//! Transition condition evaluation.
//!
//! A condition compares one value, addressed by a dotted path into the
//! evaluation context, against a literal. The context is
//! `{"request_data": <payload>, "decision_data": <decision context>}`.
//! Anything that cannot be compared evaluates to `false`.

use serde_json::{Value, json};
use signoff_types::definition::{ConditionOperator, TransitionCondition};

/// Build the evaluation context for a decision.
pub fn decision_context(request_data: &Value, decision_data: Option<&Value>) -> Value {
    json!({
        "request_data": request_data,
        "decision_data": decision_data.cloned().unwrap_or_else(|| json!({})),
    })
}

/// Resolve a dotted path such as `request_data.amount` or `decision_data.tags.0`.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn evaluate(condition: &TransitionCondition, context: &Value) -> bool {
    let actual = lookup(context, &condition.field).unwrap_or(&Value::Null);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Eq => values_equal(actual, expected),
        ConditionOperator::Ne => !values_equal(actual, expected),
        ConditionOperator::Gt => compare(actual, expected).is_some_and(|o| o.is_gt()),
        ConditionOperator::Lt => compare(actual, expected).is_some_and(|o| o.is_lt()),
        ConditionOperator::Ge => compare(actual, expected).is_some_and(|o| o.is_ge()),
        ConditionOperator::Le => compare(actual, expected).is_some_and(|o| o.is_le()),
        ConditionOperator::In => contains(expected, actual),
        ConditionOperator::Contains => contains(actual, expected),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numeric comparison, falling back to string comparison when both sides
/// are strings that do not parse as numbers.
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Whether `haystack` contains `needle`: array membership or substring.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
        _ => false,
    }
}
