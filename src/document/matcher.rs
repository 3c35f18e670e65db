use std::cmp::Ordering;

use serde_json::Value;

use super::compare::{compare_same_type, values_equal};
use super::error::QueryError;
use super::{get_path, Document};

/// Check that a filter only uses supported operators without evaluating it
pub fn validate(filter: &Value) -> Result<(), QueryError> {
    matches(&Document::new(), filter).map(|_| ())
}

/// Evaluate a filter document against a stored document.
/// `null` matches everything, like an omitted query.
pub fn matches(doc: &Document, filter: &Value) -> Result<bool, QueryError> {
    match filter {
        Value::Null => Ok(true),
        Value::Object(clauses) => {
            // Evaluate every clause so unsupported operators are reported even after a miss
            let mut all = true;
            for (key, value) in clauses {
                let hit = if key.starts_with('$') {
                    logical(doc, key, value)?
                } else {
                    field(doc, key, value)?
                };
                all &= hit;
            }
            Ok(all)
        }
        other => Err(QueryError::BadQuery(format!(
            "filter must be an object, got {}",
            super::type_name(other)
        ))),
    }
}

fn logical(doc: &Document, op: &str, value: &Value) -> Result<bool, QueryError> {
    let branches = || {
        value
            .as_array()
            .filter(|arr| !arr.is_empty())
            .ok_or_else(|| QueryError::BadQuery(format!("{} must be a nonempty array", op)))
    };
    match op {
        "$and" => {
            let mut all = true;
            for branch in branches()? {
                all &= matches(doc, branch)?;
            }
            Ok(all)
        }
        "$or" | "$nor" => {
            let mut any = false;
            for branch in branches()? {
                any |= matches(doc, branch)?;
            }
            Ok(if op == "$or" { any } else { !any })
        }
        other => Err(QueryError::UnknownOperator(other.to_string())),
    }
}

/// `true` when an object value is an operator expression (`{"$gt": 1}`)
pub fn is_operator_object(value: &Value) -> Result<bool, QueryError> {
    let Value::Object(map) = value else {
        return Ok(false);
    };
    if map.is_empty() {
        return Ok(false);
    }
    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        Ok(false)
    } else if operators == map.len() {
        Ok(true)
    } else {
        Err(QueryError::BadQuery(
            "cannot mix operators and literal fields in one expression".to_string(),
        ))
    }
}

fn field(doc: &Document, path: &str, condition: &Value) -> Result<bool, QueryError> {
    let actual = get_path(doc, path);
    if is_operator_object(condition)? {
        let mut all = true;
        if let Value::Object(ops) = condition {
            for (op, operand) in ops {
                all &= operator(actual, op, operand)?;
            }
        }
        Ok(all)
    } else {
        Ok(equals(actual, condition))
    }
}

/// Equality with array-element semantics and `null` matching missing fields
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) => {
            values_equal(value, expected)
                || matches!(value, Value::Array(items) if items.iter().any(|item| values_equal(item, expected)))
        }
    }
}

fn range(actual: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|value| compare_same_type(value, operand))
        .map(accept)
        .unwrap_or(false)
}

fn operator(actual: Option<&Value>, op: &str, operand: &Value) -> Result<bool, QueryError> {
    Ok(match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$gt" => range(actual, operand, |o| o == Ordering::Greater),
        "$gte" => range(actual, operand, |o| o != Ordering::Less),
        "$lt" => range(actual, operand, |o| o == Ordering::Less),
        "$lte" => range(actual, operand, |o| o != Ordering::Greater),
        "$in" | "$nin" => {
            let candidates = operand
                .as_array()
                .ok_or_else(|| QueryError::BadQuery(format!("{} needs an array", op)))?;
            let found = candidates.iter().any(|candidate| equals(actual, candidate));
            if op == "$in" { found } else { !found }
        }
        "$exists" => {
            let wanted = match operand {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
                Value::Null => false,
                _ => true,
            };
            actual.is_some() == wanted
        }
        "$not" => {
            if !is_operator_object(operand)? {
                return Err(QueryError::BadQuery("$not needs an operator expression".to_string()));
            }
            let mut all = true;
            if let Value::Object(ops) = operand {
                for (inner, inner_operand) in ops {
                    all &= operator(actual, inner, inner_operand)?;
                }
            }
            !all
        }
        other => return Err(QueryError::UnknownOperator(other.to_string())),
    })
}
