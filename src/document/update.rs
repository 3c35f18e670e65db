use serde_json::{Number, Value};

use super::compare::values_equal;
use super::error::QueryError;
use super::matcher::is_operator_object;
use super::{get_path, remove_path, set_path, Document, ID_FIELD};

/// Shape of an update document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// `{"$set": {...}, "$inc": {...}}`
    Operators,
    /// A whole new document body, `_id` is preserved
    Replacement,
}

/// Classify an update document, rejecting anything that is neither form
pub fn classify(update: &Value) -> Result<UpdateKind, QueryError> {
    match update {
        Value::Object(map) if map.is_empty() => Ok(UpdateKind::Replacement),
        Value::Object(_) => match is_operator_object(update) {
            Ok(true) => Ok(UpdateKind::Operators),
            Ok(false) => Ok(UpdateKind::Replacement),
            Err(_) => Err(QueryError::InvalidUpdate(
                "update document cannot mix operators and fields".to_string(),
            )),
        },
        other => Err(QueryError::InvalidUpdate(format!(
            "update must be an object, got {}",
            super::type_name(other)
        ))),
    }
}

/// Apply an update document to `doc` in place
pub fn apply(doc: &mut Document, update: &Value) -> Result<(), QueryError> {
    match classify(update)? {
        UpdateKind::Replacement => {
            let id = doc.get(ID_FIELD).cloned();
            let mut replacement = update.as_object().cloned().unwrap_or_default();
            match (id, replacement.get(ID_FIELD)) {
                (Some(existing), Some(incoming)) if !values_equal(&existing, incoming) => {
                    return Err(QueryError::InvalidUpdate(
                        "the _id field cannot be changed".to_string(),
                    ));
                }
                (Some(existing), None) => {
                    replacement.insert(ID_FIELD.to_string(), existing);
                }
                _ => {}
            }
            *doc = replacement;
            Ok(())
        }
        UpdateKind::Operators => {
            if let Value::Object(ops) = update {
                for (op, fields) in ops {
                    let fields = fields.as_object().ok_or_else(|| {
                        QueryError::InvalidUpdate(format!("{} needs an object of fields", op))
                    })?;
                    for (path, operand) in fields {
                        if path == ID_FIELD {
                            return Err(QueryError::InvalidUpdate(
                                "the _id field cannot be changed".to_string(),
                            ));
                        }
                        apply_operator(doc, op, path, operand)?;
                    }
                }
            }
            Ok(())
        }
    }
}

fn apply_operator(doc: &mut Document, op: &str, path: &str, operand: &Value) -> Result<(), QueryError> {
    match op {
        "$set" => set_path(doc, path, operand.clone()),
        "$unset" => {
            remove_path(doc, path);
            Ok(())
        }
        "$inc" => {
            let delta = operand.as_f64().ok_or_else(|| {
                QueryError::InvalidUpdate(format!("cannot $inc by a non-numeric value at '{}'", path))
            })?;
            let next = match get_path(doc, path) {
                None => operand.clone(),
                Some(Value::Number(current)) => add_numbers(current, operand, delta),
                Some(_) => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "cannot $inc non-numeric field '{}'",
                        path
                    )))
                }
            };
            set_path(doc, path, next)
        }
        "$push" | "$addToSet" => {
            let mut items = match get_path(doc, path) {
                None => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(_) => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "cannot {} to non-array field '{}'",
                        op, path
                    )))
                }
            };
            if op == "$push" || !items.iter().any(|item| values_equal(item, operand)) {
                items.push(operand.clone());
            }
            set_path(doc, path, Value::Array(items))
        }
        "$pull" => {
            match get_path(doc, path) {
                None => {}
                Some(Value::Array(items)) => {
                    let kept: Vec<Value> = items
                        .iter()
                        .filter(|item| !values_equal(item, operand))
                        .cloned()
                        .collect();
                    set_path(doc, path, Value::Array(kept))?;
                }
                Some(_) => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "cannot $pull from non-array field '{}'",
                        path
                    )))
                }
            }
            Ok(())
        }
        other => Err(QueryError::UnknownOperator(other.to_string())),
    }
}

fn add_numbers(current: &Number, operand: &Value, delta: f64) -> Value {
    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta;
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}

/// Starting document for an upsert: the plain equality fields of the query
pub fn upsert_seed(query: &Value) -> Result<Document, QueryError> {
    let mut seed = Document::new();
    if let Value::Object(clauses) = query {
        for (key, value) in clauses {
            if key.starts_with('$') {
                continue;
            }
            if is_operator_object(value)? {
                if let Some(eq) = value.get("$eq") {
                    set_path(&mut seed, key, eq.clone())?;
                }
                continue;
            }
            set_path(&mut seed, key, value.clone())?;
        }
    }
    Ok(seed)
}
