//! In-process document engine shared by every store backend.
//!
//! Documents are plain `serde_json` objects. This module owns the small query
//! subset the proxy supports: filter matching, update operators, projection
//! and aggregation stages.

pub mod aggregate;
pub mod compare;
pub mod error;
pub mod matcher;
pub mod projection;
pub mod update;

use serde_json::{Map, Value};
use uuid::Uuid;

pub use error::QueryError;

/// A stored document
pub type Document = Map<String, Value>;

/// Field every stored document carries
pub const ID_FIELD: &str = "_id";

/// Generate a 24 hex character document id
pub fn new_document_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..24].to_string()
}

/// Assign an `_id` when the document does not bring its own
pub fn ensure_id(doc: &mut Document) {
    if !doc.contains_key(ID_FIELD) {
        doc.insert(ID_FIELD.to_string(), Value::String(new_document_id()));
    }
}

/// Accept either a single object or an array of objects as insert payload
pub fn documents_from_value(value: Value) -> Result<Vec<Document>, QueryError> {
    match value {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(QueryError::InvalidDocument(format!(
                    "documents must be objects, got {}",
                    type_name(&other)
                ))),
            })
            .collect(),
        other => Err(QueryError::InvalidDocument(format!(
            "document must be an object or an array of objects, got {}",
            type_name(&other)
        ))),
    }
}

/// Resolve a dotted path (`a.b.c`) inside a document
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => {
                let index: usize = part.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Set a dotted path, creating intermediate objects as needed
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), QueryError> {
    let parts: Vec<&str> = path.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| QueryError::InvalidPath(path.to_string()))?;

    let mut current = doc;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(QueryError::InvalidPath(format!(
                    "cannot create field '{}' in '{}': parent is not an object",
                    last, path
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Remove a dotted path, returning the previous value
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let parts: Vec<&str> = path.split('.').collect();
    let (last, parents) = parts.split_last()?;

    let mut current = doc;
    for part in parents {
        current = match current.get_mut(*part)? {
            Value::Object(map) => map,
            _ => return None,
        };
    }
    current.remove(*last)
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
