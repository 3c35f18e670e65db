use serde_json::Value;

use super::error::QueryError;
use super::{get_path, remove_path, set_path, Document, ID_FIELD};

fn is_truthy(value: &Value) -> Result<bool, QueryError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        other => Err(QueryError::InvalidProjection(format!(
            "projection values must be booleans or numbers, got {}",
            super::type_name(other)
        ))),
    }
}

/// Apply a projection (`{"a": 1, "_id": 0}`) to a document.
/// A `null` or empty projection returns the document unchanged.
pub fn project(doc: Document, projection: &Value) -> Result<Document, QueryError> {
    let spec = match projection {
        Value::Null => return Ok(doc),
        Value::Object(spec) if spec.is_empty() => return Ok(doc),
        Value::Object(spec) => spec,
        Value::Array(fields) => {
            // pymongo style: a list of field names to include
            let mut out = Document::new();
            if let Some(id) = doc.get(ID_FIELD) {
                out.insert(ID_FIELD.to_string(), id.clone());
            }
            for field in fields {
                let path = field.as_str().ok_or_else(|| {
                    QueryError::InvalidProjection("field lists must contain strings".to_string())
                })?;
                if let Some(value) = get_path(&doc, path) {
                    set_path(&mut out, path, value.clone())?;
                }
            }
            return Ok(out);
        }
        other => {
            return Err(QueryError::InvalidProjection(format!(
                "projection must be an object, got {}",
                super::type_name(other)
            )))
        }
    };

    let mut include_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (path, flag) in spec {
        let keep = is_truthy(flag)?;
        if path == ID_FIELD {
            include_id = keep;
        } else if keep {
            included.push(path.as_str());
        } else {
            excluded.push(path.as_str());
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        return Err(QueryError::InvalidProjection(
            "cannot mix inclusion and exclusion in one projection".to_string(),
        ));
    }

    if included.is_empty() {
        let mut out = doc;
        for path in excluded {
            remove_path(&mut out, path);
        }
        if !include_id {
            out.remove(ID_FIELD);
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if include_id {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
    }
    for path in included {
        if let Some(value) = get_path(&doc, path) {
            set_path(&mut out, path, value.clone())?;
        }
    }
    Ok(out)
}
