use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::compare::{total_cmp, values_equal};
use super::error::QueryError;
use super::{get_path, matcher, projection, set_path, Document, ID_FIELD};

/// Accept a pipeline as a bare array of stages or as `{"pipeline": [...]}`
pub fn pipeline_from_value(value: Value) -> Result<Vec<Value>, QueryError> {
    match value {
        Value::Array(stages) => Ok(stages),
        Value::Object(mut map) => match map.remove("pipeline") {
            Some(Value::Array(stages)) => Ok(stages),
            Some(_) => Err(QueryError::InvalidPipeline("pipeline must be an array".to_string())),
            None if map.is_empty() => Ok(Vec::new()),
            // A single stage object
            None => Ok(vec![Value::Object(map)]),
        },
        _ => Err(QueryError::InvalidPipeline("pipeline must be an array".to_string())),
    }
}

/// Split a stage document into its single operator and argument
fn stage_parts(stage: &Value) -> Result<(&str, &Value), QueryError> {
    match stage {
        Value::Object(map) if map.len() == 1 => {
            let (name, arg) = map.iter().next().ok_or_else(|| {
                QueryError::InvalidPipeline("stage must have exactly one field".to_string())
            })?;
            Ok((name.as_str(), arg))
        }
        _ => Err(QueryError::InvalidPipeline(
            "each pipeline stage must be an object with exactly one field".to_string(),
        )),
    }
}

/// Leading `$match` stages, which a backend may push down into its own query
pub fn leading_match(stages: &[Value]) -> Option<&Value> {
    stages.first().and_then(|stage| match stage_parts(stage) {
        Ok(("$match", filter)) => Some(filter),
        _ => None,
    })
}

/// Validate every stage name and argument shape without running the pipeline
pub fn validate(stages: &[Value]) -> Result<(), QueryError> {
    run(Vec::new(), stages).map(|_| ())
}

/// Run an aggregation pipeline over a set of documents
pub fn run(mut docs: Vec<Document>, stages: &[Value]) -> Result<Vec<Document>, QueryError> {
    for stage in stages {
        let (name, arg) = stage_parts(stage)?;
        docs = match name {
            "$match" => {
                matcher::validate(arg)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matcher::matches(&doc, arg)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => project_stage(docs, arg)?,
            "$sort" => sort_stage(docs, arg)?,
            "$skip" => {
                let n = count_arg(name, arg, true)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = count_arg(name, arg, false)?;
                docs.into_iter().take(n).collect()
            }
            "$count" => count_stage(docs, arg)?,
            "$unwind" => unwind_stage(docs, arg)?,
            "$group" => group_stage(docs, arg)?,
            other => return Err(QueryError::UnknownStage(other.to_string())),
        };
    }
    Ok(docs)
}

fn count_arg(name: &str, arg: &Value, allow_zero: bool) -> Result<usize, QueryError> {
    let n = arg
        .as_u64()
        .ok_or_else(|| QueryError::InvalidPipeline(format!("{} requires a non-negative integer", name)))?;
    if n == 0 && !allow_zero {
        return Err(QueryError::InvalidPipeline(format!("{} must be positive", name)));
    }
    Ok(n as usize)
}

/// Evaluate an expression: `"$path"` references a field, objects evaluate per key,
/// everything else is a literal
fn evaluate(doc: &Document, expr: &Value) -> Value {
    match expr {
        Value::String(s) if s.starts_with('$') => get_path(doc, &s[1..]).cloned().unwrap_or(Value::Null),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), evaluate(doc, v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn project_stage(docs: Vec<Document>, arg: &Value) -> Result<Vec<Document>, QueryError> {
    let spec = arg
        .as_object()
        .ok_or_else(|| QueryError::InvalidPipeline("$project requires an object".to_string()))?;

    let mut flags = Map::new();
    let mut computed = Map::new();
    for (path, value) in spec {
        match value {
            Value::Bool(_) | Value::Number(_) => {
                flags.insert(path.clone(), value.clone());
            }
            _ => {
                computed.insert(path.clone(), value.clone());
            }
        }
    }

    if computed.is_empty() {
        let flags = Value::Object(flags);
        return docs.into_iter().map(|doc| projection::project(doc, &flags)).collect();
    }

    let include_id = flags.get(ID_FIELD).map(truthy).unwrap_or(true);
    let mut included = Vec::new();
    for (path, flag) in &flags {
        if path == ID_FIELD {
            continue;
        }
        if !truthy(flag) {
            return Err(QueryError::InvalidProjection(
                "cannot exclude fields alongside computed fields".to_string(),
            ));
        }
        included.push(path.clone());
    }

    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let mut shaped = Document::new();
        if include_id {
            if let Some(id) = doc.get(ID_FIELD) {
                shaped.insert(ID_FIELD.to_string(), id.clone());
            }
        }
        for path in &included {
            if let Some(value) = get_path(&doc, path) {
                set_path(&mut shaped, path, value.clone())?;
            }
        }
        for (path, expr) in &computed {
            set_path(&mut shaped, path, evaluate(&doc, expr))?;
        }
        out.push(shaped);
    }
    Ok(out)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => true,
    }
}

fn sort_stage(mut docs: Vec<Document>, arg: &Value) -> Result<Vec<Document>, QueryError> {
    let spec = arg
        .as_object()
        .filter(|spec| !spec.is_empty())
        .ok_or_else(|| QueryError::InvalidPipeline("$sort requires a non-empty object".to_string()))?;

    let mut keys = Vec::with_capacity(spec.len());
    for (path, direction) in spec {
        let descending = match direction.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => {
                return Err(QueryError::InvalidPipeline(format!(
                    "$sort key '{}' must be 1 or -1",
                    path
                )))
            }
        };
        keys.push((path.as_str(), descending));
    }

    let null = Value::Null;
    docs.sort_by(|a, b| {
        for (path, descending) in &keys {
            let left = get_path(a, path).unwrap_or(&null);
            let right = get_path(b, path).unwrap_or(&null);
            let ord = total_cmp(left, right);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(docs)
}

fn count_stage(docs: Vec<Document>, arg: &Value) -> Result<Vec<Document>, QueryError> {
    let field = arg
        .as_str()
        .filter(|f| !f.is_empty() && !f.starts_with('$') && !f.contains('.'))
        .ok_or_else(|| QueryError::InvalidPipeline("$count requires a plain field name".to_string()))?;
    if docs.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Document::new();
    out.insert(field.to_string(), Value::from(docs.len() as u64));
    Ok(vec![out])
}

fn unwind_stage(docs: Vec<Document>, arg: &Value) -> Result<Vec<Document>, QueryError> {
    let (path, preserve) = match arg {
        Value::String(path) => (path.as_str(), false),
        Value::Object(opts) => (
            opts.get("path").and_then(Value::as_str).unwrap_or_default(),
            opts.get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
        _ => ("", false),
    };
    let path = path
        .strip_prefix('$')
        .filter(|p| !p.is_empty())
        .ok_or_else(|| QueryError::InvalidPipeline("$unwind requires a '$field' path".to_string()))?;

    let mut out = Vec::new();
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item)?;
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

/// Running state of one accumulator inside one group
enum Accumulator {
    Sum(f64, bool),
    Avg(f64, u64),
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, QueryError> {
        Ok(match op {
            "$sum" => Accumulator::Sum(0.0, true),
            "$avg" => Accumulator::Avg(0.0, 0),
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Value::Null),
            "$push" => Accumulator::Push(Vec::new()),
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        })
    }

    fn feed(&mut self, value: Value) {
        match self {
            Accumulator::Sum(total, integral) => {
                if let Value::Number(n) = &value {
                    *integral &= n.is_i64() || n.is_u64();
                    *total += n.as_f64().unwrap_or(0.0);
                }
            }
            Accumulator::Avg(total, count) => {
                if let Some(f) = value.as_f64() {
                    *total += f;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => {
                if !value.is_null()
                    && current.as_ref().map_or(true, |c| total_cmp(&value, c) == Ordering::Less)
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if !value.is_null()
                    && current.as_ref().map_or(true, |c| total_cmp(&value, c) == Ordering::Greater)
                {
                    *current = Some(value);
                }
            }
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = value,
            Accumulator::Push(items) => items.push(value),
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum(total, true) => Value::from(total as i64),
            Accumulator::Sum(total, false) => Number::from_f64(total).map(Value::Number).unwrap_or(Value::Null),
            Accumulator::Avg(_, 0) => Value::Null,
            Accumulator::Avg(total, count) => Number::from_f64(total / count as f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) => v.unwrap_or(Value::Null),
            Accumulator::Last(v) => v,
            Accumulator::Push(items) => Value::Array(items),
        }
    }
}

fn group_stage(docs: Vec<Document>, arg: &Value) -> Result<Vec<Document>, QueryError> {
    let spec = arg
        .as_object()
        .ok_or_else(|| QueryError::InvalidPipeline("$group requires an object".to_string()))?;
    let key_expr = spec
        .get(ID_FIELD)
        .ok_or_else(|| QueryError::InvalidPipeline("a group specification must include an _id".to_string()))?;

    let mut fields = Vec::new();
    for (name, acc) in spec {
        if name == ID_FIELD {
            continue;
        }
        let (op, expr) = match acc {
            Value::Object(map) if map.len() == 1 => map
                .iter()
                .next()
                .map(|(op, expr)| (op.clone(), expr.clone()))
                .ok_or_else(|| QueryError::InvalidPipeline(format!("field '{}' needs an accumulator", name)))?,
            _ => {
                return Err(QueryError::InvalidPipeline(format!(
                    "the field '{}' must be an accumulator object",
                    name
                )))
            }
        };
        Accumulator::new(&op)?;
        fields.push((name.clone(), op, expr));
    }

    // Groups in first-seen order
    let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();
    for doc in &docs {
        let key = evaluate(doc, key_expr);
        let index = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(index) => index,
            None => {
                let accs = fields
                    .iter()
                    .map(|(_, op, _)| Accumulator::new(op))
                    .collect::<Result<Vec<_>, _>>()?;
                groups.push((key, accs));
                groups.len() - 1
            }
        };
        for ((_, _, expr), acc) in fields.iter().zip(groups[index].1.iter_mut()) {
            acc.feed(evaluate(doc, expr));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_string(), key);
            for ((name, _, _), acc) in fields.iter().zip(accs) {
                out.insert(name.clone(), acc.finish());
            }
            out
        })
        .collect())
}
