use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo, SqlParam};

/// Compiles a document filter into a PostgreSQL predicate over the JSONB `body` column
pub struct FilterWhere {
    param_values: Vec<SqlParam>,
    param_index: usize,
    conditions: Vec<String>,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
        }
    }

    /// Build the predicate. Placeholders start after `starting_param_index`.
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<SqlParam>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(where_data)
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("filter must be an object".to_string())),
        }
    }

    fn build(&mut self, where_data: &Value) -> Result<(String, Vec<SqlParam>), FilterError> {
        Self::validate(where_data)?;
        if let Value::Object(obj) = where_data {
            for (key, value) in obj {
                if key.starts_with('$') {
                    self.parse_logical_operator(key, value)?;
                } else {
                    self.parse_field_condition(key, value)?;
                }
            }
        }
        let where_clause = if self.conditions.is_empty() {
            "TRUE".to_string()
        } else {
            self.conditions.join(" AND ")
        };
        Ok((where_clause, std::mem::take(&mut self.param_values)))
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" | "$nor" => {
                let arr = value
                    .as_array()
                    .filter(|arr| !arr.is_empty())
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires a nonempty array", op)))?;
                let mut sql_parts = Vec::new();
                for v in arr {
                    let (sql, params) = Self::generate(v, self.param_index)?;
                    self.param_index += params.len();
                    self.param_values.extend(params);
                    sql_parts.push(format!("({})", sql));
                }
                let combined = match op {
                    "$and" => sql_parts.join(" AND "),
                    "$or" => format!("({})", sql_parts.join(" OR ")),
                    _ => format!("NOT ({})", sql_parts.join(" OR ")),
                };
                self.conditions.push(combined);
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(FilterError::InvalidPath(field.to_string()));
        }
        let column = self.path(field);
        for info in Self::field_conditions(field, value)? {
            let sql = self.build_sql_condition(&column, &info)?;
            self.conditions.push(sql);
        }
        Ok(())
    }

    /// Split `{field: value}` or `{field: {$op: value, ...}}` into conditions
    fn field_conditions(field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        if let Value::Object(obj) = value {
            let operators = obj.keys().filter(|k| k.starts_with('$')).count();
            if operators > 0 {
                if operators != obj.len() {
                    return Err(FilterError::InvalidWhereClause(format!(
                        "cannot mix operators and literal fields for '{}'",
                        field
                    )));
                }
                return obj
                    .iter()
                    .map(|(op_key, op_val)| {
                        let operator = FilterOp::parse(op_key)
                            .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                        Ok(FilterWhereInfo { path: field.to_string(), operator, data: op_val.clone() })
                    })
                    .collect();
            }
        }
        // Implicit equality: { field: value }
        Ok(vec![FilterWhereInfo { path: field.to_string(), operator: FilterOp::Eq, data: value.clone() }])
    }

    fn build_sql_condition(&mut self, column: &str, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        match condition.operator {
            FilterOp::Eq => Ok(self.equality(column, &condition.data)),
            FilterOp::Ne => Ok(format!("NOT {}", self.equality(column, &condition.data))),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                let sql_op = condition.operator.to_sql().unwrap_or("=");
                let param = self.param(SqlParam::Json(condition.data.clone()));
                Ok(format!(
                    "COALESCE(jsonb_typeof({col}) = jsonb_typeof({p}) AND {col} {op} {p}, FALSE)",
                    col = column,
                    p = param,
                    op = sql_op
                ))
            }
            FilterOp::In | FilterOp::NIn => {
                let values = condition.data.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!("{:?} requires an array", condition.operator))
                })?;
                let any = if values.is_empty() {
                    // Still reference the path so its placeholder gets a type
                    format!("({} IS NOT NULL AND FALSE)", column)
                } else {
                    let parts: Vec<String> = values.iter().map(|v| self.equality(column, v)).collect();
                    format!("({})", parts.join(" OR "))
                };
                Ok(if condition.operator == FilterOp::In { any } else { format!("NOT {}", any) })
            }
            FilterOp::Exists => {
                let wanted = match &condition.data {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
                    Value::Null => false,
                    _ => true,
                };
                Ok(format!("{} IS {}NULL", column, if wanted { "NOT " } else { "" }))
            }
            FilterOp::Not => {
                let inner = match &condition.data {
                    Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => {
                        Self::field_conditions(&condition.path, &condition.data)?
                    }
                    _ => {
                        return Err(FilterError::InvalidOperatorData(
                            "$not requires an operator expression".to_string(),
                        ))
                    }
                };
                let mut parts = Vec::with_capacity(inner.len());
                for info in &inner {
                    parts.push(self.build_sql_condition(column, info)?);
                }
                Ok(format!("NOT ({})", parts.join(" AND ")))
            }
        }
    }

    /// Equality with array membership and `null` matching a missing field; never yields NULL
    fn equality(&mut self, column: &str, value: &Value) -> String {
        if value.is_null() {
            return format!(
                "({col} IS NULL OR {col} = 'null'::jsonb OR {any})",
                col = column,
                any = any_element(column, "'null'::jsonb")
            );
        }
        let param = self.param(SqlParam::Json(value.clone()));
        format!(
            "COALESCE({col} = {p} OR {any}, FALSE)",
            col = column,
            p = param,
            any = any_element(column, &param)
        )
    }

    fn path(&mut self, field: &str) -> String {
        let segments = field.split('.').map(str::to_string).collect();
        let param = self.param(SqlParam::Path(segments));
        format!("(body #> {}::text[])", param)
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        match self.param_values.last() {
            Some(SqlParam::Json(_)) => format!("${}::jsonb", self.param_index),
            _ => format!("${}", self.param_index),
        }
    }
}

/// Some element of an array column equals `value`; containment (`@>`) would also accept partial objects
fn any_element(column: &str, value: &str) -> String {
    format!(
        "(jsonb_typeof({col}) = 'array' AND EXISTS (SELECT 1 FROM jsonb_array_elements({col}) AS elem WHERE elem = {v}))",
        col = column,
        v = value
    )
}
