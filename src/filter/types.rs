use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,

    #[serde(rename = "$exists")] Exists,
    #[serde(rename = "$not")] Not,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        serde_json::from_value(Value::String(op.to_string())).ok()
    }

    /// SQL comparison operator for the range operators
    pub fn to_sql(&self) -> Option<&'static str> {
        match self {
            FilterOp::Gt => Some(">"),
            FilterOp::Gte => Some(">="),
            FilterOp::Lt => Some("<"),
            FilterOp::Lte => Some("<="),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterWhereInfo {
    pub path: String,
    pub operator: FilterOp,
    pub data: Value,
}

/// A bound query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    /// JSONB path for the `#>` operator
    Path(Vec<String>),
    Json(Value),
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}
