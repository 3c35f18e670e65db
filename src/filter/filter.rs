use serde_json::Value;

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{SqlParam, SqlResult};
use super::DOCUMENTS_TABLE;

const MAX_WINDOW: u64 = i64::MAX as u64;

/// Query builder for one physical collection stored in the documents table
pub struct Filter {
    collection: String,
    where_data: Option<Value>,
    skip: u64,
    limit: u64,
}

impl Filter {
    pub fn new(collection: impl Into<String>) -> Result<Self, FilterError> {
        let collection = collection.into();
        Self::validate_collection_name(&collection)?;
        Ok(Self {
            collection,
            where_data: None,
            skip: 0,
            limit: 0,
        })
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    /// `limit` of 0 means unbounded. Values are capped at the largest `BIGINT`,
    /// past which LIMIT and OFFSET behave the same anyway.
    pub fn window(&mut self, skip: u64, limit: u64) -> &mut Self {
        self.skip = skip.min(MAX_WINDOW);
        self.limit = limit.min(MAX_WINDOW);
        self
    }

    /// `SELECT id, body` of the matching rows in insertion order
    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_sql()?;
        let query = [
            format!("SELECT id, body FROM {}", DOCUMENTS_TABLE),
            format!("WHERE {}", where_clause),
            "ORDER BY id".to_string(),
            self.build_window_clause(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        Ok(SqlResult { query, params })
    }

    /// Like `to_sql`, locking the rows for a read-modify-write
    pub fn to_locking_sql(&self) -> Result<SqlResult, FilterError> {
        let mut result = self.to_sql()?;
        result.query.push_str(" FOR UPDATE");
        Ok(result)
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_sql()?;
        let query = if self.skip == 0 && self.limit == 0 {
            format!("SELECT COUNT(*) AS count FROM {} WHERE {}", DOCUMENTS_TABLE, where_clause)
        } else {
            format!(
                "SELECT COUNT(*) AS count FROM (SELECT 1 FROM {} WHERE {} ORDER BY id {}) AS matched",
                DOCUMENTS_TABLE,
                where_clause,
                self.build_window_clause()
            )
        };
        Ok(SqlResult { query, params })
    }

    pub fn to_delete_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = self.where_sql()?;
        let query = if self.skip == 0 && self.limit == 0 {
            format!("DELETE FROM {} WHERE {}", DOCUMENTS_TABLE, where_clause)
        } else {
            format!(
                "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} WHERE {w} ORDER BY id {window})",
                table = DOCUMENTS_TABLE,
                w = where_clause,
                window = self.build_window_clause()
            )
        };
        Ok(SqlResult { query, params })
    }

    /// `collection = $1 AND (<filter>)`
    fn where_sql(&self) -> Result<(String, Vec<SqlParam>), FilterError> {
        let mut params = vec![SqlParam::Text(self.collection.clone())];
        let filter_sql = match &self.where_data {
            Some(where_data) => {
                let (sql, filter_params) = FilterWhere::generate(where_data, params.len())?;
                params.extend(filter_params);
                sql
            }
            None => "TRUE".to_string(),
        };
        Ok((format!("collection = $1 AND ({})", filter_sql), params))
    }

    fn validate_collection_name(name: &str) -> Result<(), FilterError> {
        if name.is_empty() { return Err(FilterError::InvalidCollection("Collection name cannot be empty".to_string())); }
        if name.contains('\0') {
            return Err(FilterError::InvalidCollection(format!("Invalid collection name: {:?}", name)));
        }
        Ok(())
    }

    fn build_window_clause(&self) -> String {
        match (self.skip, self.limit) {
            (0, 0) => String::new(),
            (s, 0) => format!("OFFSET {}", s),
            (0, l) => format!("LIMIT {}", l),
            (s, l) => format!("LIMIT {} OFFSET {}", l, s),
        }
    }
}
