use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info};

use super::{DocumentStore, FindQuery, StoreError, UpdateOptions, UpdateOutcome};
use crate::config::DatabaseConfig;
use crate::document::{self, aggregate, matcher, projection, Document, QueryError};
use crate::filter::{Filter, FilterError, SqlParam, SqlResult, COLLECTIONS_TABLE, DOCUMENTS_TABLE};

impl From<FilterError> for StoreError {
    fn from(err: FilterError) -> Self {
        StoreError::Operation(QueryError::BadQuery(err.to_string()))
    }
}

/// Documents as JSONB rows, one shared table keyed by physical collection name
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&config.url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!(max_connections = config.max_connections, "Connected document store to PostgreSQL");
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, created_at TIMESTAMPTZ NOT NULL DEFAULT now())",
                COLLECTIONS_TABLE
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, collection TEXT NOT NULL, body JSONB NOT NULL)",
                DOCUMENTS_TABLE
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_collection_idx ON {table} (collection, id)",
                table = DOCUMENTS_TABLE
            ),
        ];
        for statement in statements.iter() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn select(&self, filter: &Filter) -> Result<Vec<(i64, Document)>, StoreError> {
        let sql = filter.to_sql()?;
        debug!(query = %sql.query, "document select");
        let rows = bind_params(sqlx::query(&sql.query), &sql.params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    fn filter_for(collection: &str, filter: &Value) -> Result<Filter, StoreError> {
        // Reject anything the in-process matcher would reject, with the same message
        matcher::validate(filter)?;
        let mut built = Filter::new(collection)?;
        built.where_clause(filter.clone())?;
        Ok(built)
    }
}

fn bind_params<'q>(
    mut q: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        q = match param {
            SqlParam::Text(text) => q.bind(text.as_str()),
            SqlParam::Path(segments) => q.bind(segments.clone()),
            SqlParam::Json(value) => q.bind(value.clone()),
        };
    }
    q
}

fn row_to_document(row: &PgRow) -> Result<(i64, Document), StoreError> {
    let id: i64 = row.try_get("id")?;
    let body: Value = row.try_get("body")?;
    match body {
        Value::Object(doc) => Ok((id, doc)),
        _ => Err(StoreError::Unavailable(format!("row {} does not hold a document", id))),
    }
}

async fn register_collection<'c, E>(executor: E, collection: &str) -> Result<(), StoreError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    sqlx::query(&format!(
        "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        COLLECTIONS_TABLE
    ))
    .bind(collection)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_row<'c, E>(executor: E, collection: &str, doc: Document) -> Result<(), StoreError>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    sqlx::query(&format!("INSERT INTO {} (collection, body) VALUES ($1, $2)", DOCUMENTS_TABLE))
        .bind(collection)
        .bind(Value::Object(doc))
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        let projection = query.projection.clone().unwrap_or(Value::Null);
        let mut filter = Self::filter_for(collection, &query.filter)?;
        filter.window(query.skip, query.limit);
        self.select(&filter)
            .await?
            .into_iter()
            .map(|(_, doc)| projection::project(doc, &projection).map_err(StoreError::from))
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Value, skip: u64, limit: u64) -> Result<u64, StoreError> {
        let mut built = Self::filter_for(collection, filter)?;
        built.window(skip, limit);
        let SqlResult { query, params } = built.to_count_sql()?;
        let row = bind_params(sqlx::query(&query), &params).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, collection: &str, documents: Vec<Document>) -> Result<(), StoreError> {
        Filter::new(collection)?;
        let mut tx = self.pool.begin().await?;
        register_collection(&mut *tx, collection).await?;
        for mut doc in documents {
            document::ensure_id(&mut doc);
            insert_row(&mut *tx, collection, doc).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, StoreError> {
        document::update::classify(update)?;
        let mut built = Self::filter_for(collection, filter)?;
        if !options.multi {
            built.window(0, 1);
        }
        let sql = built.to_locking_sql()?;

        let mut tx = self.pool.begin().await?;
        let rows = bind_params(sqlx::query(&sql.query), &sql.params)
            .fetch_all(&mut *tx)
            .await?;
        let hits = rows.iter().map(row_to_document).collect::<Result<Vec<_>, _>>()?;

        if hits.is_empty() {
            if !options.upsert {
                return Ok(UpdateOutcome::default());
            }
            let mut seed = document::update::upsert_seed(filter)?;
            document::update::apply(&mut seed, update)?;
            document::ensure_id(&mut seed);
            register_collection(&mut *tx, collection).await?;
            insert_row(&mut *tx, collection, seed).await?;
            tx.commit().await?;
            return Ok(UpdateOutcome { matched: 0, upserted: true });
        }

        // Compute every new body before writing so a failing update changes nothing
        let mut updated = Vec::with_capacity(hits.len());
        for (id, mut doc) in hits {
            document::update::apply(&mut doc, update)?;
            updated.push((id, doc));
        }
        let matched = updated.len() as u64;
        let statement = format!("UPDATE {} SET body = $1 WHERE id = $2", DOCUMENTS_TABLE);
        for (id, doc) in updated {
            sqlx::query(&statement)
                .bind(Value::Object(doc))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(UpdateOutcome { matched, upserted: false })
    }

    async fn remove(&self, collection: &str, filter: &Value, just_one: bool) -> Result<u64, StoreError> {
        let mut built = Self::filter_for(collection, filter)?;
        if just_one {
            built.window(0, 1);
        }
        let sql = built.to_delete_sql()?;
        let result = bind_params(sqlx::query(&sql.query), &sql.params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>, StoreError> {
        aggregate::validate(pipeline)?;
        // A leading $match runs in SQL; the remaining stages run in process
        let (filter, rest) = match aggregate::leading_match(pipeline) {
            Some(first) => (first.clone(), &pipeline[1..]),
            None => (Value::Null, pipeline),
        };
        let built = Self::filter_for(collection, &filter)?;
        let docs = self.select(&built).await?.into_iter().map(|(_, doc)| doc).collect();
        Ok(aggregate::run(docs, rest)?)
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE collection = $1", DOCUMENTS_TABLE))
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        let dropped = sqlx::query(&format!("DELETE FROM {} WHERE name = $1", COLLECTIONS_TABLE))
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(dropped.rows_affected() > 0)
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(&format!("SELECT name FROM {} ORDER BY name", COLLECTIONS_TABLE))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(StoreError::from))
            .collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_errors_surface_as_operation_errors() {
        let err: StoreError = FilterError::UnsupportedOperator("$where".to_string()).into();
        assert!(matches!(err, StoreError::Operation(QueryError::BadQuery(_))));
        assert!(err.to_string().contains("$where"));
    }

    #[test]
    fn filter_for_validates_before_building() {
        assert!(PgDocumentStore::filter_for("c", &json!({"a": {"$regex": "x"}})).is_err());
        assert!(PgDocumentStore::filter_for("c", &json!({"a": {"$gt": 1}})).is_ok());
        assert!(PgDocumentStore::filter_for("", &json!({})).is_err());
    }

    // The tests below need a reachable PostgreSQL at DATABASE_URL and pass
    // trivially without one.

    async fn connect() -> Option<PgDocumentStore> {
        let url = std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())?;
        let config = DatabaseConfig {
            url,
            max_connections: 2,
            connection_timeout: 5,
        };
        match PgDocumentStore::connect(&config).await {
            Ok(store) => Some(store),
            Err(e) => {
                println!("PostgreSQL unavailable, skipping: {}", e);
                None
            }
        }
    }

    /// A collection name no other test run uses
    fn scratch(name: &str) -> String {
        format!("{}.{}", uuid::Uuid::new_v4(), name)
    }

    fn docs(values: Value) -> Vec<Document> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn array_equality_matches_memory_store() {
        let Some(pg) = connect().await else { return };
        let memory = crate::store::MemoryStore::new();
        let collection = scratch("arrays");
        let seed = json!([
            {"a": [{"x": 1, "y": 2}], "b": [[1, 2, 3]], "tags": ["red", "blue"]},
            {"a": [{"x": 1}], "b": [1, 2], "tags": "red"}
        ]);
        pg.insert(&collection, docs(seed.clone())).await.unwrap();
        memory.insert(&collection, docs(seed)).await.unwrap();

        for filter in [
            json!({"a": {"x": 1}}),
            json!({"a": {"x": 1, "y": 2}}),
            json!({"b": [1, 2]}),
            json!({"b": [1, 2, 3]}),
            json!({"b": 1}),
            json!({"tags": "red"}),
            json!({"tags": {"$in": ["blue"]}}),
            json!({"tags": {"$ne": "blue"}}),
            json!({"missing": null}),
        ] {
            let on_pg = pg.count(&collection, &filter, 0, 0).await.unwrap();
            let in_memory = memory.count(&collection, &filter, 0, 0).await.unwrap();
            assert_eq!(on_pg, in_memory, "filter {}", filter);
        }

        assert_eq!(pg.remove(&collection, &json!({"a": {"x": 1}}), false).await.unwrap(), 1);
        assert_eq!(pg.count(&collection, &json!({}), 0, 0).await.unwrap(), 1);
        pg.drop_collection(&collection).await.unwrap();
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let Some(pg) = connect().await else { return };
        let collection = scratch("widgets");

        pg.insert(&collection, docs(json!([{"n": 1}, {"n": 2}, {"n": 3, "_id": "fixed"}])))
            .await
            .unwrap();
        assert!(pg.list_collections().await.unwrap().contains(&collection));

        let found = pg
            .find(
                &collection,
                &FindQuery {
                    filter: json!({"n": {"$gte": 2}}),
                    projection: Some(json!({"n": 1, "_id": 0})),
                    skip: 0,
                    limit: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(found, docs(json!([{"n": 2}, {"n": 3}])));

        let windowed = pg
            .find(&collection, &FindQuery { skip: 1, limit: u64::MAX, ..FindQuery::new(json!({})) })
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);
        assert_eq!(pg.count(&collection, &json!({}), 1, 1).await.unwrap(), 1);

        let outcome = pg
            .update(&collection, &json!({"n": 1}), &json!({"$inc": {"n": 10}}), UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, upserted: false });
        assert_eq!(pg.count(&collection, &json!({"n": 11}), 0, 0).await.unwrap(), 1);

        let outcome = pg
            .update(
                &collection,
                &json!({"kind": "gadget"}),
                &json!({"$set": {"n": 7}}),
                UpdateOptions { upsert: true, multi: false },
            )
            .await
            .unwrap();
        assert!(outcome.upserted);
        assert_eq!(pg.count(&collection, &json!({"kind": "gadget", "n": 7}), 0, 0).await.unwrap(), 1);

        let err = pg
            .update(&collection, &json!({}), &json!({"$bogus": {}}), UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Operation(_)));

        assert_eq!(pg.remove(&collection, &json!({}), true).await.unwrap(), 1);
        assert_eq!(pg.count(&collection, &json!({}), 0, 0).await.unwrap(), 3);

        let grouped = pg
            .aggregate(
                &collection,
                &[json!({"$match": {"n": {"$gt": 2}}}), json!({"$count": "total"})],
            )
            .await
            .unwrap();
        assert_eq!(grouped, docs(json!([{"total": 2}])));

        assert!(pg.drop_collection(&collection).await.unwrap());
        assert!(!pg.list_collections().await.unwrap().contains(&collection));
        assert_eq!(pg.count(&collection, &json!({}), 0, 0).await.unwrap(), 0);
        assert!(!pg.drop_collection(&collection).await.unwrap());
    }
}
