//! Query execution pipeline
//!
//! Validate against the discovered schema, clamp the row limit, translate,
//! check the result cache, run with a timeout, shape the result. The cache
//! key hashes the final SQL plus its bound parameters, so two definitions
//! that compile to the same statement share an entry while any change to
//! either produces a new one.

use crate::cache::CacheStore;
use crate::connection::ConnectionFactory;
use crate::progress::{ProgressNotifier, QueryStage};
use crate::schema::SchemaService;
use crate::translate::translate;
use ferry_core::{
    sha256_hex, DataSource, GatewayError, GatewayResult, NormalizedType, QueryColumn,
    QueryDefinition, QueryResult, RequestId,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on returned rows; a smaller requested limit wins.
    pub max_row_limit: u32,
    pub query_timeout: Duration,
    pub result_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_row_limit: 10_000,
            query_timeout: Duration::from_secs(60),
            result_cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

pub struct QueryExecutionEngine {
    factory: Arc<dyn ConnectionFactory>,
    schema: Arc<SchemaService>,
    cache: Arc<dyn CacheStore>,
    progress: Arc<dyn ProgressNotifier>,
    config: EngineConfig,
}

impl QueryExecutionEngine {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        schema: Arc<SchemaService>,
        cache: Arc<dyn CacheStore>,
        progress: Arc<dyn ProgressNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            factory,
            schema,
            cache,
            progress,
            config,
        }
    }

    pub async fn execute(
        &self,
        request_id: &RequestId,
        query: &QueryDefinition,
        data_source: &DataSource,
    ) -> GatewayResult<QueryResult> {
        match self.run(request_id, query, data_source).await {
            Ok(result) => {
                self.progress.completed(request_id, result.row_count).await;
                Ok(result)
            }
            Err(err) => {
                self.progress.failed(request_id, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request_id: &RequestId,
        query: &QueryDefinition,
        data_source: &DataSource,
    ) -> GatewayResult<QueryResult> {
        self.progress.notify(request_id, QueryStage::Validating).await;

        let schema = self.schema.discover(data_source, false).await?;
        let table = schema
            .find_table(query.schema_name.as_deref(), &query.table)
            .ok_or_else(|| GatewayError::table_not_found(&query.table))?;
        let column_types: HashMap<String, NormalizedType> = table
            .columns
            .iter()
            .map(|c| (c.name.to_ascii_lowercase(), c.normalized_type))
            .collect();

        let mut effective = query.clone();
        effective.limit = Some(match query.limit {
            Some(requested) => requested.min(self.config.max_row_limit),
            None => self.config.max_row_limit,
        });

        self.progress
            .notify(request_id, QueryStage::Translating)
            .await;
        let translated = translate(&effective, data_source.dialect, &column_types)?;
        info!(
            data_source_id = %data_source.id,
            sql = %translated.sql,
            "executing query"
        );

        let cache_key = format!(
            "query:{}:{}:{}",
            data_source.tenant_id,
            data_source.id,
            query_hash(&translated.sql, &translated.params),
        );
        if let Some(value) = self.cache.get(&cache_key).await {
            if let Ok(result) = serde_json::from_value::<QueryResult>(value) {
                debug!("query result served from cache");
                return Ok(result);
            }
            self.cache.remove(&cache_key).await;
        }

        self.progress.notify(request_id, QueryStage::Executing).await;
        let started = Instant::now();
        let conn = self.factory.connect(data_source).await?;
        let rows = conn
            .query(&translated.sql, &translated.params, self.config.query_timeout)
            .await?;
        let execution_ms = started.elapsed().as_millis() as u64;

        self.progress
            .notify(request_id, QueryStage::BuildingResult)
            .await;
        let columns = match rows.first() {
            Some(first) => first
                .iter()
                .map(|(name, value)| QueryColumn {
                    name: name.clone(),
                    display_type: display_type(value).to_string(),
                })
                .collect(),
            None => Vec::new(),
        };

        let result = QueryResult {
            columns,
            row_count: rows.len(),
            rows,
            execution_ms,
        };

        if let Ok(value) = serde_json::to_value(&result) {
            self.cache
                .set(&cache_key, value, self.config.result_cache_ttl)
                .await;
        }
        Ok(result)
    }
}

fn query_hash(sql: &str, params: &[crate::connection::SqlParam]) -> String {
    let mut input = sql.to_string();
    for param in params {
        input.push('|');
        input.push_str(&param.to_string());
    }
    sha256_hex(input.as_bytes())
}

/// Client-facing type label, inferred from the first row's JSON shape.
fn display_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Bool(_) => "Boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "Integer",
        JsonValue::Number(_) => "Decimal",
        JsonValue::Array(_) | JsonValue::Object(_) => "Json",
        JsonValue::String(_) | JsonValue::Null => "String",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::connection::{ExternalConnection, SqlParam};
    use crate::progress::NoopProgressNotifier;
    use async_trait::async_trait;
    use chrono::Utc;
    use ferry_core::{new_request_id, Dialect, FilterOperator, QueryFilter};
    use serde_json::{json, Map as JsonMap};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Answers catalog queries with one `orders` table and data queries with
    /// canned rows, recording every statement it sees.
    struct FakeConnection {
        statements: Arc<Mutex<Vec<String>>>,
        params: Arc<Mutex<Vec<SqlParam>>>,
    }

    #[async_trait]
    impl ExternalConnection for FakeConnection {
        async fn query(
            &self,
            sql: &str,
            params: &[SqlParam],
            _timeout: Duration,
        ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>> {
            self.statements.lock().unwrap().push(sql.to_string());
            self.params.lock().unwrap().extend_from_slice(params);

            if sql.contains("information_schema.columns") {
                let mut rows = Vec::new();
                for (name, ty) in [("region", "text"), ("amount", "numeric"), ("open", "boolean")]
                {
                    let mut row = JsonMap::new();
                    row.insert("schema_name".into(), json!("public"));
                    row.insert("table_name".into(), json!("orders"));
                    row.insert("column_name".into(), json!(name));
                    row.insert("data_type".into(), json!(ty));
                    row.insert("is_nullable".into(), json!(true));
                    rows.push(row);
                }
                return Ok(rows);
            }
            if sql.contains("pg_constraint") {
                return Ok(Vec::new());
            }

            let mut row = JsonMap::new();
            row.insert("region".into(), json!("east"));
            row.insert("amount".into(), json!(12.5));
            row.insert("open".into(), json!(true));
            Ok(vec![row])
        }
    }

    struct FakeFactory {
        connects: AtomicU32,
        statements: Arc<Mutex<Vec<String>>>,
        params: Arc<Mutex<Vec<SqlParam>>>,
    }

    impl FakeFactory {
        fn new() -> Self {
            Self {
                connects: AtomicU32::new(0),
                statements: Arc::new(Mutex::new(Vec::new())),
                params: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory for FakeFactory {
        async fn connect(
            &self,
            _data_source: &DataSource,
        ) -> GatewayResult<Box<dyn ExternalConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                statements: self.statements.clone(),
                params: self.params.clone(),
            }))
        }
    }

    fn engine(factory: Arc<FakeFactory>) -> QueryExecutionEngine {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        QueryExecutionEngine::new(
            factory.clone(),
            Arc::new(SchemaService::new(factory, cache.clone())),
            cache,
            Arc::new(NoopProgressNotifier),
            EngineConfig::default(),
        )
    }

    fn data_source() -> DataSource {
        DataSource {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            dialect: Dialect::Postgres,
            connection_descriptor: "host=localhost".into(),
            last_schema_refresh: None,
        }
    }

    #[tokio::test]
    async fn missing_limit_is_clamped_to_the_cap() {
        let factory = Arc::new(FakeFactory::new());
        let engine = engine(factory.clone());
        let query = QueryDefinition::for_table("orders");

        engine
            .execute(&new_request_id(), &query, &data_source())
            .await
            .unwrap();

        let statements = factory.statements.lock().unwrap();
        let data_sql = statements.last().unwrap();
        assert!(data_sql.ends_with("LIMIT 10000"), "{data_sql}");
    }

    #[tokio::test]
    async fn requested_limit_above_cap_is_reduced() {
        let factory = Arc::new(FakeFactory::new());
        let engine = engine(factory.clone());
        let query = QueryDefinition {
            limit: Some(50_000),
            ..QueryDefinition::for_table("orders")
        };

        engine
            .execute(&new_request_id(), &query, &data_source())
            .await
            .unwrap();

        let statements = factory.statements.lock().unwrap();
        assert!(statements.last().unwrap().ends_with("LIMIT 10000"));
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let factory = Arc::new(FakeFactory::new());
        let engine = engine(factory);
        let query = QueryDefinition::for_table("no_such_table");

        let err = engine
            .execute(&new_request_id(), &query, &data_source())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { what: "Table", .. }));
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let factory = Arc::new(FakeFactory::new());
        let engine = engine(factory.clone());
        let ds = data_source();
        let query = QueryDefinition::for_table("orders");

        let first = engine.execute(&new_request_id(), &query, &ds).await.unwrap();
        let statements_after_first = factory.statements.lock().unwrap().len();

        let second = engine.execute(&new_request_id(), &query, &ds).await.unwrap();
        // Schema and result are both cached: no further statements at all.
        assert_eq!(factory.statements.lock().unwrap().len(), statements_after_first);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn filter_binds_use_discovered_column_types() {
        let factory = Arc::new(FakeFactory::new());
        let engine = engine(factory.clone());
        // region is text in the discovered schema, so a numeric-looking
        // value still binds as text.
        let query = QueryDefinition {
            filters: vec![QueryFilter {
                column: "region".into(),
                operator: FilterOperator::Equals,
                value: Some("12345".into()),
                value2: None,
            }],
            ..QueryDefinition::for_table("orders")
        };

        engine
            .execute(&new_request_id(), &query, &data_source())
            .await
            .unwrap();

        let params = factory.params.lock().unwrap();
        assert_eq!(params.as_slice(), &[SqlParam::Text("12345".into())]);
    }

    #[tokio::test]
    async fn result_columns_carry_display_types_from_first_row() {
        let factory = Arc::new(FakeFactory::new());
        let engine = engine(factory);
        let query = QueryDefinition::for_table("orders");

        let result = engine
            .execute(&new_request_id(), &query, &data_source())
            .await
            .unwrap();

        assert_eq!(result.row_count, 1);
        let types: Vec<(&str, &str)> = result
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.display_type.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("region", "String"),
                ("amount", "Decimal"),
                ("open", "Boolean")
            ]
        );
    }
}
