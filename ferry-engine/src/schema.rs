//! Cached schema discovery
//!
//! Wraps introspection with a per-data-source cache so repeated schema reads
//! do not hit the external database. `force_refresh` bypasses and repopulates
//! the cache; a cache entry that fails to deserialize is treated as a miss.
//! A fresh discovery reports its timestamp to the optional refresh sink so
//! the owning data source record can track schema freshness.

use crate::cache::CacheStore;
use crate::connection::ConnectionFactory;
use crate::introspect::introspector_for;
use async_trait::async_trait;
use ferry_core::{DataSource, DataSourceId, DiscoveredSchema, GatewayResult, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Receives the discovery timestamp after a fresh (non-cached) schema read.
#[async_trait]
pub trait SchemaRefreshSink: Send + Sync {
    async fn schema_refreshed(&self, data_source_id: DataSourceId, refreshed_at: Timestamp);
}

pub struct SchemaService {
    factory: Arc<dyn ConnectionFactory>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    refresh_sink: Option<Arc<dyn SchemaRefreshSink>>,
}

impl SchemaService {
    pub fn new(factory: Arc<dyn ConnectionFactory>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            factory,
            cache,
            ttl: SCHEMA_CACHE_TTL,
            refresh_sink: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_refresh_sink(mut self, sink: Arc<dyn SchemaRefreshSink>) -> Self {
        self.refresh_sink = Some(sink);
        self
    }

    /// The discovered schema for a data source, from cache when fresh.
    pub async fn discover(
        &self,
        data_source: &DataSource,
        force_refresh: bool,
    ) -> GatewayResult<DiscoveredSchema> {
        let key = format!("schema:{}:{}", data_source.tenant_id, data_source.id);

        if !force_refresh {
            if let Some(value) = self.cache.get(&key).await {
                match serde_json::from_value::<DiscoveredSchema>(value) {
                    Ok(schema) => {
                        debug!(data_source_id = %data_source.id, "schema cache hit");
                        return Ok(schema);
                    }
                    Err(err) => {
                        warn!(data_source_id = %data_source.id, error = %err, "discarding undecodable schema cache entry");
                        self.cache.remove(&key).await;
                    }
                }
            }
        }

        let conn = self.factory.connect(data_source).await?;
        let schema = introspector_for(data_source.dialect)
            .discover(conn.as_ref(), data_source.id)
            .await?;
        debug!(
            data_source_id = %data_source.id,
            tables = schema.tables.len(),
            "schema discovered"
        );

        if let Some(sink) = &self.refresh_sink {
            sink.schema_refreshed(data_source.id, schema.discovered_at)
                .await;
        }

        if let Ok(value) = serde_json::to_value(&schema) {
            self.cache.set(&key, value, self.ttl).await;
        }
        Ok(schema)
    }
}
