//! External database connections
//!
//! `ExternalConnection` is the seam between the engine and the tenant
//! databases: a connection executes parameterized SQL and returns rows as
//! ordered name->JSON-value maps, so introspection and execution stay
//! driver-agnostic. The concrete Postgres binding lives here; other dialects
//! plug in behind the same factory trait.

use async_trait::async_trait;
use ferry_core::{DataSource, Dialect, GatewayError, GatewayResult};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};

// ============================================================================
// BOUND PARAMETERS
// ============================================================================

/// A bound SQL parameter value.
///
/// Filter values arrive as strings; the translator types each bind from the
/// filter column's declared type so drivers can bind numerics and booleans
/// natively.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Text(s) => write!(f, "{s}"),
            SqlParam::Int(i) => write!(f, "{i}"),
            SqlParam::Float(x) => write!(f, "{x}"),
            SqlParam::Bool(b) => write!(f, "{b}"),
        }
    }
}

// ============================================================================
// CONNECTION TRAITS
// ============================================================================

/// One open connection to an external database.
#[async_trait]
pub trait ExternalConnection: Send + Sync {
    /// Execute a parameterized statement and materialize all rows. The
    /// timeout bounds the whole statement, not individual fetches.
    async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>>;
}

/// Opens connections for a data source, decrypting its descriptor first.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, data_source: &DataSource)
        -> GatewayResult<Box<dyn ExternalConnection>>;
}

/// Decrypts stored connection descriptors. The real implementation lives in
/// the platform's key-management service; this trait is the only contact
/// surface the engine has with it.
pub trait EncryptionService: Send + Sync {
    fn decrypt(&self, descriptor: &str) -> GatewayResult<String>;
}

/// Pass-through used in development and in the agent, where descriptors are
/// stored unencrypted in the local config file.
pub struct PlaintextEncryption;

impl EncryptionService for PlaintextEncryption {
    fn decrypt(&self, descriptor: &str) -> GatewayResult<String> {
        Ok(descriptor.to_string())
    }
}

// ============================================================================
// POSTGRES BINDING
// ============================================================================

/// Connection factory for Postgres data sources.
pub struct PostgresConnectionFactory {
    encryption: Arc<dyn EncryptionService>,
}

impl PostgresConnectionFactory {
    pub fn new(encryption: Arc<dyn EncryptionService>) -> Self {
        Self { encryption }
    }
}

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    async fn connect(
        &self,
        data_source: &DataSource,
    ) -> GatewayResult<Box<dyn ExternalConnection>> {
        if data_source.dialect != Dialect::Postgres {
            return Err(GatewayError::execution(format!(
                "Postgres factory cannot open a {} data source",
                data_source.dialect
            )));
        }

        let conn_str = self.encryption.decrypt(&data_source.connection_descriptor)?;
        let (client, connection) = tokio_postgres::connect(&conn_str, tokio_postgres::NoTls)
            .await
            .map_err(|e| GatewayError::execution(format!("connect failed: {e}")))?;

        debug!(data_source_id = %data_source.id, "Opened Postgres connection");

        // The driver task owns the socket; it ends when the client drops.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "Postgres connection task ended with error");
            }
        });

        Ok(Box::new(PostgresConnection { client }))
    }
}

struct PostgresConnection {
    client: tokio_postgres::Client,
}

#[async_trait]
impl ExternalConnection for PostgresConnection {
    async fn query(
        &self,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>> {
        let bound: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = params
            .iter()
            .map(|p| match p {
                SqlParam::Text(v) => v as &(dyn tokio_postgres::types::ToSql + Sync),
                SqlParam::Int(v) => v as &(dyn tokio_postgres::types::ToSql + Sync),
                SqlParam::Float(v) => v as &(dyn tokio_postgres::types::ToSql + Sync),
                SqlParam::Bool(v) => v as &(dyn tokio_postgres::types::ToSql + Sync),
            })
            .collect();

        let rows = tokio::time::timeout(timeout, self.client.query(sql, &bound))
            .await
            .map_err(|_| GatewayError::execution(format!("statement exceeded {timeout:?}")))?
            .map_err(|e| GatewayError::execution(format!("query failed: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut map = JsonMap::with_capacity(row.len());
            for (idx, col) in row.columns().iter().enumerate() {
                map.insert(col.name().to_string(), pg_value_to_json(&row, idx));
            }
            out.push(map);
        }
        Ok(out)
    }
}

fn pg_value_to_json(row: &tokio_postgres::Row, idx: usize) -> JsonValue {
    use tokio_postgres::types::Type;

    let ty = row.columns()[idx].type_();
    match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null),
        Type::INT2 => opt_num(row.try_get::<_, Option<i16>>(idx).ok().flatten()),
        Type::INT4 => opt_num(row.try_get::<_, Option<i32>>(idx).ok().flatten()),
        Type::INT8 => opt_num(row.try_get::<_, Option<i64>>(idx).ok().flatten()),
        Type::FLOAT4 => opt_float(
            row.try_get::<_, Option<f32>>(idx)
                .ok()
                .flatten()
                .map(f64::from),
        ),
        Type::FLOAT8 => opt_float(row.try_get::<_, Option<f64>>(idx).ok().flatten()),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(|u| JsonValue::String(u.to_string()))
            .unwrap_or(JsonValue::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|t| JsonValue::String(t.to_string()))
            .unwrap_or(JsonValue::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|t| JsonValue::String(t.to_rfc3339()))
            .unwrap_or(JsonValue::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<JsonValue>>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null),
        // Everything else (text, varchar, numeric, dates, ...) comes back
        // through the text representation.
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

fn opt_num<T: Into<i64>>(v: Option<T>) -> JsonValue {
    v.map(|n| JsonValue::Number(n.into().into()))
        .unwrap_or(JsonValue::Null)
}

fn opt_float(v: Option<f64>) -> JsonValue {
    v.and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

// ============================================================================
// RESILIENT WRAPPER
// ============================================================================

/// Wraps any factory with retry-with-backoff for transient connect failures
/// and a per-data-source circuit breaker that stops dialing a failing
/// database for a cool-down period.
pub struct ResilientConnectionFactory {
    inner: Arc<dyn ConnectionFactory>,
    retry: RetryConfig,
    breakers: dashmap::DashMap<ferry_core::DataSourceId, Arc<CircuitBreaker>>,
    breaker_config: CircuitBreakerConfig,
}

impl ResilientConnectionFactory {
    pub fn new(inner: Arc<dyn ConnectionFactory>, retry: RetryConfig) -> Self {
        Self {
            inner,
            retry,
            breakers: dashmap::DashMap::new(),
            breaker_config: CircuitBreakerConfig::default(),
        }
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    fn breaker_for(&self, id: ferry_core::DataSourceId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(id)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config.clone())))
            .clone()
    }
}

#[async_trait]
impl ConnectionFactory for ResilientConnectionFactory {
    async fn connect(
        &self,
        data_source: &DataSource,
    ) -> GatewayResult<Box<dyn ExternalConnection>> {
        let breaker = self.breaker_for(data_source.id);
        if !breaker.is_allowed() {
            return Err(GatewayError::execution(format!(
                "circuit open for data source {}",
                data_source.id
            )));
        }

        let mut attempt = 0;
        loop {
            match self.inner.connect(data_source).await {
                Ok(conn) => {
                    breaker.record_success();
                    return Ok(conn);
                }
                Err(err) if err.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        data_source_id = %data_source.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient connect failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    breaker.record_failure();
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyFactory {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl ConnectionFactory for FlakyFactory {
        async fn connect(
            &self,
            _data_source: &DataSource,
        ) -> GatewayResult<Box<dyn ExternalConnection>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(GatewayError::execution("transient"))
            } else {
                Ok(Box::new(NullConnection))
            }
        }
    }

    struct NullConnection;

    #[async_trait]
    impl ExternalConnection for NullConnection {
        async fn query(
            &self,
            _sql: &str,
            _params: &[SqlParam],
            _timeout: Duration,
        ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>> {
            Ok(Vec::new())
        }
    }

    fn data_source() -> DataSource {
        DataSource {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            dialect: Dialect::Postgres,
            connection_descriptor: "host=localhost".into(),
            last_schema_refresh: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_connect_failures() {
        let factory = ResilientConnectionFactory::new(
            Arc::new(FlakyFactory {
                calls: AtomicU32::new(0),
                fail_first: 2,
            }),
            RetryConfig {
                max_attempts: 3,
                ..RetryConfig::default()
            },
        );

        assert!(factory.connect(&data_source()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_circuit_after_sustained_failures() {
        let factory = ResilientConnectionFactory::new(
            Arc::new(FlakyFactory {
                calls: AtomicU32::new(0),
                fail_first: u32::MAX,
            }),
            RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
        )
        .with_breaker_config(CircuitBreakerConfig {
            failure_threshold: 2,
            ..CircuitBreakerConfig::default()
        });

        let ds = data_source();
        for _ in 0..2 {
            assert!(factory.connect(&ds).await.is_err());
        }
        // Circuit is now open: the inner factory is no longer dialed.
        let err = factory.connect(&ds).await.err().unwrap();
        assert!(err.to_string().contains("circuit open"));
    }
}
