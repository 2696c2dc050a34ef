//! Gateway server binary
//!
//! Hosts the agent tunnel endpoint and the client data API over one
//! listener. For development, `FERRY_DEV_TENANT_ID` provisions an in-memory
//! API key for that tenant, registers it as self-hosted in the tenant
//! directory, and prints the raw key to stdout once; production deployments
//! replace the in-memory store and directory.

use axum::{routing::get, Router};
use ferry_core::HostingMode;
use ferry_engine::{
    CacheStore, ConnectionFactory, CrudExecutor, EngineConfig, EntityRegistry, ExploreService,
    InMemoryCacheStore, PlaintextEncryption, PostgresConnectionFactory, QueryExecutionEngine,
    ResilientConnectionFactory, RetryConfig, SchemaService,
};
use ferry_gateway::{
    api_router, generate_api_key, ws_handler, ApiKeyValidator, ApiState, ConnectionRegistry,
    GatewayConfig, GatewayRouter, GatewayState, InMemoryApiKeyStore, LocalServices,
    ProgressBroadcaster, ResponseCorrelator, StaticTenantDirectory,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env();

    let registry = Arc::new(ConnectionRegistry::new(config.heartbeat_interval));
    let correlator = Arc::new(ResponseCorrelator::new());
    let directory = Arc::new(StaticTenantDirectory::new());

    let store = Arc::new(InMemoryApiKeyStore::new());
    if let Ok(raw_tenant) = std::env::var("FERRY_DEV_TENANT_ID") {
        let tenant_id: Uuid = raw_tenant.parse()?;
        let (record, raw_key) = generate_api_key(tenant_id, None);
        info!(tenant_id = %tenant_id, key_prefix = %record.key_prefix, "provisioned development agent key");
        // Shown exactly once; only the hash is retained.
        println!("agent api key for tenant {tenant_id}: {raw_key}");
        store.insert(record);
        directory.add_tenant(tenant_id, HostingMode::SelfHosted);
    }

    let factory: Arc<dyn ConnectionFactory> = Arc::new(ResilientConnectionFactory::new(
        Arc::new(PostgresConnectionFactory::new(Arc::new(PlaintextEncryption))),
        RetryConfig::default(),
    ));
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
    let progress = ProgressBroadcaster::new(256);
    let schema = Arc::new(
        SchemaService::new(factory.clone(), cache.clone()).with_refresh_sink(directory.clone()),
    );
    let local = LocalServices {
        engine: Arc::new(QueryExecutionEngine::new(
            factory.clone(),
            schema.clone(),
            cache,
            Arc::new(progress.clone()),
            EngineConfig::default(),
        )),
        schema,
        explore: Arc::new(ExploreService::new(factory)),
        crud: Arc::new(CrudExecutor::new(EntityRegistry::new())),
    };
    let router = GatewayRouter::new(
        directory.clone(),
        registry.clone(),
        correlator.clone(),
        local,
        config.response_timeout,
    );

    let state = Arc::new(GatewayState {
        registry,
        correlator,
        validator: Arc::new(ApiKeyValidator::new(store)),
        config: config.clone(),
    });
    let api = Arc::new(ApiState { router, progress });

    let app = Router::new()
        .route("/gateway/ws", get(ws_handler))
        .with_state(state)
        .merge(api_router(api));

    info!(bind_addr = %config.bind_addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
