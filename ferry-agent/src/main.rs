//! On-premises agent binary
//!
//! Loads the TOML config, wires the local execution engine, and keeps an
//! outbound tunnel to the gateway open until ctrl-c.

mod client;
mod config;
mod handlers;

use client::AgentClient;
use config::AgentConfig;
use ferry_engine::{
    CrudExecutor, EntityRegistry, PlaintextEncryption, PostgresConnectionFactory,
    ResilientConnectionFactory, RetryConfig,
};
use handlers::AgentHandlers;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FERRY_AGENT_CONFIG").ok())
        .unwrap_or_else(|| "ferry-agent.toml".to_string());
    let config = AgentConfig::load(&PathBuf::from(&path)).await?;
    info!(config = %path, tenant_id = %config.tenant_id, "agent starting");

    let factory = Arc::new(ResilientConnectionFactory::new(
        Arc::new(PostgresConnectionFactory::new(Arc::new(PlaintextEncryption))),
        RetryConfig::default(),
    ));
    let handlers = Arc::new(AgentHandlers::new(
        factory,
        config.resolve_data_sources()?,
        CrudExecutor::new(EntityRegistry::new()),
    ));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    AgentClient::new(config, handlers).run(shutdown).await?;
    Ok(())
}
