//! Agent configuration
//!
//! Loaded from a TOML file, with the server url and api key overridable from
//! the environment so the key can stay out of the file.

use ferry_core::{DataSource, GatewayResult, TenantId};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Gateway tunnel endpoint, e.g. `ws://gateway.example.com:8080/gateway/ws`.
    pub server_url: String,
    /// Raw agent api key (`gw_...`). Never logged.
    #[serde(default)]
    pub api_key: String,
    pub tenant_id: TenantId,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    pub id: Uuid,
    pub dialect: String,
    /// Plaintext connection string; the agent config file is the secret
    /// store on-premises.
    pub connection_string: String,
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

impl AgentConfig {
    /// Parse from TOML text and apply `FERRY_AGENT_SERVER_URL` /
    /// `FERRY_AGENT_API_KEY` overrides.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let mut config: AgentConfig = toml::from_str(text).map_err(|e| e.to_string())?;
        if let Ok(url) = std::env::var("FERRY_AGENT_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(key) = std::env::var("FERRY_AGENT_API_KEY") {
            config.api_key = key;
        }
        if config.api_key.is_empty() {
            return Err("api_key missing: set it in the config file or FERRY_AGENT_API_KEY".into());
        }
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, String> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    /// Materialize the configured data sources as engine records.
    pub fn resolve_data_sources(&self) -> GatewayResult<Vec<DataSource>> {
        self.data_sources
            .iter()
            .map(|ds| {
                let dialect = ds
                    .dialect
                    .parse()
                    .map_err(ferry_core::GatewayError::validation)?;
                Ok(DataSource {
                    id: ds.id,
                    tenant_id: self.tenant_id,
                    dialect,
                    connection_descriptor: ds.connection_string.clone(),
                    last_schema_refresh: None,
                })
            })
            .collect()
    }
}
