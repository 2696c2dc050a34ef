//! Ferry Gateway - Control-Plane Tunnel Hub
//!
//! Terminates agent WebSocket connections, correlates tunneled responses
//! back to their callers, validates agent API keys, and routes each data
//! operation either to the local engine (managed tenants) or through the
//! tunnel (self-hosted tenants).

pub mod api;
pub mod auth;
pub mod config;
pub mod correlator;
pub mod hub;
pub mod progress;
pub mod registry;
pub mod routing;

pub use api::{api_router, ApiState};
pub use auth::{generate_api_key, ApiKeyRecord, ApiKeyStore, ApiKeyValidator, InMemoryApiKeyStore};
pub use config::GatewayConfig;
pub use correlator::{PendingResponse, ResponseCorrelator};
pub use hub::{ws_handler, GatewayState};
pub use progress::{ProgressBroadcaster, ProgressEvent};
pub use registry::ConnectionRegistry;
pub use routing::{GatewayRouter, LocalServices, StaticTenantDirectory, TenantDirectory};
