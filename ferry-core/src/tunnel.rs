//! Tunnel message contracts
//!
//! The fixed RPC surface multiplexed over one persistent WebSocket per agent
//! connection. Server pushes are fire-and-forget; the agent answers
//! asynchronously with the matching `AgentMessage` carrying the same
//! `requestId`. `Ping` and `Heartbeat` are uncorrelated.
//!
//! Payloads are JSON with camelCase field casing; the casing is part of the
//! wire contract and must not change between agent versions.

use crate::identity::{DataSourceId, RequestId};
use crate::model::{CrudOperation, Dialect, DiscoveredSchema};
use crate::query::{QueryDefinition, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// SERVER -> AGENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryRequest {
    pub request_id: RequestId,
    pub data_source_id: DataSourceId,
    pub dialect: Dialect,
    pub query: QueryDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverSchemaRequest {
    pub request_id: RequestId,
    pub data_source_id: DataSourceId,
    pub dialect: Dialect,
    pub force_refresh: bool,
}

/// Raw preview query. The SQL is built control-plane-side by the explore
/// builder from the discovered schema, never from user text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreRequest {
    pub request_id: RequestId,
    pub data_source_id: DataSourceId,
    pub dialect: Dialect,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudPagination {
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default = "default_sort_dir")]
    pub sort_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<HashMap<String, String>>,
}

fn default_sort_dir() -> String {
    "asc".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudRequest {
    pub request_id: RequestId,
    /// Wire-compatible entity name; parsed into `EntityKind` on receipt.
    pub entity_type: String,
    pub operation: CrudOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<CrudPagination>,
}

/// Messages pushed from the control plane to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    ExecuteQuery(ExecuteQueryRequest),
    DiscoverSchema(DiscoverSchemaRequest),
    Explore(ExploreRequest),
    ExecuteCrud(CrudRequest),
    /// Liveness probe; uncorrelated, the agent just logs it.
    Ping,
    /// Reply to `AgentMessage::Authenticate`. On `ok: false` the server
    /// closes the socket without registering the connection.
    #[serde(rename_all = "camelCase")]
    AuthenticateResult {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

// ============================================================================
// AGENT -> SERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub agent_version: String,
    pub data_source_ids: Vec<DataSourceId>,
    pub timestamp: crate::identity::Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryResponse {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverSchemaResponse {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<DiscoveredSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreResponse {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudResponse {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Explicit agent-reported failure for a correlated request. Resolves the
/// matching waiter with this exact message, regardless of response kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelError {
    pub request_id: RequestId,
    pub error: String,
}

/// Messages the agent sends to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentMessage {
    /// Must be the first message on any connection.
    #[serde(rename_all = "camelCase")]
    Authenticate { api_key: String },
    Heartbeat(Heartbeat),
    QueryResult(ExecuteQueryResponse),
    SchemaResult(DiscoverSchemaResponse),
    ExploreResult(ExploreResponse),
    CrudResult(CrudResponse),
    Error(TunnelError),
}
