//! Client-facing data API
//!
//! Thin HTTP surface over the router: callers submit query definitions and
//! schema reads per tenant and data source, and the router decides between
//! the local engine and the agent tunnel. Progress events stream over a
//! WebSocket fed by the broadcaster. Errors map onto conventional status
//! codes so a bad request is distinguishable from an offline agent.

use crate::progress::ProgressBroadcaster;
use crate::routing::GatewayRouter;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ferry_core::{DataSourceId, GatewayError, QueryDefinition, TenantId};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub struct ApiState {
    pub router: GatewayRouter,
    pub progress: ProgressBroadcaster,
}

pub fn api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route(
            "/api/tenants/:tenant_id/data-sources/:data_source_id/query",
            post(execute_query),
        )
        .route(
            "/api/tenants/:tenant_id/data-sources/:data_source_id/schema",
            get(discover_schema),
        )
        .route("/api/progress", get(progress_ws))
        .with_state(state)
}

async fn execute_query(
    State(state): State<Arc<ApiState>>,
    Path((tenant_id, data_source_id)): Path<(TenantId, DataSourceId)>,
    Json(query): Json<QueryDefinition>,
) -> Response {
    let cancel = CancellationToken::new();
    match state
        .router
        .execute_query(tenant_id, data_source_id, &query, &cancel)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct SchemaParams {
    #[serde(default)]
    refresh: bool,
}

async fn discover_schema(
    State(state): State<Arc<ApiState>>,
    Path((tenant_id, data_source_id)): Path<(TenantId, DataSourceId)>,
    Query(params): Query<SchemaParams>,
) -> Response {
    let cancel = CancellationToken::new();
    match state
        .router
        .discover_schema(tenant_id, data_source_id, params.refresh, &cancel)
        .await
    {
        Ok(schema) => Json(schema).into_response(),
        Err(err) => error_response(err),
    }
}

/// `GET /api/progress` upgrade endpoint; every subscriber sees every event.
async fn progress_ws(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    ws.on_upgrade(move |socket| stream_progress(socket, state))
}

async fn stream_progress(mut socket: WebSocket, state: Arc<ApiState>) {
    let mut rx = state.progress.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            // A lagged subscriber misses events rather than slowing queries.
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn error_response(err: GatewayError) -> Response {
    let status = match &err {
        GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
        GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::Execution { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::AgentNotConnected { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Authentication { .. } => StatusCode::UNAUTHORIZED,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
