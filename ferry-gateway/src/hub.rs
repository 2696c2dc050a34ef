//! Agent WebSocket hub
//!
//! Terminates the persistent outbound connection each on-premises agent
//! opens. The protocol is strict about ordering: the very first inbound
//! frame must be `Authenticate`, answered with `AuthenticateResult`; an
//! unauthenticated socket is never registered and never receives pushes.
//! After registration the socket runs two halves: a forwarder draining the
//! per-connection push channel into the sink, and a dispatch loop feeding
//! heartbeats and responses into the registry and correlator. Losing either
//! half tears the connection down, unregisters it, and fails the tenant's
//! in-flight requests.

use crate::auth::ApiKeyValidator;
use crate::config::GatewayConfig;
use crate::correlator::ResponseCorrelator;
use crate::registry::ConnectionRegistry;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use ferry_core::{AgentMessage, ConnectionId, GatewayError, ServerMessage, TenantId};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ConnectionRegistry>,
    pub correlator: Arc<ResponseCorrelator>,
    pub validator: Arc<ApiKeyValidator>,
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Push a liveness probe to the tenant's agent, if one is connected.
    pub async fn ping(&self, tenant_id: TenantId) -> bool {
        match self.registry.sender(tenant_id) {
            Some(sender) => sender.send(ServerMessage::Ping).await.is_ok(),
            None => false,
        }
    }
}

/// `GET /gateway/ws` upgrade endpoint.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<GatewayState>) {
    let tenant_id = match authenticate(&mut socket, &state).await {
        Ok(tenant_id) => tenant_id,
        Err(err) => {
            debug!(error = %err, "agent authentication failed");
            let reply = ServerMessage::AuthenticateResult {
                ok: false,
                error: Some(err.to_string()),
            };
            if let Ok(text) = serde_json::to_string(&reply) {
                let _ = socket.send(Message::Text(text)).await;
            }
            return;
        }
    };

    let connection_id: ConnectionId = Uuid::new_v4().simple().to_string();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.outbound_capacity);

    let ok_reply = ServerMessage::AuthenticateResult {
        ok: true,
        error: None,
    };
    match serde_json::to_string(&ok_reply) {
        Ok(text) => {
            if socket.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        Err(_) => return,
    }

    state
        .registry
        .register(tenant_id, connection_id.clone(), tx);
    info!(tenant_id = %tenant_id, connection_id = %connection_id, "agent tunnel established");

    let (mut sink, mut stream) = socket.split();

    let forward_connection_id = connection_id.clone();
    let mut forward_task = tokio::spawn(async move {
        while let Some(push) = rx.recv().await {
            match serde_json::to_string(&push) {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(connection_id = %forward_connection_id, error = %err, "unserializable push dropped");
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<AgentMessage>(&text) {
                    Ok(msg) => dispatch(&state, &connection_id, msg),
                    Err(err) => {
                        warn!(connection_id = %connection_id, error = %err, "undecodable agent frame dropped");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(connection_id = %connection_id, error = %err, "agent socket error");
                    break;
                }
            },
            _ = &mut forward_task => break,
        }
    }

    forward_task.abort();
    // Only the connection that still owns the tenant mapping may fail the
    // tenant's in-flight requests; a superseded socket must not cancel work
    // running on its replacement.
    if state.registry.unregister(&connection_id) {
        state.correlator.cancel_all(tenant_id);
    }
    info!(tenant_id = %tenant_id, connection_id = %connection_id, "agent tunnel closed");
}

/// Read and validate the mandatory first frame.
async fn authenticate(
    socket: &mut WebSocket,
    state: &GatewayState,
) -> Result<TenantId, GatewayError> {
    let frame = tokio::time::timeout(state.config.auth_deadline, socket.recv())
        .await
        .map_err(|_| GatewayError::Authentication {
            reason: "no authenticate frame before deadline".into(),
        })?;

    let text = match frame {
        Some(Ok(Message::Text(text))) => text,
        _ => {
            return Err(GatewayError::Authentication {
                reason: "expected a text authenticate frame".into(),
            })
        }
    };

    match serde_json::from_str::<AgentMessage>(&text) {
        Ok(AgentMessage::Authenticate { api_key }) => state.validator.validate(&api_key),
        Ok(_) => Err(GatewayError::Authentication {
            reason: "first frame must be authenticate".into(),
        }),
        Err(_) => Err(GatewayError::Authentication {
            reason: "undecodable authenticate frame".into(),
        }),
    }
}

/// Route one decoded agent message to the registry or correlator.
pub(crate) fn dispatch(state: &GatewayState, connection_id: &ConnectionId, msg: AgentMessage) {
    match msg {
        AgentMessage::Authenticate { .. } => {
            warn!(connection_id = %connection_id, "duplicate authenticate ignored");
        }
        AgentMessage::Heartbeat(heartbeat) => {
            state.registry.heartbeat(connection_id, &heartbeat);
        }
        AgentMessage::QueryResult(response) => state.correlator.complete_query(response),
        AgentMessage::SchemaResult(response) => state.correlator.complete_schema(response),
        AgentMessage::ExploreResult(response) => state.correlator.complete_explore(response),
        AgentMessage::CrudResult(response) => state.correlator.complete_crud(response),
        AgentMessage::Error(error) => state.correlator.fail(&error.request_id, error.error),
    }
}
