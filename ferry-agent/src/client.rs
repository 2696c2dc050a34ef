//! Outbound tunnel client
//!
//! The agent dials out, so no inbound firewall hole is needed. Session
//! lifecycle: connect, send `Authenticate` as the very first frame, wait for
//! the verdict, then run a heartbeat task and the push dispatch loop until
//! the socket drops. Reconnects back off exponentially with jitter and the
//! delay resets after a session that authenticated; a rejected key is fatal
//! because retrying it can never succeed.

use crate::config::AgentConfig;
use crate::handlers::AgentHandlers;
use chrono::Utc;
use ferry_core::{AgentMessage, GatewayError, GatewayResult, Heartbeat, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const AUTH_REPLY_DEADLINE: Duration = Duration::from_secs(10);

enum SessionEnd {
    /// Socket dropped after a successful handshake; reconnect with a fresh
    /// backoff window.
    Disconnected,
    /// Shutdown token fired.
    Shutdown,
}

pub struct AgentClient {
    config: AgentConfig,
    handlers: Arc<AgentHandlers>,
}

impl AgentClient {
    pub fn new(config: AgentConfig, handlers: Arc<AgentHandlers>) -> Self {
        Self { config, handlers }
    }

    /// Run until shutdown or a fatal authentication rejection.
    pub async fn run(&self, shutdown: CancellationToken) -> GatewayResult<()> {
        let mut backoff = self.config.reconnect_base();

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            match self.session(&shutdown).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Disconnected) => {
                    backoff = self.config.reconnect_base();
                    info!("tunnel dropped, reconnecting");
                }
                Err(err @ GatewayError::Authentication { .. }) => {
                    // The server rejected the key; retrying is pointless.
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, "tunnel session failed");
                }
            }

            let delay = jittered(backoff);
            debug!(delay_ms = delay.as_millis() as u64, "reconnect backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Ok(()),
            }
            backoff = (backoff * 2).min(self.config.reconnect_max());
        }
    }

    async fn session(&self, shutdown: &CancellationToken) -> GatewayResult<SessionEnd> {
        let (socket, _) = connect_async(&self.config.server_url)
            .await
            .map_err(|e| GatewayError::execution(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = socket.split();

        // Authenticate must be the first frame on every (re)connection.
        let auth = AgentMessage::Authenticate {
            api_key: self.config.api_key.clone(),
        };
        let text = serde_json::to_string(&auth)
            .map_err(|e| GatewayError::execution(format!("encode failed: {e}")))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::execution(format!("handshake send failed: {e}")))?;

        let verdict = tokio::time::timeout(AUTH_REPLY_DEADLINE, stream.next())
            .await
            .map_err(|_| GatewayError::execution("no authenticate verdict before deadline"))?;
        match verdict {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::AuthenticateResult { ok: true, .. }) => {}
                Ok(ServerMessage::AuthenticateResult { ok: false, error }) => {
                    return Err(GatewayError::Authentication {
                        reason: error.unwrap_or_else(|| "key rejected".into()),
                    });
                }
                _ => return Err(GatewayError::execution("unexpected handshake reply")),
            },
            _ => return Err(GatewayError::execution("socket closed during handshake")),
        }
        info!("tunnel authenticated");

        let (tx, mut rx) = mpsc::channel::<AgentMessage>(64);

        let mut writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match serde_json::to_string(&msg) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "unserializable outbound message dropped"),
                }
            }
        });

        // Heartbeats run independently of request handling; a full push
        // queue must not starve liveness reporting.
        let heartbeat_tx = tx.clone();
        let heartbeat_interval = self.config.heartbeat_interval();
        let data_source_ids = self.handlers.data_source_ids();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            loop {
                ticker.tick().await;
                let beat = AgentMessage::Heartbeat(Heartbeat {
                    agent_version: env!("CARGO_PKG_VERSION").to_string(),
                    data_source_ids: data_source_ids.clone(),
                    timestamp: Utc::now(),
                });
                if heartbeat_tx.send(beat).await.is_err() {
                    break;
                }
            }
        });

        let end = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(push) => {
                            // One task per push so a slow query does not
                            // block schema discovery behind it.
                            let handlers = self.handlers.clone();
                            let reply_tx = tx.clone();
                            tokio::spawn(async move {
                                if let Some(reply) = handlers.handle(push).await {
                                    if reply_tx.send(reply).await.is_err() {
                                        warn!("reply dropped: session already closed");
                                    }
                                }
                            });
                        }
                        Err(err) => warn!(error = %err, "undecodable push dropped"),
                    },
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "tunnel socket error");
                        break SessionEnd::Disconnected;
                    }
                },
                _ = &mut writer => break SessionEnd::Disconnected,
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
            }
        };

        heartbeat.abort();
        writer.abort();
        Ok(end)
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = (base.as_millis() as u64) / 5;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
}
