//! Query progress broadcast
//!
//! Fans execution-stage notifications out to interested clients over a tokio
//! broadcast channel. Delivery is best-effort: no subscribers means the
//! event is dropped, and a lagged subscriber misses events rather than
//! slowing the query down.

use async_trait::async_trait;
use ferry_engine::{ProgressNotifier, QueryStage};
use ferry_core::RequestId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub request_id: RequestId,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ProgressBroadcaster {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressBroadcaster {
    fn publish(&self, event: ProgressEvent) {
        let stage = event.stage.clone();
        if self.tx.send(event).is_err() {
            debug!(stage = %stage, "no progress subscribers");
        }
    }
}

#[async_trait]
impl ProgressNotifier for ProgressBroadcaster {
    async fn notify(&self, request_id: &RequestId, stage: QueryStage) {
        self.publish(ProgressEvent {
            request_id: request_id.clone(),
            stage: stage.as_str().to_string(),
            row_count: None,
            error: None,
        });
    }

    async fn completed(&self, request_id: &RequestId, row_count: usize) {
        self.publish(ProgressEvent {
            request_id: request_id.clone(),
            stage: "completed".to_string(),
            row_count: Some(row_count),
            error: None,
        });
    }

    async fn failed(&self, request_id: &RequestId, error: &str) {
        self.publish(ProgressEvent {
            request_id: request_id.clone(),
            stage: "failed".to_string(),
            row_count: None,
            error: Some(error.to_string()),
        });
    }
}
