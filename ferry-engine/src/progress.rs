//! Query progress notifications
//!
//! The engine reports coarse stages so interactive clients can show what a
//! long query is doing. Delivery is best-effort: a notifier that fails or
//! blocks must never affect query execution, so implementations are expected
//! to swallow their own errors.

use async_trait::async_trait;
use ferry_core::RequestId;

/// Coarse execution stage, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Validating,
    Translating,
    Executing,
    BuildingResult,
}

impl QueryStage {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStage::Validating => "validating",
            QueryStage::Translating => "translating",
            QueryStage::Executing => "executing",
            QueryStage::BuildingResult => "buildingResult",
        }
    }
}

#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn notify(&self, request_id: &RequestId, stage: QueryStage);
    /// Terminal success signal.
    async fn completed(&self, request_id: &RequestId, row_count: usize);
    /// Terminal failure signal.
    async fn failed(&self, request_id: &RequestId, error: &str);
}

/// Used where no client is listening (agent-side execution, tests).
pub struct NoopProgressNotifier;

#[async_trait]
impl ProgressNotifier for NoopProgressNotifier {
    async fn notify(&self, _request_id: &RequestId, _stage: QueryStage) {}
    async fn completed(&self, _request_id: &RequestId, _row_count: usize) {}
    async fn failed(&self, _request_id: &RequestId, _error: &str) {}
}
