//! Error types for Ferry operations

use crate::identity::{DataSourceId, RequestId, TenantId};
use std::time::Duration;
use thiserror::Error;

/// Gateway error taxonomy.
///
/// The variants are deliberately coarse: callers route on the category, not
/// the message. `Timeout` is kept distinct from `Execution` so a caller can
/// tell "the agent never answered" from "the agent answered with a failure".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed query or a column reference outside the discovered schema.
    /// Never retried, surfaced verbatim.
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    /// Missing data source, table, or tenant.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// Translation failure, external-database failure, or unreachable agent.
    #[error("Execution failed: {reason}")]
    Execution { reason: String },

    /// No agent is connected for a self-hosted tenant. A distinct execution
    /// failure so the caller fails fast instead of waiting out a timeout.
    #[error("No gateway agent connected for tenant {tenant_id}")]
    AgentNotConnected { tenant_id: TenantId },

    /// Tunnel deadline exceeded before the agent responded.
    #[error("Agent did not respond within {timeout:?} for request {request_id}")]
    Timeout {
        request_id: RequestId,
        timeout: Duration,
    },

    /// Bad, expired, or revoked agent API key. The connection is rejected
    /// and never registered.
    #[error("Agent authentication failed: {reason}")]
    Authentication { reason: String },
}

impl GatewayError {
    pub fn validation(reason: impl Into<String>) -> Self {
        GatewayError::Validation {
            reason: reason.into(),
        }
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        GatewayError::Execution {
            reason: reason.into(),
        }
    }

    pub fn table_not_found(table: &str) -> Self {
        GatewayError::NotFound {
            what: "Table",
            id: table.to_string(),
        }
    }

    pub fn data_source_not_found(id: DataSourceId) -> Self {
        GatewayError::NotFound {
            what: "Data source",
            id: id.to_string(),
        }
    }

    /// Whether the transport layer may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Execution { .. })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!GatewayError::validation("bad column").is_retryable());
        assert!(GatewayError::execution("connection reset").is_retryable());
    }

    #[test]
    fn timeout_is_distinct_from_execution() {
        let err = GatewayError::Timeout {
            request_id: "abc".into(),
            timeout: Duration::from_secs(60),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn agent_not_connected_names_the_tenant() {
        let tenant_id = Uuid::new_v4();
        let err = GatewayError::AgentNotConnected { tenant_id };
        assert!(err.to_string().contains(&tenant_id.to_string()));
    }
}
