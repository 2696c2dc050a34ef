//! Live agent connection tracking
//!
//! Dual-keyed: connection id for socket lifecycle events, tenant id for
//! routing. One agent per tenant; a second connection for the same tenant
//! overwrites the tenant mapping (last write wins), and the superseded
//! socket's unregister must not tear down the newer mapping.

use chrono::Utc;
use dashmap::DashMap;
use ferry_core::{AgentConnection, ConnectionId, Heartbeat, ServerMessage, TenantId};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct AgentEntry {
    info: AgentConnection,
    sender: mpsc::Sender<ServerMessage>,
}

pub struct ConnectionRegistry {
    heartbeat_interval: Duration,
    by_connection: DashMap<ConnectionId, AgentEntry>,
    by_tenant: DashMap<TenantId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            by_connection: DashMap::new(),
            by_tenant: DashMap::new(),
        }
    }

    /// Register an authenticated connection and make it the tenant's active
    /// agent, displacing any previous mapping.
    pub fn register(
        &self,
        tenant_id: TenantId,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) {
        let now = Utc::now();
        info!(tenant_id = %tenant_id, connection_id = %connection_id, "agent registered");
        self.by_connection.insert(
            connection_id.clone(),
            AgentEntry {
                info: AgentConnection {
                    tenant_id,
                    connection_id: connection_id.clone(),
                    agent_version: None,
                    connected_at: now,
                    last_heartbeat_at: now,
                    data_source_ids: Vec::new(),
                },
                sender,
            },
        );
        self.by_tenant.insert(tenant_id, connection_id);
    }

    /// Remove a connection. Returns true when it was still the tenant's
    /// active agent; a superseded connection returns false and leaves the
    /// tenant mapping alone.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let Some((_, entry)) = self.by_connection.remove(connection_id) else {
            return false;
        };
        let was_current = self
            .by_tenant
            .remove_if(&entry.info.tenant_id, |_, current| current == connection_id)
            .is_some();
        info!(
            tenant_id = %entry.info.tenant_id,
            connection_id = %connection_id,
            was_current,
            "agent unregistered"
        );
        was_current
    }

    /// Fold a heartbeat into the connection record. A heartbeat racing a
    /// disconnect simply finds no entry and is dropped.
    pub fn heartbeat(&self, connection_id: &ConnectionId, heartbeat: &Heartbeat) {
        match self.by_connection.get_mut(connection_id) {
            Some(mut entry) => {
                entry.info.last_heartbeat_at = Utc::now();
                entry.info.agent_version = Some(heartbeat.agent_version.clone());
                entry.info.data_source_ids = heartbeat.data_source_ids.clone();
            }
            None => {
                debug!(connection_id = %connection_id, "heartbeat for unknown connection dropped")
            }
        }
    }

    pub fn is_online(&self, tenant_id: TenantId) -> bool {
        self.by_tenant.contains_key(&tenant_id)
    }

    /// Online and heard from within twice the heartbeat interval.
    pub fn is_healthy(&self, tenant_id: TenantId) -> bool {
        self.connection(tenant_id).is_some_and(|info| {
            let age = Utc::now().signed_duration_since(info.last_heartbeat_at);
            age.to_std()
                .map(|age| age < self.heartbeat_interval * 2)
                .unwrap_or(true)
        })
    }

    /// Snapshot of the tenant's active connection record.
    pub fn connection(&self, tenant_id: TenantId) -> Option<AgentConnection> {
        let connection_id = self.by_tenant.get(&tenant_id)?.clone();
        self.by_connection
            .get(&connection_id)
            .map(|entry| entry.info.clone())
    }

    /// Outbound channel for pushing to the tenant's active agent.
    pub fn sender(&self, tenant_id: TenantId) -> Option<mpsc::Sender<ServerMessage>> {
        let connection_id = self.by_tenant.get(&tenant_id)?.clone();
        self.by_connection
            .get(&connection_id)
            .map(|entry| entry.sender.clone())
    }

    pub fn connected_count(&self) -> usize {
        self.by_connection.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            agent_version: "0.3.0".into(),
            data_source_ids: vec![Uuid::new_v4()],
            timestamp: Utc::now(),
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_secs(30))
    }

    fn channel() -> mpsc::Sender<ServerMessage> {
        mpsc::channel(8).0
    }

    #[test]
    fn register_makes_tenant_online() {
        let registry = registry();
        let tenant = Uuid::new_v4();
        assert!(!registry.is_online(tenant));

        registry.register(tenant, "c1".into(), channel());
        assert!(registry.is_online(tenant));
        assert!(registry.is_healthy(tenant));
        assert!(registry.sender(tenant).is_some());
    }

    #[test]
    fn reconnect_displaces_previous_connection() {
        let registry = registry();
        let tenant = Uuid::new_v4();

        registry.register(tenant, "old".into(), channel());
        registry.register(tenant, "new".into(), channel());

        assert_eq!(registry.connection(tenant).unwrap().connection_id, "new");

        // The stale socket closing must not take the tenant offline.
        assert!(!registry.unregister(&"old".to_string()));
        assert!(registry.is_online(tenant));

        assert!(registry.unregister(&"new".to_string()));
        assert!(!registry.is_online(tenant));
    }

    #[test]
    fn heartbeat_updates_connection_record() {
        let registry = registry();
        let tenant = Uuid::new_v4();
        registry.register(tenant, "c1".into(), channel());

        let hb = heartbeat();
        registry.heartbeat(&"c1".to_string(), &hb);

        let info = registry.connection(tenant).unwrap();
        assert_eq!(info.agent_version.as_deref(), Some("0.3.0"));
        assert_eq!(info.data_source_ids, hb.data_source_ids);
    }

    #[test]
    fn heartbeat_for_missing_connection_is_dropped() {
        let registry = registry();
        registry.heartbeat(&"gone".to_string(), &heartbeat());
        assert_eq!(registry.connected_count(), 0);
    }

    #[test]
    fn stale_heartbeat_makes_tenant_unhealthy_but_still_online() {
        let registry = ConnectionRegistry::new(Duration::ZERO);
        let tenant = Uuid::new_v4();
        registry.register(tenant, "c1".into(), channel());

        assert!(registry.is_online(tenant));
        assert!(!registry.is_healthy(tenant));
    }
}
