//! Response correlation for tunneled requests
//!
//! The tunnel is fire-and-forget: a push carries a request id and the agent
//! answers with the same id some time later, in any order. Each in-flight
//! request parks a oneshot waiter in a per-kind pool; an ownership map ties
//! every request id to the tenant that issued it so a disconnect can fail
//! exactly that tenant's requests and nobody else's.
//!
//! Resolution is exactly-once by construction: completing removes the
//! sender, and the waiter slot is reclaimed on every exit path (response,
//! timeout, cancellation, caller drop) via the pending handle's `Drop`.

use dashmap::{mapref::entry::Entry, DashMap};
use ferry_core::{
    CrudResponse, DiscoverSchemaResponse, ExecuteQueryResponse, ExploreResponse, GatewayError,
    GatewayResult, RequestId, TenantId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct WaiterPool<T> {
    waiters: DashMap<RequestId, oneshot::Sender<GatewayResult<T>>>,
}

impl<T> Default for WaiterPool<T> {
    fn default() -> Self {
        Self {
            waiters: DashMap::new(),
        }
    }
}

impl<T> WaiterPool<T> {
    fn insert(&self, request_id: &RequestId, tx: oneshot::Sender<GatewayResult<T>>) {
        self.waiters.insert(request_id.clone(), tx);
    }

    /// Resolve the waiter if it is still parked. Returns false when no
    /// waiter holds this id (already resolved, timed out, or never ours).
    fn resolve(&self, request_id: &RequestId, result: GatewayResult<T>) -> bool {
        match self.waiters.remove(request_id) {
            Some((_, tx)) => {
                // A receiver dropped between removal and send loses the
                // race benignly; the slot is already gone either way.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    fn remove(&self, request_id: &RequestId) {
        self.waiters.remove(request_id);
    }

    fn contains(&self, request_id: &RequestId) -> bool {
        self.waiters.contains_key(request_id)
    }
}

/// One awaited tunnel response. Dropping it (on any exit path) reclaims the
/// waiter slot and the ownership entry.
pub struct PendingResponse<T> {
    request_id: RequestId,
    rx: oneshot::Receiver<GatewayResult<T>>,
    pool: Arc<WaiterPool<T>>,
    owners: Arc<DashMap<RequestId, TenantId>>,
}

impl<T> PendingResponse<T> {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Suspend until the agent answers, the deadline passes, or the caller's
    /// cancellation token fires — whichever comes first.
    pub async fn wait(
        mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> GatewayResult<T> {
        tokio::select! {
            result = &mut self.rx => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(GatewayError::execution("response channel closed")),
            },
            _ = tokio::time::sleep(timeout) => Err(GatewayError::Timeout {
                request_id: self.request_id.clone(),
                timeout,
            }),
            _ = cancel.cancelled() => Err(GatewayError::execution(format!(
                "request {} cancelled",
                self.request_id
            ))),
        }
    }
}

impl<T> Drop for PendingResponse<T> {
    fn drop(&mut self) {
        self.pool.remove(&self.request_id);
        self.owners.remove(&self.request_id);
    }
}

/// Matches asynchronous agent responses to their parked callers.
#[derive(Default)]
pub struct ResponseCorrelator {
    queries: Arc<WaiterPool<ExecuteQueryResponse>>,
    schemas: Arc<WaiterPool<DiscoverSchemaResponse>>,
    explores: Arc<WaiterPool<ExploreResponse>>,
    cruds: Arc<WaiterPool<CrudResponse>>,
    owners: Arc<DashMap<RequestId, TenantId>>,
}

macro_rules! register_fn {
    ($register:ident, $complete:ident, $pool:ident, $ty:ty) => {
        pub fn $register(
            &self,
            tenant_id: TenantId,
            request_id: RequestId,
        ) -> GatewayResult<PendingResponse<$ty>> {
            self.claim(tenant_id, &request_id)?;
            let (tx, rx) = oneshot::channel();
            self.$pool.insert(&request_id, tx);
            Ok(PendingResponse {
                request_id,
                rx,
                pool: self.$pool.clone(),
                owners: self.owners.clone(),
            })
        }

        pub fn $complete(&self, response: $ty) {
            let request_id = response.request_id.clone();
            if !self.$pool.resolve(&request_id, Ok(response)) {
                debug!(request_id = %request_id, "orphaned response dropped");
            }
        }
    };
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    register_fn!(register_query, complete_query, queries, ExecuteQueryResponse);
    register_fn!(register_schema, complete_schema, schemas, DiscoverSchemaResponse);
    register_fn!(register_explore, complete_explore, explores, ExploreResponse);
    register_fn!(register_crud, complete_crud, cruds, CrudResponse);

    /// Resolve whichever waiter holds this id with the agent's error text,
    /// verbatim.
    pub fn fail(&self, request_id: &RequestId, error: impl Into<String>) {
        let err = GatewayError::execution(error);
        let resolved = self.queries.resolve(request_id, Err(err.clone()))
            || self.schemas.resolve(request_id, Err(err.clone()))
            || self.explores.resolve(request_id, Err(err.clone()))
            || self.cruds.resolve(request_id, Err(err));
        if !resolved {
            debug!(request_id = %request_id, "orphaned error dropped");
        }
    }

    /// Fail every request the tenant owns. Called when the tenant's agent
    /// connection is lost; requests of other tenants are untouched.
    pub fn cancel_all(&self, tenant_id: TenantId) {
        let owned: Vec<RequestId> = self
            .owners
            .iter()
            .filter(|entry| *entry.value() == tenant_id)
            .map(|entry| entry.key().clone())
            .collect();

        if owned.is_empty() {
            return;
        }
        info!(tenant_id = %tenant_id, count = owned.len(), "cancelling in-flight requests");

        let err = GatewayError::AgentNotConnected { tenant_id };
        for request_id in owned {
            let _ = self.queries.resolve(&request_id, Err(err.clone()))
                || self.schemas.resolve(&request_id, Err(err.clone()))
                || self.explores.resolve(&request_id, Err(err.clone()))
                || self.cruds.resolve(&request_id, Err(err.clone()));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.owners.len()
    }

    fn claim(&self, tenant_id: TenantId, request_id: &RequestId) -> GatewayResult<()> {
        match self.owners.entry(request_id.clone()) {
            Entry::Occupied(_) => Err(GatewayError::validation(format!(
                "request id already in flight: {request_id}"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(tenant_id);
                Ok(())
            }
        }
    }

    #[cfg(test)]
    fn has_query_waiter(&self, request_id: &RequestId) -> bool {
        self.queries.contains(request_id)
    }
}
