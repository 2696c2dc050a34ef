//! Operation routing
//!
//! Every data operation enters here with a tenant and a data source. Managed
//! tenants run on the local engine; self-hosted tenants get the operation
//! wrapped into a tunnel push and the caller parked on the correlator. An
//! offline agent fails immediately, without burning the response timeout.

use crate::correlator::{PendingResponse, ResponseCorrelator};
use crate::registry::ConnectionRegistry;
use async_trait::async_trait;
use dashmap::DashMap;
use ferry_core::{
    new_request_id, CrudRequest, CrudResponse, DataSource, DataSourceId, DiscoverSchemaRequest,
    DiscoveredSchema, ExecuteQueryRequest, ExploreRequest, GatewayError, GatewayResult,
    HostingMode, QueryDefinition, QueryResult, ServerMessage, TenantId, Timestamp,
};
use ferry_engine::{
    CrudExecutor, ExploreService, QueryExecutionEngine, SchemaRefreshSink, SchemaService,
};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Tenant and data source lookups, backed by whatever stores tenants.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn hosting_mode(&self, tenant_id: TenantId) -> GatewayResult<HostingMode>;
    async fn data_source(
        &self,
        tenant_id: TenantId,
        data_source_id: DataSourceId,
    ) -> GatewayResult<DataSource>;
}

/// Map-backed directory for tests and single-process deployments.
#[derive(Default)]
pub struct StaticTenantDirectory {
    modes: DashMap<TenantId, HostingMode>,
    data_sources: DashMap<DataSourceId, DataSource>,
}

impl StaticTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, tenant_id: TenantId, mode: HostingMode) {
        self.modes.insert(tenant_id, mode);
    }

    pub fn add_data_source(&self, data_source: DataSource) {
        self.data_sources.insert(data_source.id, data_source);
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn hosting_mode(&self, tenant_id: TenantId) -> GatewayResult<HostingMode> {
        self.modes
            .get(&tenant_id)
            .map(|m| *m)
            .ok_or(GatewayError::NotFound {
                what: "Tenant",
                id: tenant_id.to_string(),
            })
    }

    async fn data_source(
        &self,
        tenant_id: TenantId,
        data_source_id: DataSourceId,
    ) -> GatewayResult<DataSource> {
        self.data_sources
            .get(&data_source_id)
            .filter(|ds| ds.tenant_id == tenant_id)
            .map(|ds| ds.clone())
            .ok_or_else(|| GatewayError::data_source_not_found(data_source_id))
    }
}

/// Fresh schema discoveries stamp the stored data source record.
#[async_trait]
impl SchemaRefreshSink for StaticTenantDirectory {
    async fn schema_refreshed(&self, data_source_id: DataSourceId, refreshed_at: Timestamp) {
        if let Some(mut ds) = self.data_sources.get_mut(&data_source_id) {
            ds.last_schema_refresh = Some(refreshed_at);
        }
    }
}

/// Local engine services used for managed tenants.
pub struct LocalServices {
    pub engine: Arc<QueryExecutionEngine>,
    pub schema: Arc<SchemaService>,
    pub explore: Arc<ExploreService>,
    pub crud: Arc<CrudExecutor>,
}

pub struct GatewayRouter {
    directory: Arc<dyn TenantDirectory>,
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<ResponseCorrelator>,
    local: LocalServices,
    response_timeout: Duration,
}

impl GatewayRouter {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<ResponseCorrelator>,
        local: LocalServices,
        response_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            registry,
            correlator,
            local,
            response_timeout,
        }
    }

    pub async fn execute_query(
        &self,
        tenant_id: TenantId,
        data_source_id: DataSourceId,
        query: &QueryDefinition,
        cancel: &CancellationToken,
    ) -> GatewayResult<QueryResult> {
        let data_source = self.directory.data_source(tenant_id, data_source_id).await?;
        match self.directory.hosting_mode(tenant_id).await? {
            HostingMode::Managed => {
                self.local
                    .engine
                    .execute(&new_request_id(), query, &data_source)
                    .await
            }
            HostingMode::SelfHosted => {
                let request_id = new_request_id();
                let pending = self.correlator.register_query(tenant_id, request_id.clone())?;
                self.push(
                    tenant_id,
                    &pending,
                    ServerMessage::ExecuteQuery(ExecuteQueryRequest {
                        request_id,
                        data_source_id,
                        dialect: data_source.dialect,
                        query: query.clone(),
                    }),
                )
                .await?;
                let response = pending.wait(self.response_timeout, cancel).await?;
                if response.success {
                    response
                        .result
                        .ok_or_else(|| GatewayError::execution("agent reported success without a result"))
                } else {
                    Err(GatewayError::execution(
                        response.error.unwrap_or_else(|| "agent query failed".into()),
                    ))
                }
            }
        }
    }

    pub async fn discover_schema(
        &self,
        tenant_id: TenantId,
        data_source_id: DataSourceId,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> GatewayResult<DiscoveredSchema> {
        let data_source = self.directory.data_source(tenant_id, data_source_id).await?;
        match self.directory.hosting_mode(tenant_id).await? {
            HostingMode::Managed => self.local.schema.discover(&data_source, force_refresh).await,
            HostingMode::SelfHosted => {
                let request_id = new_request_id();
                let pending = self.correlator.register_schema(tenant_id, request_id.clone())?;
                self.push(
                    tenant_id,
                    &pending,
                    ServerMessage::DiscoverSchema(DiscoverSchemaRequest {
                        request_id,
                        data_source_id,
                        dialect: data_source.dialect,
                        force_refresh,
                    }),
                )
                .await?;
                let response = pending.wait(self.response_timeout, cancel).await?;
                if response.success {
                    response
                        .schema
                        .ok_or_else(|| GatewayError::execution("agent reported success without a schema"))
                } else {
                    Err(GatewayError::execution(
                        response.error.unwrap_or_else(|| "agent schema discovery failed".into()),
                    ))
                }
            }
        }
    }

    /// Run pre-built explore SQL. The SQL comes from the explore builder
    /// over the discovered schema, never from user text.
    pub async fn explore(
        &self,
        tenant_id: TenantId,
        data_source_id: DataSourceId,
        sql: String,
        cancel: &CancellationToken,
    ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>> {
        let data_source = self.directory.data_source(tenant_id, data_source_id).await?;
        match self.directory.hosting_mode(tenant_id).await? {
            HostingMode::Managed => self.local.explore.explore(&data_source, &sql).await,
            HostingMode::SelfHosted => {
                let request_id = new_request_id();
                let pending = self.correlator.register_explore(tenant_id, request_id.clone())?;
                self.push(
                    tenant_id,
                    &pending,
                    ServerMessage::Explore(ExploreRequest {
                        request_id,
                        data_source_id,
                        dialect: data_source.dialect,
                        sql,
                    }),
                )
                .await?;
                let response = pending.wait(self.response_timeout, cancel).await?;
                if response.success {
                    Ok(response.rows)
                } else {
                    Err(GatewayError::execution(
                        response.error.unwrap_or_else(|| "agent explore failed".into()),
                    ))
                }
            }
        }
    }

    /// CRUD responses carry their own status code, so both routes hand back
    /// the response as-is instead of mapping failure into `Err`.
    pub async fn execute_crud(
        &self,
        tenant_id: TenantId,
        mut request: CrudRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<CrudResponse> {
        match self.directory.hosting_mode(tenant_id).await? {
            HostingMode::Managed => Ok(self.local.crud.execute(&request).await),
            HostingMode::SelfHosted => {
                let request_id = new_request_id();
                request.request_id = request_id.clone();
                let pending = self.correlator.register_crud(tenant_id, request_id)?;
                self.push(tenant_id, &pending, ServerMessage::ExecuteCrud(request))
                    .await?;
                pending.wait(self.response_timeout, cancel).await
            }
        }
    }

    /// Deliver one push to the tenant's live agent, failing fast when no
    /// healthy connection exists.
    async fn push<T>(
        &self,
        tenant_id: TenantId,
        pending: &PendingResponse<T>,
        message: ServerMessage,
    ) -> GatewayResult<()> {
        let Some(sender) = self.registry.sender(tenant_id) else {
            return Err(GatewayError::AgentNotConnected { tenant_id });
        };
        info!(tenant_id = %tenant_id, request_id = %pending.request_id(), "tunneling request");
        sender
            .send(message)
            .await
            .map_err(|_| GatewayError::AgentNotConnected { tenant_id })
    }
}
