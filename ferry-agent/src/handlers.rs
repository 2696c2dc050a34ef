//! Push dispatch handlers
//!
//! One handler per tunneled operation, all running the shared local engine.
//! The tunnel contract is one reply per push: every path out of a handler,
//! including unknown data sources and engine failures, produces a response
//! message carrying the original request id.

use ferry_core::{
    AgentMessage, DataSource, DataSourceId, DiscoverSchemaRequest, DiscoverSchemaResponse,
    ExecuteQueryRequest, ExecuteQueryResponse, ExploreRequest, ExploreResponse, GatewayError,
    ServerMessage,
};
use ferry_engine::{
    CacheStore, ConnectionFactory, CrudExecutor, EngineConfig, ExploreService,
    InMemoryCacheStore, NoopProgressNotifier, QueryExecutionEngine, SchemaService,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AgentHandlers {
    engine: QueryExecutionEngine,
    schema: Arc<SchemaService>,
    explore: ExploreService,
    crud: CrudExecutor,
    data_sources: HashMap<DataSourceId, DataSource>,
}

impl AgentHandlers {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        data_sources: Vec<DataSource>,
        crud: CrudExecutor,
    ) -> Self {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let schema = Arc::new(SchemaService::new(factory.clone(), cache.clone()));
        Self {
            engine: QueryExecutionEngine::new(
                factory.clone(),
                schema.clone(),
                cache,
                Arc::new(NoopProgressNotifier),
                EngineConfig::default(),
            ),
            schema,
            explore: ExploreService::new(factory),
            crud,
            data_sources: data_sources.into_iter().map(|ds| (ds.id, ds)).collect(),
        }
    }

    pub fn data_source_ids(&self) -> Vec<DataSourceId> {
        self.data_sources.keys().copied().collect()
    }

    /// Handle one push; `None` for pushes that need no reply.
    pub async fn handle(&self, push: ServerMessage) -> Option<AgentMessage> {
        match push {
            ServerMessage::ExecuteQuery(req) => Some(self.execute_query(req).await),
            ServerMessage::DiscoverSchema(req) => Some(self.discover_schema(req).await),
            ServerMessage::Explore(req) => Some(self.explore(req).await),
            ServerMessage::ExecuteCrud(req) => {
                Some(AgentMessage::CrudResult(self.crud.execute(&req).await))
            }
            ServerMessage::Ping => {
                debug!("server ping");
                None
            }
            ServerMessage::AuthenticateResult { .. } => {
                warn!("authenticate result outside handshake ignored");
                None
            }
        }
    }

    async fn execute_query(&self, req: ExecuteQueryRequest) -> AgentMessage {
        let outcome = match self.data_source(req.data_source_id) {
            Ok(ds) => self.engine.execute(&req.request_id, &req.query, ds).await,
            Err(err) => Err(err),
        };
        AgentMessage::QueryResult(match outcome {
            Ok(result) => ExecuteQueryResponse {
                request_id: req.request_id,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(err) => ExecuteQueryResponse {
                request_id: req.request_id,
                success: false,
                result: None,
                error: Some(err.to_string()),
            },
        })
    }

    async fn discover_schema(&self, req: DiscoverSchemaRequest) -> AgentMessage {
        let outcome = match self.data_source(req.data_source_id) {
            Ok(ds) => self.schema.discover(ds, req.force_refresh).await,
            Err(err) => Err(err),
        };
        AgentMessage::SchemaResult(match outcome {
            Ok(schema) => DiscoverSchemaResponse {
                request_id: req.request_id,
                success: true,
                schema: Some(schema),
                error: None,
            },
            Err(err) => DiscoverSchemaResponse {
                request_id: req.request_id,
                success: false,
                schema: None,
                error: Some(err.to_string()),
            },
        })
    }

    async fn explore(&self, req: ExploreRequest) -> AgentMessage {
        let outcome = match self.data_source(req.data_source_id) {
            Ok(ds) => self.explore.explore(ds, &req.sql).await,
            Err(err) => Err(err),
        };
        AgentMessage::ExploreResult(match outcome {
            Ok(rows) => ExploreResponse {
                request_id: req.request_id,
                success: true,
                row_count: rows.len(),
                rows,
                error: None,
            },
            Err(err) => ExploreResponse {
                request_id: req.request_id,
                success: false,
                rows: Vec::new(),
                row_count: 0,
                error: Some(err.to_string()),
            },
        })
    }

    fn data_source(&self, id: DataSourceId) -> Result<&DataSource, GatewayError> {
        self.data_sources
            .get(&id)
            .ok_or_else(|| GatewayError::data_source_not_found(id))
    }
}
