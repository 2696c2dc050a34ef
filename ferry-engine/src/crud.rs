//! Entity CRUD execution
//!
//! Tunneled CRUD requests name one of the closed set of ERP entity kinds.
//! Storage is behind the [`EntityHandler`] trait; the executor owns request
//! validation and the HTTP-shaped status codes, so every handler sees only
//! well-formed calls. The executor never returns `Err`: every failure is a
//! `CrudResponse` the gateway can relay verbatim.

use async_trait::async_trait;
use ferry_core::{
    CrudOperation, CrudPagination, CrudRequest, CrudResponse, EntityKind, GatewayResult,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Storage operations for one entity kind.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    async fn list(&self, pagination: Option<&CrudPagination>) -> GatewayResult<JsonValue>;
    async fn get(&self, id: Uuid) -> GatewayResult<Option<JsonValue>>;
    /// Returns the stored entity, id assigned if the payload had none.
    async fn create(&self, payload: JsonValue) -> GatewayResult<JsonValue>;
    /// Returns false when the entity does not exist.
    async fn update(&self, id: Uuid, payload: JsonValue) -> GatewayResult<bool>;
    async fn delete(&self, id: Uuid) -> GatewayResult<bool>;
}

#[derive(Default)]
pub struct EntityRegistry {
    handlers: HashMap<EntityKind, Arc<dyn EntityHandler>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: EntityKind, handler: Arc<dyn EntityHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: EntityKind) -> Option<&Arc<dyn EntityHandler>> {
        self.handlers.get(&kind)
    }
}

pub struct CrudExecutor {
    registry: EntityRegistry,
}

impl CrudExecutor {
    pub fn new(registry: EntityRegistry) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, request: &CrudRequest) -> CrudResponse {
        info!(
            operation = ?request.operation,
            entity_type = %request.entity_type,
            request_id = %request.request_id,
            "handling crud request"
        );

        let kind: EntityKind = match request.entity_type.parse() {
            Ok(kind) => kind,
            Err(_) => {
                return failure(
                    request,
                    400,
                    format!("Unknown entity type: {}", request.entity_type),
                )
            }
        };
        let handler = match self.registry.get(kind) {
            Some(handler) => handler,
            None => {
                return failure(
                    request,
                    400,
                    format!("No handler registered for entity type: {}", request.entity_type),
                )
            }
        };

        let outcome = match request.operation {
            CrudOperation::List => self.list(handler, request).await,
            CrudOperation::Get => self.get(handler, request).await,
            CrudOperation::Create => self.create(handler, request).await,
            CrudOperation::Update => self.update(handler, request).await,
            CrudOperation::Delete => self.delete(handler, request).await,
        };

        match outcome {
            Ok(response) => response,
            Err(err) => {
                error!(
                    operation = ?request.operation,
                    entity_type = %request.entity_type,
                    request_id = %request.request_id,
                    error = %err,
                    "crud request failed"
                );
                failure(request, 500, err.to_string())
            }
        }
    }

    async fn list(
        &self,
        handler: &Arc<dyn EntityHandler>,
        request: &CrudRequest,
    ) -> GatewayResult<CrudResponse> {
        let result = handler.list(request.pagination.as_ref()).await?;
        Ok(success(request, Some(result), 200))
    }

    async fn get(
        &self,
        handler: &Arc<dyn EntityHandler>,
        request: &CrudRequest,
    ) -> GatewayResult<CrudResponse> {
        let Some(id) = request.entity_id else {
            return Ok(failure(request, 400, "entityId required for get"));
        };
        Ok(match handler.get(id).await? {
            Some(entity) => success(request, Some(entity), 200),
            None => failure(request, 404, "Entity not found"),
        })
    }

    async fn create(
        &self,
        handler: &Arc<dyn EntityHandler>,
        request: &CrudRequest,
    ) -> GatewayResult<CrudResponse> {
        let Some(payload) = request.payload.clone() else {
            return Ok(failure(request, 400, "payload required for create"));
        };
        let stored = handler.create(payload).await?;
        Ok(success(request, Some(stored), 201))
    }

    async fn update(
        &self,
        handler: &Arc<dyn EntityHandler>,
        request: &CrudRequest,
    ) -> GatewayResult<CrudResponse> {
        let (Some(id), Some(payload)) = (request.entity_id, request.payload.clone()) else {
            return Ok(failure(
                request,
                400,
                "entityId and payload required for update",
            ));
        };
        Ok(if handler.update(id, payload).await? {
            success(request, None, 204)
        } else {
            failure(request, 404, "Entity not found")
        })
    }

    async fn delete(
        &self,
        handler: &Arc<dyn EntityHandler>,
        request: &CrudRequest,
    ) -> GatewayResult<CrudResponse> {
        let Some(id) = request.entity_id else {
            return Ok(failure(request, 400, "entityId required for delete"));
        };
        Ok(if handler.delete(id).await? {
            success(request, None, 204)
        } else {
            failure(request, 404, "Entity not found")
        })
    }
}

fn success(request: &CrudRequest, result: Option<JsonValue>, status_code: u16) -> CrudResponse {
    CrudResponse {
        request_id: request.request_id.clone(),
        success: true,
        result,
        status_code,
        error: None,
    }
}

fn failure(request: &CrudRequest, status_code: u16, error: impl Into<String>) -> CrudResponse {
    CrudResponse {
        request_id: request.request_id.clone(),
        success: false,
        result: None,
        status_code,
        error: Some(error.into()),
    }
}
