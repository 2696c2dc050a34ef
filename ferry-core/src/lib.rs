//! Ferry Core - Data Types and Tunnel Contracts
//!
//! Pure data structures shared by the control plane, the query engine, and
//! the on-premises agent. This crate contains ONLY data types plus small
//! constructors/helpers - no business logic.

pub mod error;
pub mod identity;
pub mod model;
pub mod query;
pub mod tunnel;

pub use error::{GatewayError, GatewayResult};
pub use identity::{
    new_request_id, sha256_hex, ConnectionId, DataSourceId, RequestId, TenantId, Timestamp,
};
pub use model::{
    AgentConnection, CrudOperation, DataSource, Dialect, DiscoveredColumn, DiscoveredSchema,
    DiscoveredTable, EntityKind, HostingMode, NormalizedType,
};
pub use query::{
    AggregateFunction, DateBucket, Dimension, FilterOperator, Measure, QueryColumn,
    QueryDefinition, QueryFilter, QueryResult, QuerySort, SortDirection,
};
pub use tunnel::{
    AgentMessage, CrudPagination, CrudRequest, CrudResponse, DiscoverSchemaRequest,
    DiscoverSchemaResponse, ExecuteQueryRequest, ExecuteQueryResponse, ExploreRequest,
    ExploreResponse, Heartbeat, ServerMessage, TunnelError,
};
