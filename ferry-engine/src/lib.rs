//! Ferry Engine - Dialect-Aware Query Engine
//!
//! Compiles abstract query definitions into dialect-correct parameterized
//! SQL, discovers and normalizes external schemas, and executes queries with
//! caching, limits, and resilience. Runs identically on the control plane
//! (managed tenants) and inside the on-premises agent (self-hosted tenants).

pub mod cache;
pub mod connection;
pub mod crud;
pub mod execute;
pub mod explore;
pub mod introspect;
pub mod normalize;
pub mod progress;
pub mod resilience;
pub mod schema;
pub mod translate;

pub use cache::{CacheStore, InMemoryCacheStore};
pub use connection::{
    ConnectionFactory, EncryptionService, ExternalConnection, PlaintextEncryption,
    PostgresConnectionFactory, ResilientConnectionFactory, SqlParam,
};
pub use crud::{CrudExecutor, EntityHandler, EntityRegistry};
pub use execute::{EngineConfig, QueryExecutionEngine};
pub use explore::{build_explore_sql, ExploreService, EXPLORE_DEFAULT_ROWS, EXPLORE_MAX_ROWS};
pub use introspect::{introspector_for, SchemaIntrospector};
pub use normalize::normalize_type;
pub use progress::{NoopProgressNotifier, ProgressNotifier, QueryStage};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig};
pub use schema::{SchemaRefreshSink, SchemaService};
pub use translate::{translate, TranslatedQuery};
