//! Data source, schema, and tenancy model types

use crate::identity::{ConnectionId, DataSourceId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// TENANCY
// ============================================================================

/// How a tenant's database is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostingMode {
    /// SaaS-managed: the database is directly reachable from the control
    /// plane and every operation executes locally.
    Managed,
    /// Self-hosted: the database sits behind the tenant's firewall and every
    /// operation is tunneled to the on-premises agent.
    SelfHosted,
}

// ============================================================================
// DATA SOURCES
// ============================================================================

/// One supported external database engine's SQL variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dialect {
    Postgres,
    MySql,
    SqlServer,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
            Dialect::SqlServer => write!(f, "sqlserver"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// A registered external database belonging to one tenant.
///
/// `connection_descriptor` is opaque to everything but the connection
/// factory: it holds the encrypted connection string and is decrypted just
/// before a connection is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: DataSourceId,
    pub tenant_id: TenantId,
    pub dialect: Dialect,
    pub connection_descriptor: String,
    pub last_schema_refresh: Option<Timestamp>,
}

// ============================================================================
// DISCOVERED SCHEMA
// ============================================================================

/// Normalized column type bucket.
///
/// Client-facing schema and UI type hints depend on this bucket, never on
/// the raw native type string. Unmapped natives land in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NormalizedType {
    String,
    Integer,
    Decimal,
    DateTime,
    Boolean,
    Guid,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredColumn {
    pub name: String,
    /// The engine's own spelling, e.g. `character varying` or `nvarchar`.
    pub native_type: String,
    pub normalized_type: NormalizedType,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

/// One base table, columns in native ordinal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTable {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<DiscoveredColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredSchema {
    pub data_source_id: DataSourceId,
    pub discovered_at: Timestamp,
    pub tables: Vec<DiscoveredTable>,
}

impl DiscoveredSchema {
    /// Find a table by name, optionally constrained to a schema. Both
    /// comparisons are case-insensitive, matching how the engines report
    /// identifiers.
    pub fn find_table(&self, schema_name: Option<&str>, table: &str) -> Option<&DiscoveredTable> {
        self.tables.iter().find(|t| {
            t.table_name.eq_ignore_ascii_case(table)
                && schema_name.is_none_or(|s| t.schema_name.eq_ignore_ascii_case(s))
        })
    }
}

// ============================================================================
// AGENT CONNECTIONS
// ============================================================================

/// Registry entry for one live agent connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConnection {
    pub tenant_id: TenantId,
    pub connection_id: ConnectionId,
    pub agent_version: Option<String>,
    pub connected_at: Timestamp,
    pub last_heartbeat_at: Timestamp,
    pub data_source_ids: Vec<DataSourceId>,
}

// ============================================================================
// CRUD ENTITIES
// ============================================================================

/// Closed set of business record types the CRUD tunnel can address.
///
/// Resolved once at startup into a handler registry; the wire format still
/// carries the string name for compatibility with older agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Vendor,
    Bill,
    Customer,
    Invoice,
    Product,
    Warehouse,
    SalesOrder,
    Carrier,
    Shipment,
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vendor" => Ok(EntityKind::Vendor),
            "bill" => Ok(EntityKind::Bill),
            "customer" => Ok(EntityKind::Customer),
            "invoice" => Ok(EntityKind::Invoice),
            "product" => Ok(EntityKind::Product),
            "warehouse" => Ok(EntityKind::Warehouse),
            "salesorder" => Ok(EntityKind::SalesOrder),
            "carrier" => Ok(EntityKind::Carrier),
            "shipment" => Ok(EntityKind::Shipment),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vendor => "Vendor",
            EntityKind::Bill => "Bill",
            EntityKind::Customer => "Customer",
            EntityKind::Invoice => "Invoice",
            EntityKind::Product => "Product",
            EntityKind::Warehouse => "Warehouse",
            EntityKind::SalesOrder => "SalesOrder",
            EntityKind::Carrier => "Carrier",
            EntityKind::Shipment => "Shipment",
        };
        write!(f, "{name}")
    }
}

/// CRUD operation carried on the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CrudOperation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn column(name: &str) -> DiscoveredColumn {
        DiscoveredColumn {
            name: name.to_string(),
            native_type: "text".to_string(),
            normalized_type: NormalizedType::String,
            is_nullable: true,
            is_primary_key: false,
        }
    }

    #[test]
    fn find_table_is_case_insensitive() {
        let schema = DiscoveredSchema {
            data_source_id: Uuid::new_v4(),
            discovered_at: Utc::now(),
            tables: vec![DiscoveredTable {
                schema_name: "public".to_string(),
                table_name: "Orders".to_string(),
                columns: vec![column("id")],
            }],
        };

        assert!(schema.find_table(None, "orders").is_some());
        assert!(schema.find_table(Some("PUBLIC"), "ORDERS").is_some());
        assert!(schema.find_table(Some("sales"), "orders").is_none());
        assert!(schema.find_table(None, "invoices").is_none());
    }

    #[test]
    fn entity_kind_round_trips_through_wire_name() {
        for kind in [
            EntityKind::Vendor,
            EntityKind::SalesOrder,
            EntityKind::Shipment,
        ] {
            assert_eq!(kind.to_string().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("Ledger".parse::<EntityKind>().is_err());
    }

    #[test]
    fn dialect_parses_common_aliases() {
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mssql".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
