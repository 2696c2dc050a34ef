//! Schema discovery against external databases
//!
//! Each dialect reads its own catalog: `information_schema` plus
//! `pg_constraint` on Postgres, `INFORMATION_SCHEMA` scoped to the current
//! database on MySQL, `INFORMATION_SCHEMA` plus `sys.indexes` on SQL Server.
//! Only base tables are reported; views are skipped. Column rows arrive
//! ordered by schema, table, ordinal position, so assembly groups them in a
//! single sequential pass.

use crate::connection::{ExternalConnection, SqlParam};
use crate::normalize::normalize_type;
use async_trait::async_trait;
use chrono::Utc;
use ferry_core::{
    DataSourceId, Dialect, DiscoveredColumn, DiscoveredSchema, DiscoveredTable, GatewayError,
    GatewayResult,
};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashSet;
use std::time::Duration;

const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Read the catalog and return the full discovered schema.
    async fn discover(
        &self,
        conn: &dyn ExternalConnection,
        data_source_id: DataSourceId,
    ) -> GatewayResult<DiscoveredSchema>;
}

/// The introspector for a dialect.
pub fn introspector_for(dialect: Dialect) -> &'static dyn SchemaIntrospector {
    match dialect {
        Dialect::Postgres => &PostgresIntrospector,
        Dialect::MySql => &MySqlIntrospector,
        Dialect::SqlServer => &SqlServerIntrospector,
    }
}

// ============================================================================
// POSTGRES
// ============================================================================

struct PostgresIntrospector;

const PG_COLUMNS_SQL: &str = "\
SELECT
    c.table_schema AS schema_name,
    c.table_name AS table_name,
    c.column_name AS column_name,
    c.data_type AS data_type,
    CASE WHEN c.is_nullable = 'YES' THEN true ELSE false END AS is_nullable
FROM information_schema.columns c
JOIN information_schema.tables t
    ON c.table_schema = t.table_schema AND c.table_name = t.table_name
WHERE t.table_type = 'BASE TABLE'
    AND c.table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY c.table_schema, c.table_name, c.ordinal_position";

const PG_PRIMARY_KEYS_SQL: &str = "\
SELECT
    n.nspname AS schema_name,
    t.relname AS table_name,
    a.attname AS column_name
FROM pg_constraint con
JOIN pg_class t ON con.conrelid = t.oid
JOIN pg_namespace n ON t.relnamespace = n.oid
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(con.conkey)
WHERE con.contype = 'p'
    AND n.nspname NOT IN ('pg_catalog', 'information_schema')";

#[async_trait]
impl SchemaIntrospector for PostgresIntrospector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn discover(
        &self,
        conn: &dyn ExternalConnection,
        data_source_id: DataSourceId,
    ) -> GatewayResult<DiscoveredSchema> {
        let columns = conn.query(PG_COLUMNS_SQL, &[], INTROSPECT_TIMEOUT).await?;
        let pks = conn
            .query(PG_PRIMARY_KEYS_SQL, &[], INTROSPECT_TIMEOUT)
            .await?;
        assemble(Dialect::Postgres, data_source_id, columns, pks)
    }
}

// ============================================================================
// MYSQL
// ============================================================================

struct MySqlIntrospector;

const MYSQL_COLUMNS_SQL: &str = "\
SELECT
    c.TABLE_SCHEMA AS schema_name,
    c.TABLE_NAME AS table_name,
    c.COLUMN_NAME AS column_name,
    c.DATA_TYPE AS data_type,
    CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS is_nullable
FROM INFORMATION_SCHEMA.COLUMNS c
JOIN INFORMATION_SCHEMA.TABLES t
    ON c.TABLE_SCHEMA = t.TABLE_SCHEMA AND c.TABLE_NAME = t.TABLE_NAME
WHERE t.TABLE_TYPE = 'BASE TABLE'
    AND c.TABLE_SCHEMA = ?
ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION";

const MYSQL_PRIMARY_KEYS_SQL: &str = "\
SELECT
    k.TABLE_SCHEMA AS schema_name,
    k.TABLE_NAME AS table_name,
    k.COLUMN_NAME AS column_name
FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
    AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA
    AND k.TABLE_NAME = tc.TABLE_NAME
WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
    AND k.TABLE_SCHEMA = ?";

#[async_trait]
impl SchemaIntrospector for MySqlIntrospector {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn discover(
        &self,
        conn: &dyn ExternalConnection,
        data_source_id: DataSourceId,
    ) -> GatewayResult<DiscoveredSchema> {
        // Scope the catalog read to the connection's current database.
        let rows = conn
            .query("SELECT DATABASE() AS db", &[], INTROSPECT_TIMEOUT)
            .await?;
        let database = rows
            .first()
            .and_then(|row| row.get("db"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| GatewayError::execution("MySQL connection has no current database"))?
            .to_string();

        let params = [SqlParam::Text(database)];
        let columns = conn
            .query(MYSQL_COLUMNS_SQL, &params, INTROSPECT_TIMEOUT)
            .await?;
        let pks = conn
            .query(MYSQL_PRIMARY_KEYS_SQL, &params, INTROSPECT_TIMEOUT)
            .await?;
        assemble(Dialect::MySql, data_source_id, columns, pks)
    }
}

// ============================================================================
// SQL SERVER
// ============================================================================

struct SqlServerIntrospector;

const MSSQL_COLUMNS_SQL: &str = "\
SELECT
    c.TABLE_SCHEMA AS schema_name,
    c.TABLE_NAME AS table_name,
    c.COLUMN_NAME AS column_name,
    c.DATA_TYPE AS data_type,
    CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS is_nullable
FROM INFORMATION_SCHEMA.COLUMNS c
JOIN INFORMATION_SCHEMA.TABLES t
    ON c.TABLE_SCHEMA = t.TABLE_SCHEMA AND c.TABLE_NAME = t.TABLE_NAME
WHERE t.TABLE_TYPE = 'BASE TABLE'
ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION";

const MSSQL_PRIMARY_KEYS_SQL: &str = "\
SELECT
    s.name AS schema_name,
    t.name AS table_name,
    c.name AS column_name
FROM sys.indexes i
JOIN sys.index_columns ic ON i.object_id = ic.object_id AND i.index_id = ic.index_id
JOIN sys.columns c ON ic.object_id = c.object_id AND ic.column_id = c.column_id
JOIN sys.tables t ON i.object_id = t.object_id
JOIN sys.schemas s ON t.schema_id = s.schema_id
WHERE i.is_primary_key = 1";

#[async_trait]
impl SchemaIntrospector for SqlServerIntrospector {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    async fn discover(
        &self,
        conn: &dyn ExternalConnection,
        data_source_id: DataSourceId,
    ) -> GatewayResult<DiscoveredSchema> {
        let columns = conn
            .query(MSSQL_COLUMNS_SQL, &[], INTROSPECT_TIMEOUT)
            .await?;
        let pks = conn
            .query(MSSQL_PRIMARY_KEYS_SQL, &[], INTROSPECT_TIMEOUT)
            .await?;
        assemble(Dialect::SqlServer, data_source_id, columns, pks)
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Group ordered column rows into tables, marking primary keys and
/// normalizing native types.
fn assemble(
    dialect: Dialect,
    data_source_id: DataSourceId,
    column_rows: Vec<JsonMap<String, JsonValue>>,
    pk_rows: Vec<JsonMap<String, JsonValue>>,
) -> GatewayResult<DiscoveredSchema> {
    let mut pk_set: HashSet<(String, String, String)> = HashSet::new();
    for row in &pk_rows {
        pk_set.insert((
            str_field(row, "schema_name")?.to_string(),
            str_field(row, "table_name")?.to_string(),
            str_field(row, "column_name")?.to_string(),
        ));
    }

    let mut tables: Vec<DiscoveredTable> = Vec::new();
    for row in &column_rows {
        let schema_name = str_field(row, "schema_name")?;
        let table_name = str_field(row, "table_name")?;
        let column_name = str_field(row, "column_name")?;
        let native_type = str_field(row, "data_type")?;

        let column = DiscoveredColumn {
            name: column_name.to_string(),
            native_type: native_type.to_string(),
            normalized_type: normalize_type(native_type, dialect),
            is_nullable: bool_field(row, "is_nullable")?,
            is_primary_key: pk_set.contains(&(
                schema_name.to_string(),
                table_name.to_string(),
                column_name.to_string(),
            )),
        };

        match tables.last_mut() {
            Some(table) if table.schema_name == schema_name && table.table_name == table_name => {
                table.columns.push(column);
            }
            _ => tables.push(DiscoveredTable {
                schema_name: schema_name.to_string(),
                table_name: table_name.to_string(),
                columns: vec![column],
            }),
        }
    }

    Ok(DiscoveredSchema {
        data_source_id,
        discovered_at: Utc::now(),
        tables,
    })
}

fn str_field<'a>(row: &'a JsonMap<String, JsonValue>, key: &str) -> GatewayResult<&'a str> {
    row.get(key).and_then(JsonValue::as_str).ok_or_else(|| {
        GatewayError::execution(format!("catalog row is missing text field '{key}'"))
    })
}

/// Nullability comes back as a boolean on Postgres and as 0/1 elsewhere.
fn bool_field(row: &JsonMap<String, JsonValue>, key: &str) -> GatewayResult<bool> {
    match row.get(key) {
        Some(JsonValue::Bool(b)) => Ok(*b),
        Some(JsonValue::Number(n)) => Ok(n.as_i64().unwrap_or(0) != 0),
        _ => Err(GatewayError::execution(format!(
            "catalog row is missing boolean field '{key}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::NormalizedType;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays one canned row set per query, in call order.
    struct ScriptedConnection {
        row_sets: Mutex<Vec<Vec<JsonMap<String, JsonValue>>>>,
    }

    impl ScriptedConnection {
        fn new(row_sets: Vec<Vec<JsonMap<String, JsonValue>>>) -> Self {
            let mut reversed = row_sets;
            reversed.reverse();
            Self {
                row_sets: Mutex::new(reversed),
            }
        }
    }

    #[async_trait]
    impl ExternalConnection for ScriptedConnection {
        async fn query(
            &self,
            _sql: &str,
            _params: &[SqlParam],
            _timeout: Duration,
        ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>> {
            Ok(self.row_sets.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn row(pairs: &[(&str, JsonValue)]) -> JsonMap<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn column_row(schema: &str, table: &str, column: &str, ty: &str, nullable: bool) -> JsonMap<String, JsonValue> {
        row(&[
            ("schema_name", json!(schema)),
            ("table_name", json!(table)),
            ("column_name", json!(column)),
            ("data_type", json!(ty)),
            ("is_nullable", json!(nullable)),
        ])
    }

    #[tokio::test]
    async fn groups_ordered_rows_into_tables_and_marks_primary_keys() {
        let conn = ScriptedConnection::new(vec![
            vec![
                column_row("public", "orders", "id", "uuid", false),
                column_row("public", "orders", "amount", "numeric", true),
                column_row("public", "vendors", "id", "uuid", false),
                column_row("public", "vendors", "name", "character varying", false),
            ],
            vec![
                row(&[
                    ("schema_name", json!("public")),
                    ("table_name", json!("orders")),
                    ("column_name", json!("id")),
                ]),
                row(&[
                    ("schema_name", json!("public")),
                    ("table_name", json!("vendors")),
                    ("column_name", json!("id")),
                ]),
            ],
        ]);

        let ds = Uuid::new_v4();
        let schema = introspector_for(Dialect::Postgres)
            .discover(&conn, ds)
            .await
            .unwrap();

        assert_eq!(schema.data_source_id, ds);
        assert_eq!(schema.tables.len(), 2);

        let orders = &schema.tables[0];
        assert_eq!(orders.table_name, "orders");
        assert_eq!(orders.columns.len(), 2);
        assert!(orders.columns[0].is_primary_key);
        assert!(!orders.columns[1].is_primary_key);
        assert_eq!(orders.columns[0].normalized_type, NormalizedType::Guid);
        assert_eq!(orders.columns[1].normalized_type, NormalizedType::Decimal);
        assert!(orders.columns[1].is_nullable);

        let vendors = &schema.tables[1];
        assert_eq!(vendors.columns[1].normalized_type, NormalizedType::String);
    }

    #[tokio::test]
    async fn numeric_nullability_flags_are_accepted() {
        // MySQL and SQL Server report 0/1 instead of booleans.
        let conn = ScriptedConnection::new(vec![
            // SELECT DATABASE()
            vec![row(&[("db", json!("shop"))])],
            vec![row(&[
                ("schema_name", json!("shop")),
                ("table_name", json!("bills")),
                ("column_name", json!("paid")),
                ("data_type", json!("tinyint(1)")),
                ("is_nullable", json!(1)),
            ])],
            vec![],
        ]);

        let schema = introspector_for(Dialect::MySql)
            .discover(&conn, Uuid::new_v4())
            .await
            .unwrap();

        let col = &schema.tables[0].columns[0];
        assert!(col.is_nullable);
        assert_eq!(col.normalized_type, NormalizedType::Boolean);
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_schema() {
        let conn = ScriptedConnection::new(vec![vec![], vec![]]);
        let schema = introspector_for(Dialect::SqlServer)
            .discover(&conn, Uuid::new_v4())
            .await
            .unwrap();
        assert!(schema.tables.is_empty());
    }
}
