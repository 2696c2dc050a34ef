//! Raw table exploration
//!
//! Explore is a browse surface: the caller picks a discovered table and an
//! optional subset of its columns, and gets raw rows back. The SQL is built
//! server-side from the discovered schema only, so nothing user-typed ever
//! reaches the statement text; the row cap is clamped here and cannot be
//! raised by the caller.

use crate::connection::ConnectionFactory;
use crate::translate::quote;
use ferry_core::{DataSource, Dialect, DiscoveredTable, GatewayResult};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

pub const EXPLORE_MAX_ROWS: u32 = 1000;
pub const EXPLORE_DEFAULT_ROWS: u32 = 100;

const EXPLORE_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the explore SELECT for a discovered table.
///
/// `selected` names are matched case-insensitively against the table's
/// columns; unknown names are dropped, and an empty selection falls back to
/// every column. `first` is clamped to [`EXPLORE_MAX_ROWS`].
pub fn build_explore_sql(
    dialect: Dialect,
    table: &DiscoveredTable,
    selected: &[String],
    first: Option<u32>,
) -> String {
    let mut columns: Vec<&str> = selected
        .iter()
        .filter_map(|name| {
            table
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .map(|c| c.name.as_str())
        })
        .collect();
    if columns.is_empty() {
        columns = table.columns.iter().map(|c| c.name.as_str()).collect();
    }

    let select_list: Vec<String> = columns.iter().map(|c| quote(dialect, c)).collect();
    let first = first.unwrap_or(EXPLORE_DEFAULT_ROWS).min(EXPLORE_MAX_ROWS);

    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        select_list.join(", "),
        quote(dialect, &table.schema_name),
        quote(dialect, &table.table_name),
    );
    match dialect {
        Dialect::SqlServer => {
            sql.push_str(&format!(
                " ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT {first} ROWS ONLY"
            ));
        }
        Dialect::Postgres | Dialect::MySql => sql.push_str(&format!(" LIMIT {first}")),
    }
    sql
}

/// Runs pre-built explore SQL against a data source.
pub struct ExploreService {
    factory: Arc<dyn ConnectionFactory>,
}

impl ExploreService {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    pub async fn explore(
        &self,
        data_source: &DataSource,
        sql: &str,
    ) -> GatewayResult<Vec<JsonMap<String, JsonValue>>> {
        let conn = self.factory.connect(data_source).await?;
        conn.query(sql, &[], EXPLORE_TIMEOUT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{DiscoveredColumn, NormalizedType};

    fn table() -> DiscoveredTable {
        let column = |name: &str| DiscoveredColumn {
            name: name.to_string(),
            native_type: "text".into(),
            normalized_type: NormalizedType::String,
            is_nullable: true,
            is_primary_key: false,
        };
        DiscoveredTable {
            schema_name: "public".into(),
            table_name: "orders".into(),
            columns: vec![column("id"), column("region"), column("amount")],
        }
    }

    #[test]
    fn selects_requested_columns_in_schema_casing() {
        let sql = build_explore_sql(
            Dialect::Postgres,
            &table(),
            &["REGION".into(), "amount".into()],
            Some(5),
        );
        assert_eq!(
            sql,
            r#"SELECT "region", "amount" FROM "public"."orders" LIMIT 5"#
        );
    }

    #[test]
    fn unknown_selection_falls_back_to_all_columns() {
        let sql = build_explore_sql(Dialect::Postgres, &table(), &["nope".into()], None);
        assert!(sql.contains(r#""id", "region", "amount""#));
        assert!(sql.ends_with(&format!("LIMIT {EXPLORE_DEFAULT_ROWS}")));
    }

    #[test]
    fn row_cap_is_clamped() {
        let sql = build_explore_sql(Dialect::MySql, &table(), &[], Some(50_000));
        assert!(sql.ends_with(&format!("LIMIT {EXPLORE_MAX_ROWS}")));
    }

    #[test]
    fn sql_server_uses_offset_fetch() {
        let sql = build_explore_sql(Dialect::SqlServer, &table(), &[], Some(10));
        assert!(sql.contains("FROM [public].[orders]"));
        assert!(sql.ends_with("ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"));
    }
}
