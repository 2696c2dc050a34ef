//! Abstract query description and result types
//!
//! A `QueryDefinition` is database-agnostic; the engine's translator turns
//! it into dialect-correct parameterized SQL.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

// ============================================================================
// QUERY DEFINITION
// ============================================================================

/// Aggregate applied to a measure column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    CountDistinct,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Count => "count",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::CountDistinct => "count_distinct",
        };
        write!(f, "{name}")
    }
}

/// Calendar bucket a datetime dimension is truncated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateBucket {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Between,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Grouping column, optionally bucketed when it is a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_bucket: Option<DateBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Aggregated column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub column: String,
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// One WHERE predicate. `value2` is only meaningful for `Between`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<String>,
}

/// ORDER BY entry referencing either a source column or a select alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySort {
    pub column_or_alias: String,
    pub direction: SortDirection,
}

/// Database-agnostic description of one SELECT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default)]
    pub sorts: Vec<QuerySort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

impl QueryDefinition {
    /// A bare `SELECT *` over the table, used as a starting point in tests
    /// and by the explore path.
    pub fn for_table(table: impl Into<String>) -> Self {
        QueryDefinition {
            table: table.into(),
            schema_name: None,
            dimensions: Vec::new(),
            measures: Vec::new(),
            filters: Vec::new(),
            sorts: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Every source column the definition references (dimensions, measures,
    /// filters). Sort entries are excluded: they may name select aliases.
    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .map(|d| d.column.as_str())
            .chain(self.measures.iter().map(|m| m.column.as_str()))
            .chain(self.filters.iter().map(|f| f.column.as_str()))
    }
}

// ============================================================================
// QUERY RESULT
// ============================================================================

/// Result column with the display type inferred from the first row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryColumn {
    pub name: String,
    pub display_type: String,
}

/// Materialized query result. Row values keep the select-list order via the
/// column vector; each row maps column name to a JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    pub execution_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_columns_cover_dimensions_measures_filters() {
        let query = QueryDefinition {
            dimensions: vec![Dimension {
                column: "region".into(),
                date_bucket: None,
                alias: None,
            }],
            measures: vec![Measure {
                column: "amount".into(),
                function: AggregateFunction::Sum,
                alias: None,
            }],
            filters: vec![QueryFilter {
                column: "status".into(),
                operator: FilterOperator::Equals,
                value: Some("open".into()),
                value2: None,
            }],
            sorts: vec![QuerySort {
                column_or_alias: "total".into(),
                direction: SortDirection::Desc,
            }],
            ..QueryDefinition::for_table("orders")
        };

        let cols: Vec<_> = query.referenced_columns().collect();
        assert_eq!(cols, vec!["region", "amount", "status"]);
    }

    #[test]
    fn tunnel_payload_casing_is_camel_case() {
        let query = QueryDefinition {
            schema_name: Some("public".into()),
            limit: Some(10),
            ..QueryDefinition::for_table("orders")
        };
        let json = serde_json::to_value(&query).unwrap();
        assert!(json.get("schemaName").is_some());
        assert!(json.get("schema_name").is_none());
    }
}
