//! Abstract query -> dialect SQL translation
//!
//! One translate function driven by per-dialect lookup tables: identifier
//! quoting style, date-bucket expression, parameter placeholder, and
//! limit/offset clause. Identifiers cannot be parameterized, so every column
//! reference is checked against the discovered schema's columns before it is
//! quoted into SQL text; that check is the sole injection defense for
//! identifiers. Filter values are always bound parameters, typed by the
//! filter column's declared type.

use crate::connection::SqlParam;
use ferry_core::{
    AggregateFunction, DateBucket, Dialect, FilterOperator, GatewayError, GatewayResult,
    NormalizedType, QueryDefinition, SortDirection,
};
use std::collections::{HashMap, HashSet};

/// Final SQL text plus bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Translate a query definition into dialect-correct parameterized SQL.
///
/// `columns` maps the target table's column names, lowercased, to their
/// normalized types.
pub fn translate(
    query: &QueryDefinition,
    dialect: Dialect,
    columns: &HashMap<String, NormalizedType>,
) -> GatewayResult<TranslatedQuery> {
    let mut params: Vec<SqlParam> = Vec::new();
    let mut sql = String::from("SELECT ");

    // SELECT list: dimensions, then measures; `*` when neither is present.
    let mut select_parts: Vec<String> = Vec::new();
    let mut aliases: HashSet<String> = HashSet::new();

    for dim in &query.dimensions {
        column_type(&dim.column, columns)?;
        let expr = match dim.date_bucket {
            Some(bucket) => date_bucket_expr(dialect, bucket, &quote(dialect, &dim.column)),
            None => quote(dialect, &dim.column),
        };
        let alias = dim.alias.clone().unwrap_or_else(|| dim.column.clone());
        aliases.insert(alias.to_ascii_lowercase());
        select_parts.push(format!("{expr} AS {}", quote(dialect, &alias)));
    }

    for measure in &query.measures {
        column_type(&measure.column, columns)?;
        let agg = aggregate_expr(measure.function, &quote(dialect, &measure.column));
        let alias = measure
            .alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", measure.function, measure.column));
        aliases.insert(alias.to_ascii_lowercase());
        select_parts.push(format!("{agg} AS {}", quote(dialect, &alias)));
    }

    if select_parts.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&select_parts.join(", "));
    }

    // FROM
    sql.push_str(" FROM ");
    match &query.schema_name {
        Some(schema) => {
            sql.push_str(&quote(dialect, schema));
            sql.push('.');
            sql.push_str(&quote(dialect, &query.table));
        }
        None => sql.push_str(&quote(dialect, &query.table)),
    }

    // WHERE: filters ANDed, values bound.
    if !query.filters.is_empty() {
        sql.push_str(" WHERE ");
        let mut filter_parts = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            let ty = column_type(&filter.column, columns)?;
            filter_parts.push(filter_expr(dialect, filter, ty, &mut params)?);
        }
        sql.push_str(&filter_parts.join(" AND "));
    }

    // GROUP BY: only when aggregating over dimensions.
    if !query.dimensions.is_empty() && !query.measures.is_empty() {
        sql.push_str(" GROUP BY ");
        let group_parts: Vec<String> = query
            .dimensions
            .iter()
            .map(|dim| match dim.date_bucket {
                Some(bucket) => date_bucket_expr(dialect, bucket, &quote(dialect, &dim.column)),
                None => quote(dialect, &dim.column),
            })
            .collect();
        sql.push_str(&group_parts.join(", "));
    }

    // ORDER BY: entries may reference source columns or select aliases.
    if !query.sorts.is_empty() {
        sql.push_str(" ORDER BY ");
        let mut sort_parts = Vec::with_capacity(query.sorts.len());
        for sort in &query.sorts {
            let lower = sort.column_or_alias.to_ascii_lowercase();
            if !columns.contains_key(&lower) && !aliases.contains(&lower) {
                return Err(GatewayError::validation(format!(
                    "Sort column '{}' is neither a table column nor a select alias",
                    sort.column_or_alias
                )));
            }
            let dir = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            sort_parts.push(format!("{} {dir}", quote(dialect, &sort.column_or_alias)));
        }
        sql.push_str(&sort_parts.join(", "));
    }

    // LIMIT/OFFSET in the dialect's native form.
    sql.push_str(&limit_offset_clause(
        dialect,
        query.limit,
        query.offset,
        query.sorts.is_empty(),
    ));

    Ok(TranslatedQuery { sql, params })
}

fn column_type(
    column: &str,
    columns: &HashMap<String, NormalizedType>,
) -> GatewayResult<NormalizedType> {
    columns
        .get(&column.to_ascii_lowercase())
        .copied()
        .ok_or_else(|| {
            GatewayError::validation(format!(
                "Column '{column}' is not present in the data source schema"
            ))
        })
}

/// Bind a filter literal with the column's declared type. Guessing the type
/// from the literal's shape would mis-type text columns holding
/// numeric-looking values and fail at the driver.
fn typed_param(column: &str, ty: NormalizedType, value: &str) -> GatewayResult<SqlParam> {
    let invalid = |expected: &str| {
        GatewayError::validation(format!(
            "Filter value '{value}' on '{column}' is not a valid {expected}"
        ))
    };
    match ty {
        NormalizedType::Integer => value
            .parse()
            .map(SqlParam::Int)
            .map_err(|_| invalid("integer")),
        NormalizedType::Decimal => value
            .parse()
            .map(SqlParam::Float)
            .map_err(|_| invalid("number")),
        NormalizedType::Boolean => match value {
            "true" | "TRUE" | "True" | "1" => Ok(SqlParam::Bool(true)),
            "false" | "FALSE" | "False" | "0" => Ok(SqlParam::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        NormalizedType::String
        | NormalizedType::DateTime
        | NormalizedType::Guid
        | NormalizedType::Other => Ok(SqlParam::Text(value.to_string())),
    }
}

/// Identifier quoting per dialect. Embedded quote characters are doubled so
/// a hostile identifier cannot close the quote.
pub(crate) fn quote(dialect: Dialect, identifier: &str) -> String {
    match dialect {
        Dialect::Postgres => format!("\"{}\"", identifier.replace('"', "\"\"")),
        Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
        Dialect::SqlServer => format!("[{}]", identifier.replace(']', "]]")),
    }
}

fn aggregate_expr(function: AggregateFunction, quoted_column: &str) -> String {
    match function {
        AggregateFunction::Sum => format!("SUM({quoted_column})"),
        AggregateFunction::Count => format!("COUNT({quoted_column})"),
        AggregateFunction::Avg => format!("AVG({quoted_column})"),
        AggregateFunction::Min => format!("MIN({quoted_column})"),
        AggregateFunction::Max => format!("MAX({quoted_column})"),
        AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {quoted_column})"),
    }
}

/// Date truncation per dialect: Postgres has DATE_TRUNC; MySQL composes
/// formatting and interval arithmetic; SQL Server composes DATEFROMPARTS.
fn date_bucket_expr(dialect: Dialect, bucket: DateBucket, col: &str) -> String {
    match dialect {
        Dialect::Postgres => {
            let unit = match bucket {
                DateBucket::Day => "day",
                DateBucket::Week => "week",
                DateBucket::Month => "month",
                DateBucket::Quarter => "quarter",
                DateBucket::Year => "year",
            };
            format!("DATE_TRUNC('{unit}', {col})")
        }
        Dialect::MySql => match bucket {
            DateBucket::Day => format!("DATE({col})"),
            DateBucket::Week => {
                format!("DATE(DATE_SUB({col}, INTERVAL WEEKDAY({col}) DAY))")
            }
            DateBucket::Month => format!("DATE_FORMAT({col}, '%Y-%m-01')"),
            DateBucket::Quarter => format!(
                "MAKEDATE(YEAR({col}), 1) + INTERVAL QUARTER({col}) QUARTER - INTERVAL 1 QUARTER"
            ),
            DateBucket::Year => format!("DATE_FORMAT({col}, '%Y-01-01')"),
        },
        Dialect::SqlServer => match bucket {
            DateBucket::Day => format!("CAST(CAST({col} AS DATE) AS DATETIME)"),
            DateBucket::Week => format!("DATEADD(WEEK, DATEDIFF(WEEK, 0, {col}), 0)"),
            DateBucket::Month => format!("DATEFROMPARTS(YEAR({col}), MONTH({col}), 1)"),
            DateBucket::Quarter => format!(
                "DATEFROMPARTS(YEAR({col}), (DATEPART(QUARTER, {col}) - 1) * 3 + 1, 1)"
            ),
            DateBucket::Year => format!("DATEFROMPARTS(YEAR({col}), 1, 1)"),
        },
    }
}

fn placeholder(dialect: Dialect, index: usize) -> String {
    match dialect {
        Dialect::Postgres => format!("${}", index + 1),
        Dialect::MySql => "?".to_string(),
        Dialect::SqlServer => format!("@p{}", index + 1),
    }
}

fn bind(dialect: Dialect, params: &mut Vec<SqlParam>, value: SqlParam) -> String {
    let ph = placeholder(dialect, params.len());
    params.push(value);
    ph
}

fn filter_expr(
    dialect: Dialect,
    filter: &ferry_core::QueryFilter,
    ty: NormalizedType,
    params: &mut Vec<SqlParam>,
) -> GatewayResult<String> {
    let col = quote(dialect, &filter.column);

    let value = || -> GatewayResult<&str> {
        filter.value.as_deref().ok_or_else(|| {
            GatewayError::validation(format!(
                "Filter on '{}' requires a value for operator {:?}",
                filter.column, filter.operator
            ))
        })
    };

    let expr = match filter.operator {
        FilterOperator::IsNull => format!("{col} IS NULL"),
        FilterOperator::IsNotNull => format!("{col} IS NOT NULL"),
        FilterOperator::Equals => {
            let ph = bind(dialect, params, typed_param(&filter.column, ty, value()?)?);
            format!("{col} = {ph}")
        }
        FilterOperator::NotEquals => {
            let ph = bind(dialect, params, typed_param(&filter.column, ty, value()?)?);
            format!("{col} <> {ph}")
        }
        FilterOperator::GreaterThan => {
            let ph = bind(dialect, params, typed_param(&filter.column, ty, value()?)?);
            format!("{col} > {ph}")
        }
        FilterOperator::GreaterThanOrEqual => {
            let ph = bind(dialect, params, typed_param(&filter.column, ty, value()?)?);
            format!("{col} >= {ph}")
        }
        FilterOperator::LessThan => {
            let ph = bind(dialect, params, typed_param(&filter.column, ty, value()?)?);
            format!("{col} < {ph}")
        }
        FilterOperator::LessThanOrEqual => {
            let ph = bind(dialect, params, typed_param(&filter.column, ty, value()?)?);
            format!("{col} <= {ph}")
        }
        FilterOperator::Contains => {
            let ph = bind(dialect, params, SqlParam::Text(format!("%{}%", value()?)));
            format!("{col} LIKE {ph}")
        }
        FilterOperator::StartsWith => {
            let ph = bind(dialect, params, SqlParam::Text(format!("{}%", value()?)));
            format!("{col} LIKE {ph}")
        }
        FilterOperator::EndsWith => {
            let ph = bind(dialect, params, SqlParam::Text(format!("%{}", value()?)));
            format!("{col} LIKE {ph}")
        }
        FilterOperator::In => {
            // Comma-split list, one bound parameter per element.
            let raw = value()?;
            let values: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                return Err(GatewayError::validation(format!(
                    "In filter on '{}' has an empty value list",
                    filter.column
                )));
            }
            let mut placeholders = Vec::with_capacity(values.len());
            for v in values {
                let param = typed_param(&filter.column, ty, v)?;
                placeholders.push(bind(dialect, params, param));
            }
            format!("{col} IN ({})", placeholders.join(", "))
        }
        FilterOperator::Between => {
            let low = value()?.to_string();
            let high = filter.value2.as_deref().ok_or_else(|| {
                GatewayError::validation(format!(
                    "Between filter on '{}' requires value2",
                    filter.column
                ))
            })?;
            let ph1 = bind(dialect, params, typed_param(&filter.column, ty, &low)?);
            let ph2 = bind(dialect, params, typed_param(&filter.column, ty, high)?);
            format!("{col} BETWEEN {ph1} AND {ph2}")
        }
    };
    Ok(expr)
}

fn limit_offset_clause(
    dialect: Dialect,
    limit: Option<u32>,
    offset: Option<u32>,
    no_order_by: bool,
) -> String {
    if limit.is_none() && offset.is_none() {
        return String::new();
    }

    match dialect {
        Dialect::Postgres | Dialect::MySql => {
            let mut clause = String::new();
            if let Some(n) = limit {
                clause.push_str(&format!(" LIMIT {n}"));
            }
            if let Some(n) = offset {
                clause.push_str(&format!(" OFFSET {n}"));
            }
            clause
        }
        Dialect::SqlServer => {
            // OFFSET/FETCH requires an ORDER BY; supply a constant ordering
            // when the query has none.
            let mut clause = String::new();
            if no_order_by {
                clause.push_str(" ORDER BY (SELECT NULL)");
            }
            clause.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
            if let Some(n) = limit {
                clause.push_str(&format!(" FETCH NEXT {n} ROWS ONLY"));
            }
            clause
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{Dimension, Measure, QueryFilter, QuerySort};

    fn columns(names: &[&str]) -> HashMap<String, NormalizedType> {
        names
            .iter()
            .map(|n| (n.to_string(), NormalizedType::String))
            .collect()
    }

    fn typed_columns(entries: &[(&str, NormalizedType)]) -> HashMap<String, NormalizedType> {
        entries.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    fn dim(column: &str) -> Dimension {
        Dimension {
            column: column.into(),
            date_bucket: None,
            alias: None,
        }
    }

    fn sum(column: &str) -> Measure {
        Measure {
            column: column.into(),
            function: AggregateFunction::Sum,
            alias: None,
        }
    }

    #[test]
    fn bare_query_selects_star() {
        let query = QueryDefinition::for_table("orders");
        let t = translate(&query, Dialect::Postgres, &columns(&["id"])).unwrap();
        assert_eq!(t.sql, r#"SELECT * FROM "orders""#);
        assert!(t.params.is_empty());
    }

    #[test]
    fn month_bucket_appears_in_select_and_group_by_on_postgres() {
        // Dimension region, measure sum(amount), dimension order_date by month.
        let query = QueryDefinition {
            dimensions: vec![
                dim("region"),
                Dimension {
                    column: "order_date".into(),
                    date_bucket: Some(DateBucket::Month),
                    alias: Some("month".into()),
                },
            ],
            measures: vec![sum("amount")],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(
            &query,
            Dialect::Postgres,
            &columns(&["region", "order_date", "amount"]),
        )
        .unwrap();

        let group_by = t.sql.split(" GROUP BY ").nth(1).unwrap();
        assert!(group_by.contains(r#""region""#));
        assert!(group_by.contains(r#"DATE_TRUNC('month', "order_date")"#));
        assert!(t.sql.contains(r#"SUM("amount") AS "sum_amount""#));
    }

    #[test]
    fn unknown_column_is_a_validation_error_before_any_sql() {
        let query = QueryDefinition {
            dimensions: vec![dim("regoin")],
            ..QueryDefinition::for_table("orders")
        };
        let err = translate(&query, Dialect::Postgres, &columns(&["region"])).unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
        assert!(err.to_string().contains("regoin"));
    }

    #[test]
    fn filters_become_bound_parameters() {
        let query = QueryDefinition {
            filters: vec![
                QueryFilter {
                    column: "status".into(),
                    operator: FilterOperator::Equals,
                    value: Some("open".into()),
                    value2: None,
                },
                QueryFilter {
                    column: "amount".into(),
                    operator: FilterOperator::Between,
                    value: Some("10".into()),
                    value2: Some("100".into()),
                },
            ],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(
            &query,
            Dialect::Postgres,
            &typed_columns(&[
                ("status", NormalizedType::String),
                ("amount", NormalizedType::Integer),
            ]),
        )
        .unwrap();

        assert!(t
            .sql
            .contains(r#"WHERE "status" = $1 AND "amount" BETWEEN $2 AND $3"#));
        assert_eq!(
            t.params,
            vec![
                SqlParam::Text("open".into()),
                SqlParam::Int(10),
                SqlParam::Int(100)
            ]
        );
        // The raw value never appears in the SQL text.
        assert!(!t.sql.contains("open"));
    }

    #[test]
    fn in_filter_expands_to_one_placeholder_per_value() {
        let query = QueryDefinition {
            filters: vec![QueryFilter {
                column: "region".into(),
                operator: FilterOperator::In,
                value: Some("east, west,north".into()),
                value2: None,
            }],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&query, Dialect::Postgres, &columns(&["region"])).unwrap();
        assert!(t.sql.contains(r#""region" IN ($1, $2, $3)"#));
        assert_eq!(t.params.len(), 3);
        assert_eq!(t.params[1], SqlParam::Text("west".into()));
    }

    #[test]
    fn like_operators_build_patterns() {
        for (op, expected) in [
            (FilterOperator::Contains, "%ac%"),
            (FilterOperator::StartsWith, "ac%"),
            (FilterOperator::EndsWith, "%ac"),
        ] {
            let query = QueryDefinition {
                filters: vec![QueryFilter {
                    column: "name".into(),
                    operator: op,
                    value: Some("ac".into()),
                    value2: None,
                }],
                ..QueryDefinition::for_table("vendors")
            };
            let t = translate(&query, Dialect::MySql, &columns(&["name"])).unwrap();
            assert!(t.sql.contains("`name` LIKE ?"));
            assert_eq!(t.params, vec![SqlParam::Text(expected.into())]);
        }
    }

    #[test]
    fn group_by_needs_both_dimensions_and_measures() {
        let dims_only = QueryDefinition {
            dimensions: vec![dim("region")],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&dims_only, Dialect::Postgres, &columns(&["region"])).unwrap();
        assert!(!t.sql.contains("GROUP BY"));

        let measures_only = QueryDefinition {
            measures: vec![sum("amount")],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&measures_only, Dialect::Postgres, &columns(&["amount"])).unwrap();
        assert!(!t.sql.contains("GROUP BY"));
    }

    #[test]
    fn sort_may_reference_alias_but_not_arbitrary_text() {
        let query = QueryDefinition {
            dimensions: vec![dim("region")],
            measures: vec![Measure {
                column: "amount".into(),
                function: AggregateFunction::Sum,
                alias: Some("total".into()),
            }],
            sorts: vec![QuerySort {
                column_or_alias: "total".into(),
                direction: SortDirection::Desc,
            }],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&query, Dialect::Postgres, &columns(&["region", "amount"])).unwrap();
        assert!(t.sql.ends_with(r#"ORDER BY "total" DESC"#));

        let hostile = QueryDefinition {
            sorts: vec![QuerySort {
                column_or_alias: "1; DROP TABLE orders".into(),
                direction: SortDirection::Asc,
            }],
            ..QueryDefinition::for_table("orders")
        };
        assert!(translate(&hostile, Dialect::Postgres, &columns(&["region"])).is_err());
    }

    #[test]
    fn sql_server_offset_fetch_gets_constant_ordering() {
        let query = QueryDefinition {
            limit: Some(50),
            offset: Some(100),
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&query, Dialect::SqlServer, &columns(&["id"])).unwrap();
        assert!(t
            .sql
            .ends_with("ORDER BY (SELECT NULL) OFFSET 100 ROWS FETCH NEXT 50 ROWS ONLY"));
    }

    #[test]
    fn sql_server_offset_fetch_reuses_existing_order_by() {
        let query = QueryDefinition {
            sorts: vec![QuerySort {
                column_or_alias: "id".into(),
                direction: SortDirection::Asc,
            }],
            limit: Some(10),
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&query, Dialect::SqlServer, &columns(&["id"])).unwrap();
        assert!(t
            .sql
            .ends_with("ORDER BY [id] ASC OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"));
        assert!(!t.sql.contains("(SELECT NULL)"));
    }

    #[test]
    fn filter_binding_follows_column_type_not_literal_shape() {
        // An invoice number that happens to look numeric must stay a text
        // bind, or the driver rejects the comparison against a varchar.
        let cols = typed_columns(&[
            ("invoice_no", NormalizedType::String),
            ("quantity", NormalizedType::Integer),
            ("price", NormalizedType::Decimal),
            ("paid", NormalizedType::Boolean),
        ]);
        let eq = |column: &str, value: &str| QueryFilter {
            column: column.into(),
            operator: FilterOperator::Equals,
            value: Some(value.into()),
            value2: None,
        };
        let query = QueryDefinition {
            filters: vec![
                eq("invoice_no", "12345"),
                eq("quantity", "7"),
                eq("price", "19.99"),
                eq("paid", "true"),
            ],
            ..QueryDefinition::for_table("invoices")
        };

        let t = translate(&query, Dialect::Postgres, &cols).unwrap();
        assert_eq!(
            t.params,
            vec![
                SqlParam::Text("12345".into()),
                SqlParam::Int(7),
                SqlParam::Float(19.99),
                SqlParam::Bool(true),
            ]
        );
    }

    #[test]
    fn non_numeric_literal_on_numeric_column_fails_validation() {
        let query = QueryDefinition {
            filters: vec![QueryFilter {
                column: "quantity".into(),
                operator: FilterOperator::Equals,
                value: Some("lots".into()),
                value2: None,
            }],
            ..QueryDefinition::for_table("orders")
        };
        let err = translate(
            &query,
            Dialect::Postgres,
            &typed_columns(&[("quantity", NormalizedType::Integer)]),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn quoting_style_follows_dialect() {
        let query = QueryDefinition {
            dimensions: vec![dim("region")],
            schema_name: Some("sales".into()),
            ..QueryDefinition::for_table("orders")
        };
        let valid = columns(&["region"]);

        let pg = translate(&query, Dialect::Postgres, &valid).unwrap();
        assert!(pg.sql.contains(r#"FROM "sales"."orders""#));

        let my = translate(&query, Dialect::MySql, &valid).unwrap();
        assert!(my.sql.contains("FROM `sales`.`orders`"));

        let ms = translate(&query, Dialect::SqlServer, &valid).unwrap();
        assert!(ms.sql.contains("FROM [sales].[orders]"));
    }

    #[test]
    fn embedded_quote_characters_are_doubled() {
        let query = QueryDefinition {
            dimensions: vec![dim(r#"na"me"#)],
            ..QueryDefinition::for_table("orders")
        };
        let t = translate(&query, Dialect::Postgres, &columns(&[r#"na"me"#])).unwrap();
        assert!(t.sql.contains(r#""na""me""#));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn identifier() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_]{0,12}"
        }

        proptest! {
            // Any query whose referenced columns are all in the valid set
            // translates, and the SQL quotes each referenced column.
            #[test]
            fn valid_columns_always_translate(
                cols in proptest::collection::hash_set(identifier(), 1..6),
                value in "[a-z0-9 ]{0,12}",
            ) {
                let names: Vec<String> = cols.iter().cloned().collect();
                let cols: HashMap<String, NormalizedType> = cols
                    .into_iter()
                    .map(|c| (c, NormalizedType::String))
                    .collect();
                let query = QueryDefinition {
                    dimensions: vec![Dimension {
                        column: names[0].clone(),
                        date_bucket: None,
                        alias: None,
                    }],
                    filters: vec![QueryFilter {
                        column: names[names.len() - 1].clone(),
                        operator: FilterOperator::Equals,
                        value: Some(value),
                        value2: None,
                    }],
                    ..QueryDefinition::for_table("t")
                };

                for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::SqlServer] {
                    let t = translate(&query, dialect, &cols).unwrap();
                    prop_assert!(t.sql.contains(&quote(dialect, &names[0])));
                    prop_assert!(t.sql.contains(&quote(dialect, &names[names.len() - 1])));
                }
            }

            // A column outside the valid set always fails validation, for
            // every dialect, before any SQL is produced.
            #[test]
            fn unknown_columns_always_fail(col in identifier()) {
                let valid = columns(&["known"]);
                prop_assume!(!valid.contains_key(&col));
                let query = QueryDefinition {
                    dimensions: vec![Dimension { column: col, date_bucket: None, alias: None }],
                    ..QueryDefinition::for_table("t")
                };
                for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::SqlServer] {
                    prop_assert!(
                        matches!(
                            translate(&query, dialect, &valid),
                            Err(GatewayError::Validation { .. })
                        ),
                        "expected validation error"
                    );
                }
            }
        }
    }
}
