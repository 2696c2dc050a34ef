//! Native type normalization
//!
//! Maps each engine's native type spelling into the shared
//! [`NormalizedType`] buckets. Length/precision suffixes are stripped first
//! (`varchar(255)` -> `varchar`, `numeric(10,2)` -> `numeric`). Natives that
//! match no bucket fall into `Other` rather than failing: downstream
//! consumers only ever see the bucket, never the raw string.

use ferry_core::{Dialect, NormalizedType};

/// Normalize a native type string for the given dialect.
///
/// The bucket tables are shared across dialects; the dialect argument exists
/// for the few spellings that are ambiguous between engines (MySQL's
/// `tinyint(1)` boolean convention is handled before stripping).
pub fn normalize_type(native: &str, dialect: Dialect) -> NormalizedType {
    let lower = native.trim().to_ascii_lowercase();

    // MySQL encodes booleans as tinyint(1); decide before the suffix strip.
    if dialect == Dialect::MySql && lower == "tinyint(1)" {
        return NormalizedType::Boolean;
    }

    let base = match lower.find('(') {
        Some(idx) if idx > 0 => &lower[..idx],
        _ => lower.as_str(),
    };

    match base.trim_end() {
        "text" | "varchar" | "character varying" | "char" | "character" | "nvarchar"
        | "nchar" | "ntext" | "longtext" | "mediumtext" | "tinytext" | "citext" | "name" => {
            NormalizedType::String
        }

        "integer" | "int" | "int4" | "int8" | "int2" | "smallint" | "bigint" | "tinyint"
        | "serial" | "bigserial" | "mediumint" => NormalizedType::Integer,

        "numeric" | "decimal" | "real" | "double precision" | "float" | "float4" | "float8"
        | "money" | "smallmoney" | "double" => NormalizedType::Decimal,

        "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        | "timestamptz" | "date" | "datetime" | "datetime2" | "smalldatetime"
        | "datetimeoffset" | "time" | "time without time zone" | "time with time zone" => {
            NormalizedType::DateTime
        }

        "boolean" | "bool" | "bit" => NormalizedType::Boolean,

        "uuid" | "uniqueidentifier" => NormalizedType::Guid,

        _ => NormalizedType::Other,
    }
}
