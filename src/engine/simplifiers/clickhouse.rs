//! ClickHouse type simplifier
//!
//! ClickHouse has no conventional secondary indexes or key constraints; the
//! table's storage layout (engine, partition key, sort order) is carried in
//! the table comment as `engine=X partition by Y order by Z ...` and
//! surfaced as pseudo-constraint tags on the first column.

use crate::engine::traits::TypeSimplifier;
use crate::engine::types::{Column, Table};

use super::base_constraints;

/// Keywords that terminate a comment token value.
const COMMENT_KEYWORDS: [&str; 5] = [
    "order by",
    "partition by",
    "primary key",
    "sample by",
    "settings",
];

/// Storage layout tokens extracted from a table comment.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TableComment {
    pub engine: Option<String>,
    pub partition_by: Option<String>,
    pub order_by: Option<String>,
}

/// Extracts `engine=` / `partition by` / `order by` values from a table
/// comment. Each value runs until the next recognized keyword or end of
/// string. Malformed input degrades to empty annotations.
pub fn parse_table_comment(comment: &str) -> TableComment {
    let lowered = comment.to_ascii_lowercase();

    TableComment {
        engine: token_value(comment, &lowered, "engine="),
        partition_by: token_value(comment, &lowered, "partition by"),
        order_by: token_value(comment, &lowered, "order by"),
    }
}

fn token_value(original: &str, lowered: &str, token: &str) -> Option<String> {
    let start = lowered.find(token)? + token.len();
    if start > original.len() {
        return None;
    }

    let tail = &lowered[start..];
    let end = COMMENT_KEYWORDS
        .iter()
        .filter_map(|kw| tail.find(kw))
        .min()
        .unwrap_or(tail.len());

    let value = original[start..start + end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub struct ClickHouseSimplifier;

impl TypeSimplifier for ClickHouseSimplifier {
    fn engine(&self) -> &'static str {
        "clickhouse"
    }

    fn simplify_type(&self, vendor_type: &str) -> String {
        let mut t = vendor_type.trim();

        // Unwrap Nullable(...) and LowCardinality(...) before matching.
        for wrapper in ["Nullable(", "LowCardinality("] {
            if t.starts_with(wrapper) && t.ends_with(')') {
                t = t[wrapper.len()..t.len() - 1].trim();
            }
        }

        if t.starts_with("Array(") {
            return "array".to_string();
        }
        if t.starts_with("Map(") {
            return "map".to_string();
        }
        if t.starts_with("Tuple(") {
            return "tuple".to_string();
        }
        if t.starts_with("Int") || t.starts_with("UInt") {
            return "integer".to_string();
        }
        if t.starts_with("Float") {
            return "number".to_string();
        }
        if t.starts_with("Decimal") {
            return "decimal".to_string();
        }
        if t.starts_with("DateTime") {
            return "timestamp".to_string();
        }
        if t.starts_with("Date") {
            return "date".to_string();
        }
        if t == "String" || t.starts_with("FixedString") || t.starts_with("Enum") {
            return "string".to_string();
        }
        if t == "Bool" {
            return "boolean".to_string();
        }
        if t == "UUID" {
            return "uuid".to_string();
        }
        if t == "JSON" || t.starts_with("Object(") {
            return "json".to_string();
        }

        vendor_type.to_string()
    }

    fn column_constraints(&self, column: &Column, table: &Table) -> Vec<String> {
        let mut tags = base_constraints(column, table);

        // Storage layout tags belong to the table; hang them off the first
        // column so they show up exactly once in the rendering.
        if table.first_column() == Some(column.name.as_str()) {
            if let Some(comment) = &table.comment {
                let parsed = parse_table_comment(comment);
                if let Some(engine) = parsed.engine {
                    tags.push(format!("ENGINE: {}", engine));
                }
                if let Some(partition) = parsed.partition_by {
                    tags.push(format!("PARTITION KEY: {}", partition));
                }
                if let Some(order) = parsed.order_by {
                    tags.push(format!("ORDER BY: {}", order));
                }
            }
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_type_matrix() {
        let s = ClickHouseSimplifier;
        assert_eq!(s.simplify_type("Int32"), "integer");
        assert_eq!(s.simplify_type("UInt64"), "integer");
        assert_eq!(s.simplify_type("Nullable(Int32)"), "integer");
        assert_eq!(s.simplify_type("Float64"), "number");
        assert_eq!(s.simplify_type("Decimal(10,2)"), "decimal");
        assert_eq!(s.simplify_type("String"), "string");
        assert_eq!(s.simplify_type("FixedString(16)"), "string");
        assert_eq!(s.simplify_type("LowCardinality(String)"), "string");
        assert_eq!(s.simplify_type("DateTime64(3)"), "timestamp");
        assert_eq!(s.simplify_type("Date"), "date");
        assert_eq!(s.simplify_type("UUID"), "uuid");
        assert_eq!(s.simplify_type("Array(String)"), "array");
        assert_eq!(s.simplify_type("Map(String, UInt64)"), "map");
        assert_eq!(s.simplify_type("Tuple(String, Int32)"), "tuple");
        assert_eq!(s.simplify_type("AggregateFunction(sum, UInt64)"),
            "AggregateFunction(sum, UInt64)");
    }

    #[test]
    fn parses_the_full_comment_pattern() {
        let parsed = parse_table_comment(
            "engine=MergeTree partition by toYYYYMM(ts) order by (id, ts) settings index_granularity=8192",
        );
        assert_eq!(parsed.engine.as_deref(), Some("MergeTree"));
        assert_eq!(parsed.partition_by.as_deref(), Some("toYYYYMM(ts)"));
        assert_eq!(parsed.order_by.as_deref(), Some("(id, ts)"));
    }

    #[test]
    fn tokens_may_appear_in_any_subset() {
        let parsed = parse_table_comment("engine=Log");
        assert_eq!(parsed.engine.as_deref(), Some("Log"));
        assert_eq!(parsed.partition_by, None);
        assert_eq!(parsed.order_by, None);
    }

    #[test]
    fn malformed_comments_degrade_to_empty() {
        assert_eq!(parse_table_comment(""), TableComment::default());
        assert_eq!(parse_table_comment("just a human note"), TableComment::default());
        // Unterminated keyword at end of string.
        assert_eq!(parse_table_comment("partition by"), TableComment::default());
        assert_eq!(parse_table_comment("engine="), TableComment::default());
        // Keyword collision inside a value is bounded, not a panic.
        let parsed = parse_table_comment("engine=MergeTree order by partition by x");
        assert_eq!(parsed.engine.as_deref(), Some("MergeTree"));
        assert_eq!(parsed.order_by, None);
        assert_eq!(parsed.partition_by.as_deref(), Some("x"));
    }

    #[test]
    fn first_column_carries_storage_tags() {
        let mut table = Table::new("events");
        table.comment =
            Some("engine=MergeTree partition by toYYYYMM(ts) order by (id, ts)".to_string());
        let id = Column {
            name: "id".to_string(),
            data_type: "UInt64".to_string(),
            nullable: false,
            ..Default::default()
        };
        let ts = Column {
            name: "ts".to_string(),
            data_type: "DateTime".to_string(),
            nullable: false,
            ..Default::default()
        };
        table.columns.insert("id".to_string(), id.clone());
        table.columns.insert("ts".to_string(), ts.clone());
        table.column_order = vec!["id".to_string(), "ts".to_string()];

        let s = ClickHouseSimplifier;
        let id_tags = s.column_constraints(&id, &table);
        assert!(id_tags.contains(&"ENGINE: MergeTree".to_string()));
        assert!(id_tags.contains(&"PARTITION KEY: toYYYYMM(ts)".to_string()));
        assert!(id_tags.contains(&"ORDER BY: (id, ts)".to_string()));

        let ts_tags = s.column_constraints(&ts, &table);
        assert!(!ts_tags.iter().any(|t| t.starts_with("ENGINE:")));
    }
}
