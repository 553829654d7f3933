//! Per-engine type simplifiers
//!
//! Each engine maps its vendor type strings onto the canonical ontology and
//! derives per-column constraint tags for LLM rendering. Matching is
//! prefix/substring on the lowercased vendor type; unknown types pass
//! through unchanged.

pub mod clickhouse;
pub mod mongodb;
pub mod mysql;
pub mod postgres;

pub use clickhouse::ClickHouseSimplifier;
pub use mongodb::MongoSimplifier;
pub use mysql::MySqlSimplifier;
pub use postgres::PostgresSimplifier;

use crate::engine::types::{constraint_kind, Column, Table};

/// Engine-independent constraint tags: NOT NULL, DEFAULT, one of
/// PRIMARY KEY / UNIQUE / INDEXED (strongest wins, never duplicated),
/// FOREIGN KEY REFERENCES, AUTO_INCREMENT.
pub(crate) fn base_constraints(column: &Column, table: &Table) -> Vec<String> {
    let mut tags = Vec::new();

    if !column.nullable {
        tags.push("NOT NULL".to_string());
    }
    if let Some(default) = &column.default_value {
        tags.push(format!("DEFAULT {}", default));
    }

    let is_primary = table.constraints.values().any(|c| {
        c.kind == constraint_kind::PRIMARY_KEY && c.columns.iter().any(|col| col == &column.name)
    });
    let is_unique = table
        .indexes
        .values()
        .any(|i| i.unique && i.columns.len() == 1 && i.columns[0] == column.name)
        || table.constraints.values().any(|c| {
            c.kind == constraint_kind::UNIQUE
                && c.columns.len() == 1
                && c.columns[0] == column.name
        });
    let is_indexed = table
        .indexes
        .values()
        .any(|i| i.columns.iter().any(|col| col == &column.name));

    if is_primary {
        tags.push("PRIMARY KEY".to_string());
    } else if is_unique {
        tags.push("UNIQUE".to_string());
    } else if is_indexed {
        tags.push("INDEXED".to_string());
    }

    let mut fks: Vec<_> = table
        .foreign_keys
        .values()
        .filter(|fk| fk.column == column.name)
        .collect();
    fks.sort_by(|a, b| a.name.cmp(&b.name));
    for fk in fks {
        tags.push(format!(
            "FOREIGN KEY REFERENCES {}({})",
            fk.referenced_table, fk.referenced_column
        ));
    }

    if column.auto_increment {
        tags.push("AUTO_INCREMENT".to_string());
    }

    tags
}
