// SPDX-License-Identifier: Apache-2.0

//! Deterministic schema rendering for LLM consumption
//!
//! Plain line-oriented UTF-8, no markdown, no trailing whitespace. Tables,
//! columns, indexes, constraints, and foreign keys are sorted by name, so
//! equal snapshots always produce byte-identical output.

use std::fmt::Write;

use crate::engine::types::{LlmTable, Snapshot, Table};

/// Maximum example records emitted per table.
const MAX_EXAMPLE_RECORDS: usize = 3;

/// Renders a snapshot into the prompt-ready text form.
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut sections: Vec<String> = Vec::new();

    let mut table_names: Vec<&String> = snapshot.full_schema.tables.keys().collect();
    table_names.sort_unstable();

    for name in table_names {
        let table = &snapshot.full_schema.tables[name];
        let llm = snapshot.llm_schema.tables.get(name);
        sections.push(render_table(table, llm));
    }

    if !snapshot.full_schema.views.is_empty() {
        let mut views = snapshot.full_schema.views.clone();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        let mut out = String::from("Views:");
        for view in &views {
            // Catalog definitions can span lines; keep each view on one.
            let definition = view.definition.split_whitespace().collect::<Vec<_>>().join(" ");
            write!(out, "\nView: {} AS {}", view.name, definition).unwrap();
        }
        sections.push(out);
    }

    if !snapshot.full_schema.sequences.is_empty() {
        let mut sequences = snapshot.full_schema.sequences.clone();
        sequences.sort_by(|a, b| a.name.cmp(&b.name));
        let mut out = String::from("Sequences:");
        for seq in &sequences {
            match &seq.data_type {
                Some(dt) => write!(out, "\nSequence: {} ({})", seq.name, dt).unwrap(),
                None => write!(out, "\nSequence: {}", seq.name).unwrap(),
            }
        }
        sections.push(out);
    }

    if !snapshot.full_schema.enums.is_empty() {
        let mut enums = snapshot.full_schema.enums.clone();
        enums.sort_by(|a, b| a.name.cmp(&b.name));
        let mut out = String::from("Enums:");
        for e in &enums {
            write!(out, "\nEnum: {} ({})", e.name, e.values.join(", ")).unwrap();
        }
        sections.push(out);
    }

    let mut text = sections.join("\n\n");
    text.push('\n');
    text
}

fn render_table(table: &Table, llm: Option<&LlmTable>) -> String {
    let mut out = String::new();
    write!(out, "Table: {}", table.name).unwrap();

    let description = llm
        .and_then(|l| l.description.as_deref())
        .or(table.comment.as_deref());
    if let Some(desc) = description {
        write!(out, "\nDescription: {}", desc).unwrap();
    }

    let primary_key = llm
        .map(|l| l.primary_key.clone())
        .unwrap_or_else(|| table.primary_key());
    let pk_columns: Vec<&str> = primary_key.split(',').filter(|s| !s.is_empty()).collect();

    let mut column_names: Vec<&String> = table.columns.keys().collect();
    column_names.sort_unstable();

    for name in &column_names {
        let column = &table.columns[*name];
        let llm_column = llm.and_then(|l| l.columns.get(*name));

        let data_type = llm_column
            .map(|c| c.data_type.as_str())
            .unwrap_or(column.data_type.as_str());
        let nullability = if column.nullable { "NULL" } else { "NOT NULL" };

        write!(out, "\n - {} ({}) {}", column.name, data_type, nullability).unwrap();

        if pk_columns.contains(&column.name.as_str()) {
            out.push_str(" PRIMARY KEY");
        } else if in_unique_index(table, &column.name) {
            out.push_str(" UNIQUE");
        } else if llm_column.map(|c| c.indexed).unwrap_or(false) {
            out.push_str(" INDEXED");
        }

        if let Some(default) = &column.default_value {
            write!(out, " DEFAULT {}", default).unwrap();
        }

        let comment = llm_column
            .and_then(|c| c.description.as_deref())
            .or(column.comment.as_deref());
        if let Some(comment) = comment {
            write!(out, " -- {}", comment).unwrap();
        }
    }

    let mut index_names: Vec<&String> = table.indexes.keys().collect();
    index_names.sort_unstable();
    for name in index_names {
        let index = &table.indexes[name];
        write!(out, "\nIndex: {} ({})", index.name, index.columns.join(", ")).unwrap();
        if index.unique {
            out.push_str(" UNIQUE");
        }
    }

    let mut constraint_names: Vec<&String> = table.constraints.keys().collect();
    constraint_names.sort_unstable();
    for name in constraint_names {
        let constraint = &table.constraints[name];
        write!(out, "\nConstraint: {} {}", constraint.name, constraint.kind).unwrap();
        if !constraint.columns.is_empty() {
            write!(out, " ({})", constraint.columns.join(", ")).unwrap();
        }
        if let Some(def) = &constraint.definition {
            write!(out, " {}", def).unwrap();
        }
    }

    let mut fk_names: Vec<&String> = table.foreign_keys.keys().collect();
    fk_names.sort_unstable();
    for name in fk_names {
        let fk = &table.foreign_keys[name];
        write!(
            out,
            "\nForeign Key: {} {} -> {}.{}",
            fk.name, fk.column, fk.referenced_table, fk.referenced_column
        )
        .unwrap();
        if let Some(rule) = &fk.on_delete {
            write!(out, " ON DELETE {}", rule).unwrap();
        }
        if let Some(rule) = &fk.on_update {
            write!(out, " ON UPDATE {}", rule).unwrap();
        }
    }

    write!(out, "\nRow Count: {}", table.row_count).unwrap();

    if let Some(llm) = llm {
        for (i, record) in llm
            .example_records
            .iter()
            .take(MAX_EXAMPLE_RECORDS)
            .enumerate()
        {
            write!(out, "\nRecord {}:", i + 1).unwrap();
            if column_names.is_empty() {
                // Degraded fetch: no declared columns, walk the record keys.
                for (key, value) in record {
                    write!(out, "\n  {}: {}", key, render_value(value)).unwrap();
                }
            } else {
                for name in &column_names {
                    if let Some(value) = record.get(*name) {
                        write!(out, "\n  {}: {}", name, render_value(value)).unwrap();
                    }
                }
            }
        }
    }

    out
}

fn in_unique_index(table: &Table, column: &str) -> bool {
    table
        .indexes
        .values()
        .any(|idx| idx.unique && idx.columns.iter().any(|c| c == column))
}

/// Strings keep JSON quoting, nulls print as NULL, everything else is the
/// compact JSON form.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{
        Column, Constraint, EnumType, ForeignKey, Index, LlmColumn, LlmSchema, Schema, Table, View,
    };
    use chrono::Utc;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    fn snapshot_fixture() -> Snapshot {
        let mut table = Table::new("users");
        table.columns.insert(
            "id".to_string(),
            Column {
                name: "id".to_string(),
                data_type: "bigint".to_string(),
                nullable: false,
                ..Default::default()
            },
        );
        table.columns.insert(
            "email".to_string(),
            Column {
                name: "email".to_string(),
                data_type: "text".to_string(),
                nullable: true,
                comment: Some("login address".to_string()),
                ..Default::default()
            },
        );
        table.indexes.insert(
            "users_email_idx".to_string(),
            Index {
                name: "users_email_idx".to_string(),
                columns: vec!["email".to_string()],
                unique: true,
            },
        );
        table.constraints.insert(
            "users_pkey".to_string(),
            Constraint {
                name: "users_pkey".to_string(),
                kind: "PRIMARY KEY".to_string(),
                definition: None,
                columns: vec!["id".to_string()],
            },
        );
        table.foreign_keys.insert(
            "fk_team".to_string(),
            ForeignKey {
                name: "fk_team".to_string(),
                column: "team_id".to_string(),
                referenced_table: "teams".to_string(),
                referenced_column: "id".to_string(),
                on_delete: Some("CASCADE".to_string()),
                on_update: None,
            },
        );
        table.row_count = 2;

        let mut record = BTreeMap::new();
        record.insert("id".to_string(), json!(1));
        record.insert("email".to_string(), json!("a@example.com"));

        let mut llm_columns = HashMap::new();
        llm_columns.insert(
            "id".to_string(),
            LlmColumn {
                data_type: "number".to_string(),
                description: None,
                nullable: false,
                indexed: false,
                constraints: vec![],
            },
        );
        llm_columns.insert(
            "email".to_string(),
            LlmColumn {
                data_type: "text".to_string(),
                description: Some("login address".to_string()),
                nullable: true,
                indexed: true,
                constraints: vec![],
            },
        );

        let llm_table = LlmTable {
            description: None,
            columns: llm_columns,
            primary_key: "id".to_string(),
            row_count: 2,
            example_records: vec![record],
            relationships: vec![],
        };

        let mut schema = Schema::new();
        schema.tables.insert("users".to_string(), table);
        schema.views.push(View {
            name: "active_users".to_string(),
            definition: "SELECT * FROM users WHERE active".to_string(),
        });
        schema.enums.push(EnumType {
            name: "mood".to_string(),
            values: vec!["happy".to_string(), "sad".to_string()],
        });

        let mut llm_schema = LlmSchema::default();
        llm_schema.tables.insert("users".to_string(), llm_table);

        Snapshot {
            full_schema: schema,
            llm_schema,
            table_checksums: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rendering_is_pure() {
        let snapshot = snapshot_fixture();
        assert_eq!(render_snapshot(&snapshot), render_snapshot(&snapshot));
    }

    #[test]
    fn renders_the_expected_lines() {
        let text = render_snapshot(&snapshot_fixture());
        assert!(text.contains("Table: users"));
        assert!(text.contains(" - id (number) NOT NULL PRIMARY KEY"));
        assert!(text.contains(" - email (text) NULL UNIQUE -- login address"));
        assert!(text.contains("Index: users_email_idx (email) UNIQUE"));
        assert!(text.contains("Constraint: users_pkey PRIMARY KEY (id)"));
        assert!(text.contains("Foreign Key: fk_team team_id -> teams.id ON DELETE CASCADE"));
        assert!(text.contains("Row Count: 2"));
        assert!(text.contains("Record 1:"));
        assert!(text.contains("  email: \"a@example.com\""));
        assert!(text.contains("  id: 1"));
        assert!(text.contains("View: active_users AS SELECT * FROM users WHERE active"));
        assert!(text.contains("Enum: mood (happy, sad)"));
    }

    #[test]
    fn no_trailing_whitespace_on_any_line() {
        let text = render_snapshot(&snapshot_fixture());
        for line in text.lines() {
            assert_eq!(line, line.trim_end(), "trailing whitespace in {:?}", line);
        }
    }

    #[test]
    fn null_values_and_empty_column_sets_fall_back() {
        let mut snapshot = snapshot_fixture();
        let table = snapshot.full_schema.tables.get_mut("users").unwrap();
        table.columns.clear();

        let llm = snapshot.llm_schema.tables.get_mut("users").unwrap();
        let mut record = BTreeMap::new();
        record.insert("ghost".to_string(), serde_json::Value::Null);
        llm.example_records = vec![record];

        let text = render_snapshot(&snapshot);
        assert!(text.contains("  ghost: NULL"));
    }

    #[test]
    fn example_records_are_capped_at_three() {
        let mut snapshot = snapshot_fixture();
        let llm = snapshot.llm_schema.tables.get_mut("users").unwrap();
        let record = llm.example_records[0].clone();
        llm.example_records = vec![record.clone(), record.clone(), record.clone(), record];

        let text = render_snapshot(&snapshot);
        assert!(text.contains("Record 3:"));
        assert!(!text.contains("Record 4:"));
    }
}
