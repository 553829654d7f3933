// SPDX-License-Identifier: Apache-2.0

//! Schema diff engine
//!
//! Full structural comparison between two normalized schemas. Checksums are
//! never trusted as a shortcut: equality is decided field by field, at
//! schema, table, and column/index/foreign-key granularity.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::engine::types::{Column, ForeignKey, Index, Schema, Table};

/// Per-table change sets. An index or foreign key whose definition changed
/// appears in both the removed and added lists (drop + create).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableDiff {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_indexes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_indexes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_foreign_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_foreign_keys: Vec<String>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.added_foreign_keys.is_empty()
            && self.removed_foreign_keys.is_empty()
    }
}

/// Complete diff between two schema generations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaDiff {
    /// True when no prior snapshot existed; `full_schema` then carries the
    /// freshly fetched schema.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_first_time: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_tables: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub modified_tables: HashMap<String, TableDiff>,
}

/// Diff for the first fetch of a session: everything is new.
pub fn first_time_diff(new: &Schema) -> SchemaDiff {
    SchemaDiff {
        is_first_time: true,
        full_schema: Some(new.clone()),
        ..Default::default()
    }
}

/// Compares two schemas structurally. Returns the diff and whether anything
/// changed.
pub fn compare_schemas(old: &Schema, new: &Schema) -> (SchemaDiff, bool) {
    let old_names: HashSet<&str> = old.tables.keys().map(|s| s.as_str()).collect();
    let new_names: HashSet<&str> = new.tables.keys().map(|s| s.as_str()).collect();

    let mut added_tables: Vec<String> = new_names
        .difference(&old_names)
        .map(|s| s.to_string())
        .collect();
    added_tables.sort_unstable();

    let mut removed_tables: Vec<String> = old_names
        .difference(&new_names)
        .map(|s| s.to_string())
        .collect();
    removed_tables.sort_unstable();

    let mut modified_tables = HashMap::new();
    for name in old_names.intersection(&new_names) {
        let diff = compare_tables(&old.tables[*name], &new.tables[*name]);
        if !diff.is_empty() {
            modified_tables.insert(name.to_string(), diff);
        }
    }

    let changed =
        !added_tables.is_empty() || !removed_tables.is_empty() || !modified_tables.is_empty();

    (
        SchemaDiff {
            is_first_time: false,
            full_schema: None,
            added_tables,
            removed_tables,
            modified_tables,
        },
        changed,
    )
}

fn compare_tables(old: &Table, new: &Table) -> TableDiff {
    let mut diff = TableDiff::default();

    let old_cols: HashSet<&str> = old.columns.keys().map(|s| s.as_str()).collect();
    let new_cols: HashSet<&str> = new.columns.keys().map(|s| s.as_str()).collect();

    diff.added_columns = sorted(new_cols.difference(&old_cols));
    diff.removed_columns = sorted(old_cols.difference(&new_cols));
    for name in old_cols.intersection(&new_cols) {
        if column_changed(&old.columns[*name], &new.columns[*name]) {
            diff.modified_columns.push(name.to_string());
        }
    }
    diff.modified_columns.sort_unstable();

    let old_idx: HashSet<&str> = old.indexes.keys().map(|s| s.as_str()).collect();
    let new_idx: HashSet<&str> = new.indexes.keys().map(|s| s.as_str()).collect();

    diff.added_indexes = sorted(new_idx.difference(&old_idx));
    diff.removed_indexes = sorted(old_idx.difference(&new_idx));
    for name in old_idx.intersection(&new_idx) {
        if index_changed(&old.indexes[*name], &new.indexes[*name]) {
            // Definition moved under the same name: drop + create.
            diff.removed_indexes.push(name.to_string());
            diff.added_indexes.push(name.to_string());
        }
    }
    diff.added_indexes.sort_unstable();
    diff.removed_indexes.sort_unstable();

    let old_fks: HashSet<&str> = old.foreign_keys.keys().map(|s| s.as_str()).collect();
    let new_fks: HashSet<&str> = new.foreign_keys.keys().map(|s| s.as_str()).collect();

    diff.added_foreign_keys = sorted(new_fks.difference(&old_fks));
    diff.removed_foreign_keys = sorted(old_fks.difference(&new_fks));
    for name in old_fks.intersection(&new_fks) {
        if foreign_key_changed(&old.foreign_keys[*name], &new.foreign_keys[*name]) {
            diff.removed_foreign_keys.push(name.to_string());
            diff.added_foreign_keys.push(name.to_string());
        }
    }
    diff.added_foreign_keys.sort_unstable();
    diff.removed_foreign_keys.sort_unstable();

    diff
}

/// Column equality for diff purposes: vendor type, nullability, default.
/// Comments are documentation, not structure.
fn column_changed(old: &Column, new: &Column) -> bool {
    old.data_type != new.data_type
        || old.nullable != new.nullable
        || old.default_value != new.default_value
}

fn index_changed(old: &Index, new: &Index) -> bool {
    old.columns != new.columns || old.unique != new.unique
}

fn foreign_key_changed(old: &ForeignKey, new: &ForeignKey) -> bool {
    old.column != new.column
        || old.referenced_table != new.referenced_table
        || old.referenced_column != new.referenced_column
        || old.on_delete != new.on_delete
        || old.on_update != new.on_update
}

fn sorted<T: ToString>(names: impl Iterator<Item = T>) -> Vec<String> {
    let mut out: Vec<String> = names.map(|s| s.to_string()).collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Constraint;

    fn column(name: &str, data_type: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            ..Default::default()
        }
    }

    fn schema_with_users() -> Schema {
        let mut table = Table::new("users");
        table.columns.insert("id".to_string(), column("id", "int", false));
        table
            .columns
            .insert("email".to_string(), column("email", "text", true));
        table.indexes.insert(
            "users_email_idx".to_string(),
            Index {
                name: "users_email_idx".to_string(),
                columns: vec!["email".to_string()],
                unique: false,
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

        let mut schema = Schema::new();
        schema.tables.insert("users".to_string(), table);
        schema
    }

    #[test]
    fn identical_schemas_do_not_change() {
        let schema = schema_with_users();
        let (diff, changed) = compare_schemas(&schema, &schema.clone());
        assert!(!changed);
        assert!(diff.added_tables.is_empty());
        assert!(diff.removed_tables.is_empty());
        assert!(diff.modified_tables.is_empty());
    }

    #[test]
    fn added_column_shows_up_once() {
        let old = schema_with_users();
        let mut new = schema_with_users();
        new.tables.get_mut("users").unwrap().columns.insert(
            "created_at".to_string(),
            Column {
                name: "created_at".to_string(),
                data_type: "timestamp".to_string(),
                nullable: false,
                default_value: Some("now()".to_string()),
                ..Default::default()
            },
        );

        let (diff, changed) = compare_schemas(&old, &new);
        assert!(changed);
        assert_eq!(diff.modified_tables.len(), 1);
        let users = &diff.modified_tables["users"];
        assert_eq!(users.added_columns, vec!["created_at".to_string()]);
        assert!(users.removed_columns.is_empty());
        assert!(users.modified_columns.is_empty());
        assert!(users.added_indexes.is_empty());
        assert!(users.removed_indexes.is_empty());
    }

    #[test]
    fn comment_only_change_is_not_structural() {
        let old = schema_with_users();
        let mut new = schema_with_users();
        new.tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("email")
            .unwrap()
            .comment = Some("login address".to_string());

        let (_, changed) = compare_schemas(&old, &new);
        assert!(!changed);
    }

    #[test]
    fn index_rename_is_drop_plus_create() {
        let old = schema_with_users();
        let mut new = schema_with_users();
        let table = new.tables.get_mut("users").unwrap();
        let idx = table.indexes.remove("users_email_idx").unwrap();
        table.indexes.insert(
            "users_email_key".to_string(),
            Index { name: "users_email_key".to_string(), ..idx },
        );

        let (diff, changed) = compare_schemas(&old, &new);
        assert!(changed);
        let users = &diff.modified_tables["users"];
        assert_eq!(users.added_indexes, vec!["users_email_key".to_string()]);
        assert_eq!(users.removed_indexes, vec!["users_email_idx".to_string()]);
    }

    #[test]
    fn index_redefinition_under_same_name_is_drop_plus_create() {
        let old = schema_with_users();
        let mut new = schema_with_users();
        new.tables
            .get_mut("users")
            .unwrap()
            .indexes
            .get_mut("users_email_idx")
            .unwrap()
            .unique = true;

        let (diff, _) = compare_schemas(&old, &new);
        let users = &diff.modified_tables["users"];
        assert_eq!(users.added_indexes, vec!["users_email_idx".to_string()]);
        assert_eq!(users.removed_indexes, vec!["users_email_idx".to_string()]);
    }

    #[test]
    fn dropped_foreign_key_is_reported() {
        let mut old = schema_with_users();
        let mut orders = Table::new("orders");
        orders
            .columns
            .insert("user_id".to_string(), column("user_id", "int", false));
        orders.foreign_keys.insert(
            "fk_u".to_string(),
            ForeignKey {
                name: "fk_u".to_string(),
                column: "user_id".to_string(),
                referenced_table: "users".to_string(),
                referenced_column: "id".to_string(),
                on_delete: None,
                on_update: None,
            },
        );
        old.tables.insert("orders".to_string(), orders.clone());

        let mut new = old.clone();
        new.tables
            .get_mut("orders")
            .unwrap()
            .foreign_keys
            .remove("fk_u");

        let (diff, changed) = compare_schemas(&old, &new);
        assert!(changed);
        assert_eq!(
            diff.modified_tables["orders"].removed_foreign_keys,
            vec!["fk_u".to_string()]
        );
    }

    #[test]
    fn table_add_and_remove_are_tracked() {
        let old = schema_with_users();
        let mut new = Schema::new();
        let mut logs = Table::new("logs");
        logs.columns.insert("id".to_string(), column("id", "bigint", false));
        new.tables.insert("logs".to_string(), logs);

        let (diff, changed) = compare_schemas(&old, &new);
        assert!(changed);
        assert_eq!(diff.added_tables, vec!["logs".to_string()]);
        assert_eq!(diff.removed_tables, vec!["users".to_string()]);
    }

    #[test]
    fn first_time_diff_carries_the_full_schema() {
        let schema = schema_with_users();
        let diff = first_time_diff(&schema);
        assert!(diff.is_first_time);
        assert_eq!(diff.full_schema.as_ref().unwrap(), &schema);
        assert!(diff.added_tables.is_empty());
    }
}
