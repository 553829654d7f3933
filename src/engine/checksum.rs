// SPDX-License-Identifier: Apache-2.0

//! Structural checksums
//!
//! A table checksum is MD5 over a canonical serialization of the table's
//! structural fields; the schema checksum is MD5 over the sorted
//! (name, table-checksum) pairs. Canonical form is sorted explicitly so the
//! digest is a pure function of structure: map iteration order, comments,
//! row counts, and index renames (same columns + uniqueness) never move it.

use std::collections::HashMap;

use crate::engine::types::{Schema, Table};

/// Canonical serialization of a table's structural fields:
/// `"<name>:<columns>:<indexes>:<foreignKeys>:<constraints>"`.
fn canonical_bytes(table: &Table) -> String {
    let mut columns: Vec<String> = table
        .columns
        .values()
        .map(|c| {
            format!(
                "{}={} null={} default={}",
                c.name,
                c.data_type,
                c.nullable,
                c.default_value.as_deref().unwrap_or("-"),
            )
        })
        .collect();
    columns.sort_unstable();

    // Indexes serialize without their names: a rename that keeps columns and
    // uniqueness identical is cosmetic.
    let mut indexes: Vec<String> = table
        .indexes
        .values()
        .map(|i| format!("({}) unique={}", i.columns.join(","), i.unique))
        .collect();
    indexes.sort_unstable();

    let mut foreign_keys: Vec<String> = table
        .foreign_keys
        .values()
        .map(|fk| {
            format!(
                "{}={}->{}.{} del={} upd={}",
                fk.name,
                fk.column,
                fk.referenced_table,
                fk.referenced_column,
                fk.on_delete.as_deref().unwrap_or("-"),
                fk.on_update.as_deref().unwrap_or("-"),
            )
        })
        .collect();
    foreign_keys.sort_unstable();

    let mut constraints: Vec<String> = table
        .constraints
        .values()
        .map(|c| {
            format!(
                "{}={}({}) def={}",
                c.name,
                c.kind,
                c.columns.join(","),
                c.definition.as_deref().unwrap_or("-"),
            )
        })
        .collect();
    constraints.sort_unstable();

    format!(
        "{}:{}:{}:{}:{}",
        table.name,
        columns.join("|"),
        indexes.join("|"),
        foreign_keys.join("|"),
        constraints.join("|"),
    )
}

/// Structural checksum of one table (lowercase hex MD5).
pub fn table_checksum(table: &Table) -> String {
    format!("{:x}", md5::compute(canonical_bytes(table)))
}

/// Schema-level checksum over sorted (table name, table checksum) pairs.
pub fn schema_checksum(tables: &HashMap<String, Table>) -> String {
    let mut pairs: Vec<(&str, &str)> = tables
        .iter()
        .map(|(name, table)| (name.as_str(), table.checksum.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut composite = String::new();
    for (name, checksum) in pairs {
        composite.push_str(name);
        composite.push('=');
        composite.push_str(checksum);
        composite.push(';');
    }
    format!("{:x}", md5::compute(composite))
}

/// Fills in every table checksum and the schema checksum in place.
pub fn seal(schema: &mut Schema) {
    for table in schema.tables.values_mut() {
        table.checksum = table_checksum(table);
    }
    schema.checksum = schema_checksum(&schema.tables);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Column, Constraint, ForeignKey, Index};

    fn column(name: &str, data_type: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            ..Default::default()
        }
    }

    fn users_table() -> Table {
        let mut t = Table::new("users");
        t.columns.insert("id".to_string(), column("id", "bigint", false));
        t.columns.insert("email".to_string(), column("email", "text", true));
        t.indexes.insert(
            "users_email_idx".to_string(),
            Index {
                name: "users_email_idx".to_string(),
                columns: vec!["email".to_string()],
                unique: true,
            },
        );
        t.foreign_keys.insert(
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
        t.constraints.insert(
            "users_pkey".to_string(),
            Constraint {
                name: "users_pkey".to_string(),
                kind: "PRIMARY KEY".to_string(),
                definition: None,
                columns: vec!["id".to_string()],
            },
        );
        t
    }

    #[test]
    fn checksum_is_insensitive_to_insertion_order() {
        let a = users_table();

        let mut b = Table::new("users");
        // Insert everything in reverse order.
        b.columns.insert("email".to_string(), column("email", "text", true));
        b.columns.insert("id".to_string(), column("id", "bigint", false));
        b.indexes = a.indexes.clone();
        b.foreign_keys = a.foreign_keys.clone();
        b.constraints = a.constraints.clone();

        assert_eq!(table_checksum(&a), table_checksum(&b));
    }

    #[test]
    fn comment_and_row_count_are_not_structural() {
        let a = users_table();
        let mut b = users_table();
        b.comment = Some("application accounts".to_string());
        b.row_count = 42_000;
        b.columns.get_mut("email").unwrap().comment = Some("login address".to_string());

        assert_eq!(table_checksum(&a), table_checksum(&b));
    }

    #[test]
    fn index_rename_with_same_shape_is_cosmetic() {
        let a = users_table();
        let mut b = users_table();
        let idx = b.indexes.remove("users_email_idx").unwrap();
        b.indexes.insert(
            "users_email_key".to_string(),
            Index { name: "users_email_key".to_string(), ..idx },
        );

        assert_eq!(table_checksum(&a), table_checksum(&b));
    }

    #[test]
    fn structural_edits_move_the_checksum() {
        let a = users_table();

        let mut typed = users_table();
        typed.columns.get_mut("email").unwrap().data_type = "varchar(255)".to_string();
        assert_ne!(table_checksum(&a), table_checksum(&typed));

        let mut defaulted = users_table();
        defaulted.columns.get_mut("email").unwrap().default_value = Some("''".to_string());
        assert_ne!(table_checksum(&a), table_checksum(&defaulted));

        let mut uniq = users_table();
        uniq.indexes.get_mut("users_email_idx").unwrap().unique = false;
        assert_ne!(table_checksum(&a), table_checksum(&uniq));
    }

    #[test]
    fn schema_checksum_depends_only_on_sorted_pairs() {
        let mut schema = Schema::new();
        schema.tables.insert("users".to_string(), users_table());
        let mut other = Table::new("orders");
        other.columns.insert("id".to_string(), column("id", "bigint", false));
        schema.tables.insert("orders".to_string(), other);
        seal(&mut schema);

        let mut reordered = Schema::new();
        for name in ["orders", "users"] {
            reordered
                .tables
                .insert(name.to_string(), schema.tables[name].clone());
        }
        seal(&mut reordered);

        assert_eq!(schema.checksum, reordered.checksum);
    }
}
