//! MongoDB type simplifier
//!
//! Vendor types here are BSON type names produced by the caller's document
//! sampling pass.

use crate::engine::traits::TypeSimplifier;
use crate::engine::types::{Column, Table};

use super::base_constraints;

pub struct MongoSimplifier;

impl TypeSimplifier for MongoSimplifier {
    fn engine(&self) -> &'static str {
        "mongodb"
    }

    fn simplify_type(&self, vendor_type: &str) -> String {
        let t = vendor_type.trim().to_lowercase();

        match t.as_str() {
            "objectid" => "ObjectID".to_string(),
            "string" | "symbol" => "string".to_string(),
            "int" | "int32" | "long" | "int64" | "double" => "number".to_string(),
            "decimal" | "decimal128" => "decimal".to_string(),
            "bool" | "boolean" => "boolean".to_string(),
            "date" | "timestamp" => "timestamp".to_string(),
            "object" | "document" => "json".to_string(),
            "array" => "array".to_string(),
            "bindata" | "binary" => "binary".to_string(),
            "null" => "Null".to_string(),
            _ => vendor_type.to_string(),
        }
    }

    fn column_constraints(&self, column: &Column, table: &Table) -> Vec<String> {
        let mut tags = base_constraints(column, table);

        if column.data_type.eq_ignore_ascii_case("objectid") {
            tags.push("MONGODB OBJECTID".to_string());
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Constraint, Index};

    #[test]
    fn bson_type_matrix() {
        let s = MongoSimplifier;
        assert_eq!(s.simplify_type("objectId"), "ObjectID");
        assert_eq!(s.simplify_type("string"), "string");
        assert_eq!(s.simplify_type("long"), "number");
        assert_eq!(s.simplify_type("double"), "number");
        assert_eq!(s.simplify_type("decimal128"), "decimal");
        assert_eq!(s.simplify_type("bool"), "boolean");
        assert_eq!(s.simplify_type("date"), "timestamp");
        assert_eq!(s.simplify_type("object"), "json");
        assert_eq!(s.simplify_type("array"), "array");
        assert_eq!(s.simplify_type("binData"), "binary");
        assert_eq!(s.simplify_type("null"), "Null");
        assert_eq!(s.simplify_type("regex"), "regex");
    }

    #[test]
    fn id_column_gets_pk_and_objectid_without_duplicate_indexed() {
        let mut table = Table::new("events");
        let id = Column {
            name: "_id".to_string(),
            data_type: "objectId".to_string(),
            nullable: false,
            ..Default::default()
        };
        table.columns.insert("_id".to_string(), id.clone());
        table.constraints.insert(
            "_id_pk".to_string(),
            Constraint {
                name: "_id_pk".to_string(),
                kind: "PRIMARY KEY".to_string(),
                definition: None,
                columns: vec!["_id".to_string()],
            },
        );
        table.indexes.insert(
            "_id_".to_string(),
            Index {
                name: "_id_".to_string(),
                columns: vec!["_id".to_string()],
                unique: true,
            },
        );

        let tags = MongoSimplifier.column_constraints(&id, &table);
        assert_eq!(
            tags,
            vec![
                "NOT NULL".to_string(),
                "PRIMARY KEY".to_string(),
                "MONGODB OBJECTID".to_string()
            ]
        );
        assert!(!tags.contains(&"INDEXED".to_string()));
        assert!(!tags.contains(&"UNIQUE".to_string()));
    }
}
