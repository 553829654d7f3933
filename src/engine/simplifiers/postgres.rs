//! PostgreSQL type simplifier (also serves YugabyteDB)

use crate::engine::traits::TypeSimplifier;
use crate::engine::types::{Column, Table};

use super::base_constraints;

pub struct PostgresSimplifier;

impl TypeSimplifier for PostgresSimplifier {
    fn engine(&self) -> &'static str {
        "postgresql"
    }

    fn simplify_type(&self, vendor_type: &str) -> String {
        let t = vendor_type.trim().to_lowercase();

        // Array types surface as "ARRAY", "_int4", or "integer[]".
        if t == "array" || t.ends_with("[]") || t.starts_with('_') {
            return "array".to_string();
        }
        if t == "uuid" {
            return "uuid".to_string();
        }
        if t.starts_with("json") {
            return "json".to_string();
        }
        if t.starts_with("bool") {
            return "boolean".to_string();
        }
        if t == "bytea" {
            return "binary".to_string();
        }
        if t.starts_with("timestamp") {
            return "timestamp".to_string();
        }
        if t == "date" {
            return "date".to_string();
        }
        if t.starts_with("numeric") || t.starts_with("decimal") {
            return "decimal".to_string();
        }
        if t.starts_with("smallint")
            || t.starts_with("integer")
            || t.starts_with("bigint")
            || t.starts_with("int")
            || t.starts_with("serial")
            || t.starts_with("smallserial")
            || t.starts_with("bigserial")
            || t.starts_with("real")
            || t.starts_with("double precision")
            || t.starts_with("float")
            || t == "money"
            || t == "oid"
        {
            return "number".to_string();
        }
        if t.starts_with("character varying")
            || t.starts_with("varchar")
            || t.starts_with("character")
            || t.starts_with("char")
            || t == "text"
            || t == "citext"
            || t == "name"
        {
            return "text".to_string();
        }

        vendor_type.to_string()
    }

    fn column_constraints(&self, column: &Column, table: &Table) -> Vec<String> {
        base_constraints(column, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_type_matrix() {
        let s = PostgresSimplifier;
        assert_eq!(s.simplify_type("BIGINT"), "number");
        assert_eq!(s.simplify_type("integer"), "number");
        assert_eq!(s.simplify_type("serial"), "number");
        assert_eq!(s.simplify_type("double precision"), "number");
        assert_eq!(s.simplify_type("numeric(10,2)"), "decimal");
        assert_eq!(s.simplify_type("VARCHAR(255)"), "text");
        assert_eq!(s.simplify_type("character varying(64)"), "text");
        assert_eq!(s.simplify_type("text"), "text");
        assert_eq!(s.simplify_type("boolean"), "boolean");
        assert_eq!(s.simplify_type("timestamp with time zone"), "timestamp");
        assert_eq!(s.simplify_type("DATE"), "date");
        assert_eq!(s.simplify_type("JSONB"), "json");
        assert_eq!(s.simplify_type("bytea"), "binary");
        assert_eq!(s.simplify_type("uuid"), "uuid");
        assert_eq!(s.simplify_type("integer[]"), "array");
        assert_eq!(s.simplify_type("_int4"), "array");
        // Unknown vendor types pass through untouched.
        assert_eq!(s.simplify_type("tsvector"), "tsvector");
    }
}
