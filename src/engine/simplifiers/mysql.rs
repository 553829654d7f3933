//! MySQL / MariaDB type simplifier

use crate::engine::traits::TypeSimplifier;
use crate::engine::types::{Column, Table};

use super::base_constraints;

pub struct MySqlSimplifier;

impl TypeSimplifier for MySqlSimplifier {
    fn engine(&self) -> &'static str {
        "mysql"
    }

    fn simplify_type(&self, vendor_type: &str) -> String {
        let t = vendor_type.trim().to_lowercase();

        // tinyint(1) is the conventional boolean.
        if t.starts_with("tinyint(1)") || t.starts_with("bool") {
            return "boolean".to_string();
        }
        if t.starts_with("decimal") || t.starts_with("numeric") {
            return "decimal".to_string();
        }
        if t.starts_with("tinyint")
            || t.starts_with("smallint")
            || t.starts_with("mediumint")
            || t.starts_with("bigint")
            || t.starts_with("int")
            || t.starts_with("float")
            || t.starts_with("double")
            || t.starts_with("year")
        {
            return "number".to_string();
        }
        if t.starts_with("datetime") || t.starts_with("timestamp") {
            return "timestamp".to_string();
        }
        if t == "date" {
            return "date".to_string();
        }
        if t == "json" {
            return "json".to_string();
        }
        if t.contains("blob") || t.starts_with("binary") || t.starts_with("varbinary") {
            return "binary".to_string();
        }
        if t.starts_with("varchar")
            || t.starts_with("char")
            || t.contains("text")
            || t.starts_with("enum")
            || t.starts_with("set")
        {
            return "string".to_string();
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
    use crate::engine::types::Constraint;

    #[test]
    fn vendor_type_matrix() {
        let s = MySqlSimplifier;
        assert_eq!(s.simplify_type("BIGINT"), "number");
        assert_eq!(s.simplify_type("int(11)"), "number");
        assert_eq!(s.simplify_type("tinyint(1)"), "boolean");
        assert_eq!(s.simplify_type("tinyint(4)"), "number");
        assert_eq!(s.simplify_type("decimal(10,2)"), "decimal");
        assert_eq!(s.simplify_type("VARCHAR(255)"), "string");
        assert_eq!(s.simplify_type("longtext"), "string");
        assert_eq!(s.simplify_type("enum('a','b')"), "string");
        assert_eq!(s.simplify_type("datetime"), "timestamp");
        assert_eq!(s.simplify_type("DATE"), "date");
        assert_eq!(s.simplify_type("json"), "json");
        assert_eq!(s.simplify_type("mediumblob"), "binary");
        assert_eq!(s.simplify_type("geometry"), "geometry");
    }

    #[test]
    fn auto_increment_column_is_tagged() {
        let mut table = Table::new("users");
        let column = Column {
            name: "id".to_string(),
            data_type: "bigint".to_string(),
            nullable: false,
            auto_increment: true,
            ..Default::default()
        };
        table.columns.insert("id".to_string(), column.clone());
        table.constraints.insert(
            "PRIMARY".to_string(),
            Constraint {
                name: "PRIMARY".to_string(),
                kind: "PRIMARY KEY".to_string(),
                definition: None,
                columns: vec!["id".to_string()],
            },
        );

        let tags = MySqlSimplifier.column_constraints(&column, &table);
        assert_eq!(
            tags,
            vec![
                "NOT NULL".to_string(),
                "PRIMARY KEY".to_string(),
                "AUTO_INCREMENT".to_string()
            ]
        );
    }
}
