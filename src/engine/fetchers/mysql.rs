//! MySQL / MariaDB schema fetcher
//!
//! Primary path is information_schema for the connection's default database
//! (`DATABASE()`); every enumeration falls back to `SHOW`/`DESCRIBE` when
//! the catalog views are restricted. As a last resort, columns are
//! synthesized from one SELECTed row so a fetch never fails outright just
//! because the catalog is locked down. Text columns are `CAST(... AS CHAR)`
//! to avoid BINARY type mismatches with Rust strings.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column as SqlxColumn, Row};
use tokio_util::sync::CancellationToken;

use crate::engine::checksum;
use crate::engine::error::{SchemaError, SchemaResult};
use crate::engine::traits::SchemaFetcher;
use crate::engine::types::{
    constraint_kind, engines, Column, Connection, Constraint, ExampleRecord, ForeignKey, Index,
    Schema, Table, TableSelection, View,
};
use crate::observability::Sampler;

use super::{bytes_to_json, ensure_live, log_partial};

/// MySQL fetcher implementation
pub struct MySqlFetcher {
    sampler: Sampler,
}

impl MySqlFetcher {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(50),
        }
    }

    fn pool<'a>(&self, conn: &'a Connection) -> SchemaResult<&'a MySqlPool> {
        match conn {
            Connection::MySql(pool) => Ok(pool),
            _ => Err(SchemaError::catalog(
                self.engine(),
                "connection",
                "-",
                "connection handle is not a MySQL pool",
            )),
        }
    }

    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    async fn list_tables(&self, pool: &MySqlPool) -> SchemaResult<Vec<String>> {
        let primary: Result<Vec<(String,)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS table_name
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .fetch_all(pool)
        .await;

        match primary {
            Ok(rows) if !rows.is_empty() => Ok(rows.into_iter().map(|(n,)| n).collect()),
            other => {
                if let Err(e) = &other {
                    tracing::warn!(engine = self.engine(), error = %e,
                        "information_schema.TABLES unavailable, falling back to SHOW TABLES");
                }
                let rows: Vec<MySqlRow> = sqlx::query("SHOW TABLES")
                    .fetch_all(pool)
                    .await
                    .map_err(|e| {
                        SchemaError::catalog(self.engine(), "tables", "-", e.to_string())
                    })?;
                Ok(rows
                    .iter()
                    .filter_map(|row| text_at(row, 0))
                    .collect())
            }
        }
    }

    /// Columns in ordinal order plus primary key column names. Falls back
    /// from information_schema to DESCRIBE, then to a synthesized column
    /// set from one SELECTed row.
    async fn fetch_columns(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<(Vec<Column>, Vec<String>)> {
        type ColumnRow = (String, String, String, Option<String>, String, String, String);
        let primary: Result<Vec<ColumnRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT
                CAST(c.COLUMN_NAME AS CHAR) AS column_name,
                CAST(c.COLUMN_TYPE AS CHAR) AS column_type,
                CAST(c.IS_NULLABLE AS CHAR) AS is_nullable,
                CAST(c.COLUMN_DEFAULT AS CHAR) AS column_default,
                CAST(c.COLUMN_COMMENT AS CHAR) AS column_comment,
                CAST(c.EXTRA AS CHAR) AS extra,
                CAST(c.COLUMN_KEY AS CHAR) AS column_key
            FROM information_schema.COLUMNS c
            WHERE c.TABLE_SCHEMA = DATABASE() AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
            "#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await;

        match primary {
            Ok(rows) if !rows.is_empty() => {
                let mut columns = Vec::with_capacity(rows.len());
                let mut pk = Vec::new();
                for (name, column_type, is_nullable, default_value, comment, extra, key) in rows {
                    if key == "PRI" {
                        pk.push(name.clone());
                    }
                    if self.sampler.hit() {
                        tracing::debug!(table = table_name, column = %name, %column_type, "column");
                    }
                    columns.push(Column {
                        name,
                        data_type: column_type,
                        nullable: is_nullable == "YES",
                        default_value,
                        comment: if comment.is_empty() { None } else { Some(comment) },
                        auto_increment: extra.to_lowercase().contains("auto_increment"),
                    });
                }
                Ok((columns, pk))
            }
            other => {
                if let Err(e) = &other {
                    tracing::warn!(engine = self.engine(), table = table_name, error = %e,
                        "information_schema.COLUMNS unavailable, falling back to DESCRIBE");
                }
                self.describe_columns(pool, table_name).await
            }
        }
    }

    async fn describe_columns(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<(Vec<Column>, Vec<String>)> {
        let describe_sql = format!("DESCRIBE {}", Self::quote_ident(table_name));
        match sqlx::query(&describe_sql).fetch_all(pool).await {
            Ok(rows) if !rows.is_empty() => {
                let mut columns = Vec::with_capacity(rows.len());
                let mut pk = Vec::new();
                for row in &rows {
                    let name = match text_field(row, "Field") {
                        Some(name) => name,
                        None => continue,
                    };
                    let data_type = text_field(row, "Type").unwrap_or_default();
                    let nullable = text_field(row, "Null").as_deref() == Some("YES");
                    let key = text_field(row, "Key").unwrap_or_default();
                    let extra = text_field(row, "Extra").unwrap_or_default();
                    if key == "PRI" {
                        pk.push(name.clone());
                    }
                    columns.push(Column {
                        name,
                        data_type,
                        nullable,
                        default_value: text_field(row, "Default"),
                        comment: None,
                        auto_increment: extra.to_lowercase().contains("auto_increment"),
                    });
                }
                Ok((columns, pk))
            }
            other => {
                if let Err(e) = &other {
                    tracing::warn!(engine = self.engine(), table = table_name, error = %e,
                        "DESCRIBE unavailable, synthesizing columns from one row");
                }
                self.synthesize_columns(pool, table_name).await
            }
        }
    }

    /// Degraded path: derive column names from a single row and assume
    /// nullable varchar for everything.
    async fn synthesize_columns(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<(Vec<Column>, Vec<String>)> {
        let sql = format!("SELECT * FROM {} LIMIT 1", Self::quote_ident(table_name));
        let row = sqlx::query(&sql)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                SchemaError::catalog(self.engine(), "columns", table_name, e.to_string())
            })?
            .ok_or_else(|| {
                SchemaError::catalog(
                    self.engine(),
                    "columns",
                    table_name,
                    "no catalog access and no rows to derive columns from",
                )
            })?;

        tracing::warn!(engine = self.engine(), table = table_name,
            "degraded column synthesis: types assumed varchar");

        let columns = row
            .columns()
            .iter()
            .map(|col| Column {
                name: col.name().to_string(),
                data_type: "varchar".to_string(),
                nullable: true,
                default_value: None,
                comment: None,
                auto_increment: false,
            })
            .collect();
        Ok((columns, Vec::new()))
    }

    async fn fetch_table_structure(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<Table> {
        let mut table = Table::new(table_name);

        let (columns, pk_columns) = self.fetch_columns(pool, table_name).await?;
        for column in columns {
            table.column_order.push(column.name.clone());
            table.columns.insert(column.name.clone(), column);
        }

        match self.fetch_indexes(pool, table_name).await {
            Ok(indexes) => table.indexes = indexes,
            Err(e) => log_partial(self.engine(), &e),
        }
        match self.fetch_foreign_keys(pool, table_name).await {
            Ok(fks) => table.foreign_keys = fks,
            Err(e) => log_partial(self.engine(), &e),
        }
        match self.fetch_constraints(pool, table_name).await {
            Ok(constraints) => table.constraints = constraints,
            Err(e) => log_partial(self.engine(), &e),
        }

        // The catalog constraint pass can be restricted too; the column
        // flags still know the primary key.
        let has_pk = table
            .constraints
            .values()
            .any(|c| c.kind == constraint_kind::PRIMARY_KEY);
        if !has_pk && !pk_columns.is_empty() {
            table.constraints.insert(
                "PRIMARY".to_string(),
                Constraint {
                    name: "PRIMARY".to_string(),
                    kind: constraint_kind::PRIMARY_KEY.to_string(),
                    definition: None,
                    columns: pk_columns,
                },
            );
        }

        Ok(table)
    }

    async fn fetch_indexes(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<HashMap<String, Index>> {
        let primary: Result<Vec<(String, String, i64)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT
                CAST(INDEX_NAME AS CHAR) AS index_name,
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(NON_UNIQUE AS SIGNED) AS non_unique
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
            "#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await;

        let rows: Vec<(String, String, i64)> = match primary {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(engine = self.engine(), table = table_name, error = %e,
                    "information_schema.STATISTICS unavailable, falling back to SHOW INDEX");
                let show_sql = format!("SHOW INDEX FROM {}", Self::quote_ident(table_name));
                let raw = sqlx::query(&show_sql)
                    .fetch_all(pool)
                    .await
                    .map_err(|e| SchemaError::partial("indexes", table_name, e.to_string()))?;
                raw.iter()
                    .filter_map(|row| {
                        Some((
                            text_field(row, "Key_name")?,
                            text_field(row, "Column_name")?,
                            int_field(row, "Non_unique").unwrap_or(1),
                        ))
                    })
                    .collect()
            }
        };

        let mut indexes: HashMap<String, Index> = HashMap::new();
        for (name, column, non_unique) in rows {
            let entry = indexes.entry(name.clone()).or_insert_with(|| Index {
                name,
                columns: Vec::new(),
                unique: non_unique == 0,
            });
            entry.columns.push(column);
        }
        Ok(indexes)
    }

    async fn fetch_foreign_keys(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<HashMap<String, ForeignKey>> {
        let rows: Vec<(String, String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                CAST(kcu.CONSTRAINT_NAME AS CHAR) AS constraint_name,
                CAST(kcu.COLUMN_NAME AS CHAR) AS column_name,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column,
                CAST(rc.DELETE_RULE AS CHAR) AS delete_rule,
                CAST(rc.UPDATE_RULE AS CHAR) AS update_rule
            FROM information_schema.KEY_COLUMN_USAGE kcu
            JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
              ON rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
              AND rc.CONSTRAINT_SCHEMA = kcu.TABLE_SCHEMA
            WHERE kcu.TABLE_SCHEMA = DATABASE()
              AND kcu.TABLE_NAME = ?
              AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
            "#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("foreign_keys", table_name, e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(name, column, referenced_table, referenced_column, delete_rule, update_rule)| {
                    (
                        name.clone(),
                        ForeignKey {
                            name,
                            column,
                            referenced_table,
                            referenced_column,
                            on_delete: Some(delete_rule),
                            on_update: Some(update_rule),
                        },
                    )
                },
            )
            .collect())
    }

    async fn fetch_constraints(
        &self,
        pool: &MySqlPool,
        table_name: &str,
    ) -> SchemaResult<HashMap<String, Constraint>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                CAST(tc.CONSTRAINT_NAME AS CHAR) AS constraint_name,
                CAST(tc.CONSTRAINT_TYPE AS CHAR) AS constraint_type,
                CAST(kcu.COLUMN_NAME AS CHAR) AS column_name
            FROM information_schema.TABLE_CONSTRAINTS tc
            LEFT JOIN information_schema.KEY_COLUMN_USAGE kcu
              ON kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
              AND kcu.TABLE_SCHEMA = tc.TABLE_SCHEMA
              AND kcu.TABLE_NAME = tc.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = DATABASE()
              AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE', 'CHECK')
            ORDER BY tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
            "#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("constraints", table_name, e.to_string()))?;

        let mut constraints: HashMap<String, Constraint> = HashMap::new();
        for (name, kind, column) in rows {
            let entry = constraints.entry(name.clone()).or_insert_with(|| Constraint {
                name,
                kind,
                definition: None,
                columns: Vec::new(),
            });
            if let Some(column) = column {
                entry.columns.push(column);
            }
        }

        // CHECK bodies only exist on MySQL 8+; older servers just skip this.
        let checks: Result<Vec<(String, String)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT
                CAST(cc.CONSTRAINT_NAME AS CHAR) AS constraint_name,
                CAST(cc.CHECK_CLAUSE AS CHAR) AS check_clause
            FROM information_schema.CHECK_CONSTRAINTS cc
            JOIN information_schema.TABLE_CONSTRAINTS tc
              ON tc.CONSTRAINT_NAME = cc.CONSTRAINT_NAME
              AND tc.CONSTRAINT_SCHEMA = cc.CONSTRAINT_SCHEMA
            WHERE tc.TABLE_SCHEMA = DATABASE() AND tc.TABLE_NAME = ?
            "#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await;

        if let Ok(checks) = checks {
            for (name, clause) in checks {
                if let Some(constraint) = constraints.get_mut(&name) {
                    constraint.definition = Some(clause);
                }
            }
        }

        Ok(constraints)
    }

    async fn fetch_row_count(&self, pool: &MySqlPool, table_name: &str) -> SchemaResult<u64> {
        let count_sql = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table_name));
        match sqlx::query_scalar::<_, i64>(&count_sql).fetch_one(pool).await {
            Ok(count) => Ok(count.max(0) as u64),
            Err(count_err) => {
                let estimate: Option<(u64,)> = sqlx::query_as(
                    r#"
                    SELECT CAST(TABLE_ROWS AS UNSIGNED)
                    FROM information_schema.TABLES
                    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
                    "#,
                )
                .bind(table_name)
                .fetch_optional(pool)
                .await
                .map_err(|_| {
                    SchemaError::partial("row_count", table_name, count_err.to_string())
                })?;

                estimate.map(|(rows,)| rows).ok_or_else(|| {
                    SchemaError::partial("row_count", table_name, count_err.to_string())
                })
            }
        }
    }

    async fn fetch_views(&self, pool: &MySqlPool) -> SchemaResult<Vec<View>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT
                CAST(TABLE_NAME AS CHAR) AS view_name,
                CAST(VIEW_DEFINITION AS CHAR) AS view_definition
            FROM information_schema.VIEWS
            WHERE TABLE_SCHEMA = DATABASE()
            ORDER BY TABLE_NAME
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("views", "-", e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, definition)| View { name, definition })
            .collect())
    }
}

impl Default for MySqlFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaFetcher for MySqlFetcher {
    fn engine(&self) -> &'static str {
        engines::MYSQL
    }

    async fn get_schema(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        selection: &TableSelection,
    ) -> SchemaResult<Schema> {
        let pool = self.pool(conn)?;
        ensure_live(ctx)?;

        let table_names = self.list_tables(pool).await?;
        let mut schema = Schema::new();

        for name in table_names {
            ensure_live(ctx)?;
            if !selection.includes(&name) {
                continue;
            }

            let mut table = self.fetch_table_structure(pool, &name).await?;

            ensure_live(ctx)?;
            match self.fetch_row_count(pool, &name).await {
                Ok(count) => table.row_count = count,
                Err(e) => log_partial(self.engine(), &e),
            }

            schema.tables.insert(name, table);
        }

        ensure_live(ctx)?;
        match self.fetch_views(pool).await {
            Ok(views) => schema.views = views,
            Err(e) => log_partial(self.engine(), &e),
        }

        checksum::seal(&mut schema);
        Ok(schema)
    }

    async fn table_checksum(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        table: &str,
    ) -> SchemaResult<String> {
        let pool = self.pool(conn)?;
        ensure_live(ctx)?;
        let structure = self.fetch_table_structure(pool, table).await?;
        Ok(checksum::table_checksum(&structure))
    }

    async fn table_checksums(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
    ) -> SchemaResult<HashMap<String, String>> {
        let pool = self.pool(conn)?;
        ensure_live(ctx)?;

        let mut checksums = HashMap::new();
        for name in self.list_tables(pool).await? {
            ensure_live(ctx)?;
            let structure = self.fetch_table_structure(pool, &name).await?;
            checksums.insert(name, checksum::table_checksum(&structure));
        }
        Ok(checksums)
    }

    async fn example_records(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        table: &str,
        limit: u32,
    ) -> SchemaResult<Vec<ExampleRecord>> {
        let pool = self.pool(conn)?;
        ensure_live(ctx)?;

        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            Self::quote_ident(table),
            limit,
        );
        let rows: Vec<MySqlRow> = sqlx::query(&sql)
            .fetch_all(pool)
            .await
            .map_err(|e| SchemaError::partial("example_records", table, e.to_string()))?;

        Ok(rows.iter().map(row_to_record).collect())
    }
}

fn row_to_record(row: &MySqlRow) -> ExampleRecord {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), value_at(row, col.ordinal())))
        .collect()
}

fn value_at(row: &MySqlRow, idx: usize) -> serde_json::Value {
    use serde_json::{json, Value};

    // u64 first for BIGINT UNSIGNED columns.
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(|u| json!(u)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
        return v.map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(|b| json!(b)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(|f| json!(f)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| json!(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
        return v.map(|d| json!(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bigdecimal::BigDecimal>, _>(idx) {
        return v.map(|d| json!(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(|s| json!(s)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| json!(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| json!(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| json!(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(bytes_to_json).unwrap_or(Value::Null);
    }

    Value::Null
}

/// Reads a text column that MySQL may report as BINARY.
fn text_field(row: &MySqlRow, name: &str) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(name) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(name) {
        return v.map(|bytes| String::from_utf8_lossy(&bytes).to_string());
    }
    None
}

fn text_at(row: &MySqlRow, idx: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(|bytes| String::from_utf8_lossy(&bytes).to_string());
    }
    None
}

fn int_field(row: &MySqlRow, name: &str) -> Option<i64> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(name) {
        return v.map(|i| i as i64);
    }
    text_field(row, name).and_then(|s| s.parse().ok())
}
