//! PostgreSQL schema fetcher (also serves YugabyteDB)
//!
//! Extracts the normalized schema for the `public` namespace using SQLx.
//! Table and column enumeration are required paths; indexes, foreign keys,
//! constraints, row counts, views, sequences, and enums degrade to empty on
//! failure.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column as SqlxColumn, Row};
use tokio_util::sync::CancellationToken;

use crate::engine::checksum;
use crate::engine::error::{SchemaError, SchemaResult};
use crate::engine::traits::SchemaFetcher;
use crate::engine::types::{
    engines, Column, Connection, Constraint, EnumType, ExampleRecord, ForeignKey, Index, Schema,
    Sequence, Table, TableSelection, View,
};
use crate::observability::Sampler;

use super::{bytes_to_json, ensure_live, log_partial};

const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL fetcher implementation
pub struct PostgresFetcher {
    sampler: Sampler,
}

impl PostgresFetcher {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(50),
        }
    }

    fn pool<'a>(&self, conn: &'a Connection) -> SchemaResult<&'a PgPool> {
        match conn {
            Connection::Postgres(pool) => Ok(pool),
            _ => Err(SchemaError::catalog(
                self.engine(),
                "connection",
                "-",
                "connection handle is not a PostgreSQL pool",
            )),
        }
    }

    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    async fn list_tables(&self, pool: &PgPool) -> SchemaResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT tablename::text
            FROM pg_catalog.pg_tables
            WHERE schemaname = $1
            ORDER BY tablename
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::catalog(self.engine(), "tables", "-", e.to_string()))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Columns, indexes, foreign keys, and constraints for one table.
    /// Shared by the full fetch and both checksum paths so the digests
    /// always agree.
    async fn fetch_table_structure(&self, pool: &PgPool, table_name: &str) -> SchemaResult<Table> {
        let mut table = Table::new(table_name);

        let column_rows: Vec<(String, String, String, Option<String>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.is_nullable::text,
                    c.column_default::text,
                    d.description::text
                FROM information_schema.columns c
                JOIN pg_catalog.pg_class cls ON cls.relname = c.table_name
                JOIN pg_catalog.pg_namespace ns
                  ON ns.oid = cls.relnamespace AND ns.nspname = c.table_schema
                LEFT JOIN pg_catalog.pg_description d
                  ON d.objoid = cls.oid AND d.objsubid = c.ordinal_position
                WHERE c.table_schema = $1 AND c.table_name = $2
                ORDER BY c.ordinal_position
                "#,
            )
            .bind(DEFAULT_SCHEMA)
            .bind(table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                SchemaError::catalog(self.engine(), "columns", table_name, e.to_string())
            })?;

        for (name, data_type, is_nullable, default_value, comment) in column_rows {
            if self.sampler.hit() {
                tracing::debug!(table = table_name, column = %name, %data_type, "column");
            }
            table.column_order.push(name.clone());
            table.columns.insert(
                name.clone(),
                Column {
                    name,
                    data_type,
                    nullable: is_nullable == "YES",
                    default_value,
                    comment,
                    auto_increment: false,
                },
            );
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

        Ok(table)
    }

    async fn fetch_indexes(
        &self,
        pool: &PgPool,
        table_name: &str,
    ) -> SchemaResult<HashMap<String, Index>> {
        let rows: Vec<(String, Vec<String>, bool)> = sqlx::query_as(
            r#"
            SELECT i.relname AS index_name,
                   array_agg(a.attname ORDER BY x.ordinality)::text[] AS columns,
                   ix.indisunique AS is_unique
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS x(attnum, ordinality)
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = x.attnum
            WHERE n.nspname = $1 AND t.relname = $2
            GROUP BY i.relname, ix.indisunique
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("indexes", table_name, e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, columns, unique)| {
                (name.clone(), Index { name, columns, unique })
            })
            .collect())
    }

    async fn fetch_foreign_keys(
        &self,
        pool: &PgPool,
        table_name: &str,
    ) -> SchemaResult<HashMap<String, ForeignKey>> {
        let rows: Vec<(String, String, String, String, Option<String>, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT
                    tc.constraint_name::text,
                    kcu.column_name::text,
                    ccu.table_name::text AS foreign_table_name,
                    ccu.column_name::text AS foreign_column_name,
                    rc.delete_rule::text,
                    rc.update_rule::text
                FROM information_schema.table_constraints AS tc
                JOIN information_schema.key_column_usage AS kcu
                  ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage AS ccu
                  ON ccu.constraint_name = tc.constraint_name
                  AND ccu.table_schema = tc.table_schema
                JOIN information_schema.referential_constraints AS rc
                  ON rc.constraint_name = tc.constraint_name
                  AND rc.constraint_schema = tc.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                  AND tc.table_schema = $1
                  AND tc.table_name = $2
                "#,
            )
            .bind(DEFAULT_SCHEMA)
            .bind(table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| SchemaError::partial("foreign_keys", table_name, e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(
                |(name, column, referenced_table, referenced_column, on_delete, on_update)| {
                    (
                        name.clone(),
                        ForeignKey {
                            name,
                            column,
                            referenced_table,
                            referenced_column,
                            on_delete,
                            on_update,
                        },
                    )
                },
            )
            .collect())
    }

    async fn fetch_constraints(
        &self,
        pool: &PgPool,
        table_name: &str,
    ) -> SchemaResult<HashMap<String, Constraint>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                tc.constraint_type::text,
                kcu.column_name::text
            FROM information_schema.table_constraints tc
            LEFT JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name
              AND kcu.table_schema = tc.table_schema
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE', 'CHECK')
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("constraints", table_name, e.to_string()))?;

        let mut constraints: HashMap<String, Constraint> = HashMap::new();
        for (name, kind, column) in rows {
            // The catalog emits one synthesized NOT NULL check per column;
            // those are column attributes, not table constraints.
            if kind == "CHECK" && name.ends_with("_not_null") {
                continue;
            }
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

        let checks: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT cc.constraint_name::text, cc.check_clause::text
            FROM information_schema.check_constraints cc
            JOIN information_schema.table_constraints tc
              ON tc.constraint_name = cc.constraint_name
              AND tc.constraint_schema = cc.constraint_schema
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'CHECK'
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .bind(table_name)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("check_definitions", table_name, e.to_string()))?;

        for (name, clause) in checks {
            if let Some(constraint) = constraints.get_mut(&name) {
                constraint.definition = Some(clause);
            }
        }

        Ok(constraints)
    }

    async fn fetch_row_count(&self, pool: &PgPool, table_name: &str) -> SchemaResult<u64> {
        let count_sql = format!(
            "SELECT COUNT(*)::bigint FROM {}.{}",
            Self::quote_ident(DEFAULT_SCHEMA),
            Self::quote_ident(table_name),
        );
        match sqlx::query_scalar::<_, i64>(&count_sql).fetch_one(pool).await {
            Ok(count) => Ok(count.max(0) as u64),
            Err(count_err) => {
                // Approximate fallback from planner statistics.
                let estimate: Option<(f64,)> = sqlx::query_as(
                    r#"
                    SELECT c.reltuples::double precision
                    FROM pg_class c
                    JOIN pg_namespace n ON n.oid = c.relnamespace
                    WHERE n.nspname = $1 AND c.relname = $2
                    "#,
                )
                .bind(DEFAULT_SCHEMA)
                .bind(table_name)
                .fetch_optional(pool)
                .await
                .map_err(|_| {
                    SchemaError::partial("row_count", table_name, count_err.to_string())
                })?;

                match estimate {
                    Some((reltuples,)) if reltuples >= 0.0 => Ok(reltuples.floor() as u64),
                    _ => Err(SchemaError::partial(
                        "row_count",
                        table_name,
                        count_err.to_string(),
                    )),
                }
            }
        }
    }

    async fn fetch_views(&self, pool: &PgPool) -> SchemaResult<Vec<View>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT viewname::text, definition::text
            FROM pg_catalog.pg_views
            WHERE schemaname = $1
            ORDER BY viewname
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("views", "-", e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, definition)| View { name, definition })
            .collect())
    }

    async fn fetch_sequences(&self, pool: &PgPool) -> SchemaResult<Vec<Sequence>> {
        let rows: Vec<(String, Option<String>, Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT sequencename::text, data_type::text, start_value, increment_by
            FROM pg_catalog.pg_sequences
            WHERE schemaname = $1
            ORDER BY sequencename
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("sequences", "-", e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, start_value, increment)| Sequence {
                name,
                data_type,
                start_value,
                increment,
            })
            .collect())
    }

    async fn fetch_enums(&self, pool: &PgPool) -> SchemaResult<Vec<EnumType>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT t.typname::text, e.enumlabel::text
            FROM pg_type t
            JOIN pg_enum e ON e.enumtypid = t.oid
            JOIN pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = $1
            ORDER BY t.typname, e.enumsortorder
            "#,
        )
        .bind(DEFAULT_SCHEMA)
        .fetch_all(pool)
        .await
        .map_err(|e| SchemaError::partial("enums", "-", e.to_string()))?;

        let mut enums: Vec<EnumType> = Vec::new();
        for (name, label) in rows {
            match enums.last_mut() {
                Some(last) if last.name == name => last.values.push(label),
                _ => enums.push(EnumType { name, values: vec![label] }),
            }
        }
        Ok(enums)
    }
}

impl Default for PostgresFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaFetcher for PostgresFetcher {
    fn engine(&self) -> &'static str {
        engines::POSTGRESQL
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
        ensure_live(ctx)?;
        match self.fetch_sequences(pool).await {
            Ok(sequences) => schema.sequences = sequences,
            Err(e) => log_partial(self.engine(), &e),
        }
        ensure_live(ctx)?;
        match self.fetch_enums(pool).await {
            Ok(enums) => schema.enums = enums,
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
            "SELECT * FROM {}.{} LIMIT {}",
            Self::quote_ident(DEFAULT_SCHEMA),
            Self::quote_ident(table),
            limit,
        );
        let rows: Vec<PgRow> = sqlx::query(&sql)
            .fetch_all(pool)
            .await
            .map_err(|e| SchemaError::partial("example_records", table, e.to_string()))?;

        Ok(rows.iter().map(row_to_record).collect())
    }
}

fn row_to_record(row: &PgRow) -> ExampleRecord {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), value_at(row, col.ordinal())))
        .collect()
}

/// Extracts one cell as JSON, walking the decodings from most to least
/// specific the way the teacher drivers do.
fn value_at(row: &PgRow, idx: usize) -> serde_json::Value {
    use serde_json::{json, Value};

    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| json!(i)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
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
    if let Ok(v) = row.try_get::<Option<bigdecimal::BigDecimal>, _>(idx) {
        return v.map(|d| json!(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
        return v.map(|d| json!(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return v.map(|u| json!(u.to_string())).unwrap_or(Value::Null);
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
