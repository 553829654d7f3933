//! ClickHouse schema fetcher
//!
//! Reads `system.tables` and `system.columns` for the connection's current
//! database. ClickHouse has no secondary indexes or foreign keys in the
//! relational sense; the storage layout (engine, partition key, sort order)
//! travels in the table comment so the simplifier can surface it as
//! pseudo-constraints. When the stored comment is empty, one is synthesized
//! from the catalog columns.

use std::collections::HashMap;

use async_trait::async_trait;
use clickhouse::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::engine::checksum;
use crate::engine::error::{SchemaError, SchemaResult};
use crate::engine::traits::SchemaFetcher;
use crate::engine::types::{
    constraint_kind, engines, Column, Connection, Constraint, ExampleRecord, Schema, Table,
    TableSelection, View,
};
use crate::observability::Sampler;

use super::{ensure_live, log_partial};

#[derive(Debug, clickhouse::Row, Deserialize)]
struct TableRow {
    name: String,
    engine: String,
    comment: String,
    partition_key: String,
    sorting_key: String,
    total_rows: Option<u64>,
}

#[derive(Debug, clickhouse::Row, Deserialize)]
struct ColumnRow {
    name: String,
    column_type: String,
    default_expression: String,
    comment: String,
    is_in_primary_key: u8,
}

#[derive(Debug, clickhouse::Row, Deserialize)]
struct ViewRow {
    name: String,
    as_select: String,
}

/// ClickHouse fetcher implementation
pub struct ClickHouseFetcher {
    sampler: Sampler,
}

impl ClickHouseFetcher {
    pub fn new() -> Self {
        Self {
            sampler: Sampler::new(50),
        }
    }

    fn client<'a>(&self, conn: &'a Connection) -> SchemaResult<&'a Client> {
        match conn {
            Connection::ClickHouse(client) => Ok(client),
            _ => Err(SchemaError::catalog(
                self.engine(),
                "connection",
                "-",
                "connection handle is not a ClickHouse client",
            )),
        }
    }

    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "\\`"))
    }

    async fn list_tables(&self, client: &Client) -> SchemaResult<Vec<TableRow>> {
        client
            .query(
                "SELECT name, engine, comment, partition_key, sorting_key, total_rows \
                 FROM system.tables \
                 WHERE database = currentDatabase() AND NOT endsWith(engine, 'View') \
                 ORDER BY name",
            )
            .fetch_all::<TableRow>()
            .await
            .map_err(|e| SchemaError::catalog(self.engine(), "tables", "-", e.to_string()))
    }

    async fn fetch_columns(&self, client: &Client, table_name: &str) -> SchemaResult<Vec<ColumnRow>> {
        client
            .query(
                "SELECT name, type AS column_type, default_expression, comment, is_in_primary_key \
                 FROM system.columns \
                 WHERE database = currentDatabase() AND table = ? \
                 ORDER BY position",
            )
            .bind(table_name)
            .fetch_all::<ColumnRow>()
            .await
            .map_err(|e| SchemaError::catalog(self.engine(), "columns", table_name, e.to_string()))
    }

    /// Builds the normalized table from catalog rows. The storage layout
    /// comment is read verbatim; when empty it is synthesized from the
    /// engine/partition/sorting catalog columns.
    async fn build_table(&self, client: &Client, meta: &TableRow) -> SchemaResult<Table> {
        let mut table = Table::new(&meta.name);

        let comment = if meta.comment.trim().is_empty() {
            synthesize_comment(meta)
        } else {
            Some(meta.comment.clone())
        };
        table.comment = comment;

        let mut pk_columns = Vec::new();
        for row in self.fetch_columns(client, &meta.name).await? {
            if self.sampler.hit() {
                tracing::debug!(table = %meta.name, column = %row.name,
                    column_type = %row.column_type, "column");
            }
            if row.is_in_primary_key != 0 {
                pk_columns.push(row.name.clone());
            }
            table.column_order.push(row.name.clone());
            table.columns.insert(
                row.name.clone(),
                Column {
                    nullable: row.column_type.starts_with("Nullable("),
                    name: row.name,
                    data_type: row.column_type,
                    default_value: if row.default_expression.is_empty() {
                        None
                    } else {
                        Some(row.default_expression)
                    },
                    comment: if row.comment.is_empty() { None } else { Some(row.comment) },
                    auto_increment: false,
                },
            );
        }

        if !pk_columns.is_empty() {
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

    async fn fetch_row_count(
        &self,
        client: &Client,
        meta: &TableRow,
    ) -> SchemaResult<u64> {
        if let Some(total) = meta.total_rows {
            return Ok(total);
        }
        let sql = format!("SELECT count() FROM {}", Self::quote_ident(&meta.name));
        client
            .query(&sql)
            .fetch_one::<u64>()
            .await
            .map_err(|e| SchemaError::partial("row_count", &meta.name, e.to_string()))
    }

    async fn fetch_views(&self, client: &Client) -> SchemaResult<Vec<View>> {
        let rows = client
            .query(
                "SELECT name, as_select \
                 FROM system.tables \
                 WHERE database = currentDatabase() AND endsWith(engine, 'View') \
                 ORDER BY name",
            )
            .fetch_all::<ViewRow>()
            .await
            .map_err(|e| SchemaError::partial("views", "-", e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| View { name: row.name, definition: row.as_select })
            .collect())
    }

    async fn table_meta(&self, client: &Client, table: &str) -> SchemaResult<TableRow> {
        let mut rows = self.list_tables(client).await?;
        rows.retain(|r| r.name == table);
        rows.into_iter().next().ok_or_else(|| {
            SchemaError::catalog(self.engine(), "tables", table, "table not found in catalog")
        })
    }
}

/// Rebuilds the `engine=... partition by ... order by ...` comment from the
/// catalog when upstream ingestion did not store one.
fn synthesize_comment(meta: &TableRow) -> Option<String> {
    if meta.engine.is_empty() {
        return None;
    }
    let mut comment = format!("engine={}", meta.engine);
    if !meta.partition_key.is_empty() {
        comment.push_str(&format!(" partition by {}", meta.partition_key));
    }
    if !meta.sorting_key.is_empty() {
        comment.push_str(&format!(" order by {}", meta.sorting_key));
    }
    Some(comment)
}

impl Default for ClickHouseFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaFetcher for ClickHouseFetcher {
    fn engine(&self) -> &'static str {
        engines::CLICKHOUSE
    }

    async fn get_schema(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        selection: &TableSelection,
    ) -> SchemaResult<Schema> {
        let client = self.client(conn)?;
        ensure_live(ctx)?;

        let metas = self.list_tables(client).await?;
        let mut schema = Schema::new();

        for meta in &metas {
            ensure_live(ctx)?;
            if !selection.includes(&meta.name) {
                continue;
            }

            let mut table = self.build_table(client, meta).await?;

            ensure_live(ctx)?;
            match self.fetch_row_count(client, meta).await {
                Ok(count) => table.row_count = count,
                Err(e) => log_partial(self.engine(), &e),
            }

            schema.tables.insert(meta.name.clone(), table);
        }

        ensure_live(ctx)?;
        match self.fetch_views(client).await {
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
        let client = self.client(conn)?;
        ensure_live(ctx)?;
        let meta = self.table_meta(client, table).await?;
        let structure = self.build_table(client, &meta).await?;
        Ok(checksum::table_checksum(&structure))
    }

    async fn table_checksums(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
    ) -> SchemaResult<HashMap<String, String>> {
        let client = self.client(conn)?;
        ensure_live(ctx)?;

        let mut checksums = HashMap::new();
        for meta in self.list_tables(client).await? {
            ensure_live(ctx)?;
            let structure = self.build_table(client, &meta).await?;
            checksums.insert(meta.name, checksum::table_checksum(&structure));
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
        let client = self.client(conn)?;
        ensure_live(ctx)?;

        // One JSON object per row; this keeps the fetch schema-agnostic.
        let sql = format!(
            "SELECT formatRowNoNewline('JSONEachRow', *) FROM {} LIMIT {}",
            Self::quote_ident(table),
            limit,
        );
        let rows = client
            .query(&sql)
            .fetch_all::<String>()
            .await
            .map_err(|e| SchemaError::partial("example_records", table, e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<ExampleRecord>(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(SchemaError::partial("example_records", table, e.to_string()))
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(engine: &str, partition: &str, sorting: &str) -> TableRow {
        TableRow {
            name: "events".to_string(),
            engine: engine.to_string(),
            comment: String::new(),
            partition_key: partition.to_string(),
            sorting_key: sorting.to_string(),
            total_rows: None,
        }
    }

    #[test]
    fn synthesizes_the_layout_comment_from_catalog_fields() {
        let full = synthesize_comment(&meta("MergeTree", "toYYYYMM(ts)", "id, ts"));
        assert_eq!(
            full.as_deref(),
            Some("engine=MergeTree partition by toYYYYMM(ts) order by id, ts")
        );

        let bare = synthesize_comment(&meta("Log", "", ""));
        assert_eq!(bare.as_deref(), Some("engine=Log"));

        assert_eq!(synthesize_comment(&meta("", "", "")), None);
    }
}
