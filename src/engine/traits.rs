//! SchemaFetcher and TypeSimplifier trait definitions
//!
//! These are the two per-engine extension points. A fetcher extracts the
//! normalized schema from a live connection; a simplifier collapses vendor
//! types into the canonical LLM ontology and derives constraint tags.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::error::SchemaResult;
use crate::engine::types::{Column, Connection, ExampleRecord, Schema, Table, TableSelection};

/// Per-engine schema extraction strategy
///
/// Implementations only issue parameter-bound read queries against the
/// provided connection and poll `ctx` between catalog queries: at every
/// table boundary and between sub-fetches. On cancellation they return the
/// cancellation cause without partial results.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    /// The engine tag this fetcher serves (e.g. "postgresql", "mysql")
    fn engine(&self) -> &'static str;

    /// Extracts the full normalized schema, restricted to `selection`.
    async fn get_schema(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        selection: &TableSelection,
    ) -> SchemaResult<Schema>;

    /// Structural checksum of one table, computed from the same canonical
    /// form `get_schema` uses so the two paths always agree.
    async fn table_checksum(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        table: &str,
    ) -> SchemaResult<String>;

    /// Structural checksums for every base table. This is the cheap pass
    /// behind change probing: no row counts, no views, no example rows.
    async fn table_checksums(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
    ) -> SchemaResult<HashMap<String, String>>;

    /// Up to `limit` example rows from one table, values coerced to JSON.
    /// Raw byte values become text when valid UTF-8, else "<binary:N bytes>".
    async fn example_records(
        &self,
        ctx: &CancellationToken,
        conn: &Connection,
        table: &str,
        limit: u32,
    ) -> SchemaResult<Vec<ExampleRecord>>;
}

/// Per-engine policy translating vendor type strings into the canonical
/// ontology and deriving per-column constraint annotations.
///
/// Canonical types (lowercase): number, text/string, boolean, timestamp,
/// date, decimal, json, binary, array, map, tuple, uuid, plus ObjectID and
/// Null for MongoDB and integer for ClickHouse. Unknown vendor types pass
/// through unchanged.
pub trait TypeSimplifier: Send + Sync {
    /// The engine tag this simplifier serves
    fn engine(&self) -> &'static str;

    /// Maps a vendor type string to its canonical type.
    fn simplify_type(&self, vendor_type: &str) -> String;

    /// Constraint tags for one column: NOT NULL, DEFAULT <expr>,
    /// PRIMARY KEY, UNIQUE, INDEXED, FOREIGN KEY REFERENCES <table>(<col>),
    /// AUTO_INCREMENT, and engine-specific annotations.
    fn column_constraints(&self, column: &Column, table: &Table) -> Vec<String>;
}
