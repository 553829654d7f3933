//! Universal data types for the schema engine
//!
//! These types provide a normalized representation of database structure
//! across SQL and NoSQL engines. Every engine-specific fetcher projects its
//! native catalog into this model; everything downstream (checksums, diffs,
//! snapshots, rendering) is engine-agnostic.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine tags accepted by the manager registries.
pub mod engines {
    pub const POSTGRESQL: &str = "postgresql";
    /// YugabyteDB speaks the PostgreSQL catalog; it shares the fetcher.
    pub const YUGABYTEDB: &str = "yugabytedb";
    pub const MYSQL: &str = "mysql";
    pub const CLICKHOUSE: &str = "clickhouse";
    pub const MONGODB: &str = "mongodb";
}

/// Which tables a fetch should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelection {
    /// Every base table in the default namespace.
    All,
    /// Only the named tables (exact, case-sensitive match).
    Only(Vec<String>),
}

impl TableSelection {
    pub fn includes(&self, table: &str) -> bool {
        match self {
            TableSelection::All => true,
            TableSelection::Only(names) => names.iter().any(|n| n == table),
        }
    }
}

/// Opaque connection handle handed to fetchers. Lifecycle, pooling, and TLS
/// belong to the caller; the engine only issues read queries against it.
pub enum Connection {
    Postgres(sqlx::PgPool),
    MySql(sqlx::MySqlPool),
    ClickHouse(clickhouse::Client),
    Mongo(MongoConnection),
}

/// MongoDB connection plus the field metadata produced by the caller's
/// sampling/inference pass. The fetcher treats inferred types as given.
pub struct MongoConnection {
    pub client: mongodb::Client,
    pub database: String,
    pub inferred_fields: HashMap<String, Vec<InferredField>>,
}

/// One field of a MongoDB collection as inferred from sampled documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferredField {
    pub name: String,
    pub bson_type: String,
    pub nullable: bool,
}

/// Column metadata, vendor type preserved verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// MySQL EXTRA auto_increment marker; consumed by the simplifier.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_increment: bool,
}

/// Index definition. Column order is significant for compound indexes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Foreign key definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForeignKey {
    pub name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

/// Table constraint. `kind` is the vendor's label ("PRIMARY KEY", "UNIQUE",
/// "CHECK", ...); `definition` carries the CHECK expression when present;
/// `columns` is ordered for key constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

pub mod constraint_kind {
    pub const PRIMARY_KEY: &str = "PRIMARY KEY";
    pub const UNIQUE: &str = "UNIQUE";
    pub const CHECK: &str = "CHECK";
}

/// View definition text as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct View {
    pub name: String,
    pub definition: String,
}

/// Sequence metadata (PostgreSQL-family).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sequence {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<i64>,
}

/// Enum type metadata (PostgreSQL-family).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// Normalized table. Maps are keyed by object name; consumers that need
/// determinism sort explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub columns: HashMap<String, Column>,
    /// Column names in ordinal position order, rebuilt on every fetch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_order: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub indexes: HashMap<String, Index>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub foreign_keys: HashMap<String, ForeignKey>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub constraints: HashMap<String, Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// May be approximate (catalog statistics fallback).
    pub row_count: u64,
    pub checksum: String,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// First column in ordinal order, if known.
    pub fn first_column(&self) -> Option<&str> {
        self.column_order.first().map(|s| s.as_str())
    }

    /// Comma-joined columns of the first PRIMARY KEY constraint (by name
    /// order); empty when the table has none.
    pub fn primary_key(&self) -> String {
        let mut pks: Vec<&Constraint> = self
            .constraints
            .values()
            .filter(|c| c.kind == constraint_kind::PRIMARY_KEY)
            .collect();
        pks.sort_by(|a, b| a.name.cmp(&b.name));
        pks.first()
            .map(|c| c.columns.join(","))
            .unwrap_or_default()
    }
}

/// Normalized schema for one database/namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub tables: HashMap<String, Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<Sequence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumType>,
    pub updated_at: DateTime<Utc>,
    pub checksum: String,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            views: Vec::new(),
            sequences: Vec::new(),
            enums: Vec::new(),
            updated_at: Utc::now(),
            checksum: String::new(),
        }
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

/// One example row: column name -> JSON value. Sorted keys keep the
/// renderer's fallback iteration deterministic.
pub type ExampleRecord = BTreeMap<String, serde_json::Value>;

/// Cross-table relationship inferred from a foreign key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Lossy, render-friendly column projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmColumn {
    /// Canonical type from the engine's simplifier.
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nullable: bool,
    pub indexed: bool,
    /// Constraint tags from the engine's simplifier (NOT NULL, PRIMARY KEY,
    /// engine-specific annotations, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

/// Lossy, render-friendly table projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: HashMap<String, LlmColumn>,
    /// Comma-joined primary key columns; empty when none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub primary_key: String,
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub example_records: Vec<ExampleRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

/// Lossy projection of a full schema for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LlmSchema {
    pub tables: HashMap<String, LlmTable>,
}

/// The persisted unit: one snapshot per session key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub full_schema: Schema,
    pub llm_schema: LlmSchema,
    pub table_checksums: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}
