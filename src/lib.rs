// schemabot - multi-engine database schema introspection for AI assistants
// Core library

pub mod engine;
pub mod observability;

pub use engine::diff::{SchemaDiff, TableDiff};
pub use engine::error::{SchemaError, SchemaResult};
pub use engine::manager::SchemaManager;
pub use engine::snapshot::{MemorySnapshotStore, SnapshotStore};
pub use engine::traits::{SchemaFetcher, TypeSimplifier};
pub use engine::types::{
    Column, Connection, Schema, Snapshot, Table, TableSelection,
};
