// SPDX-License-Identifier: Apache-2.0

//! Snapshot persistence
//!
//! One snapshot per session key, stored in an external KV under
//! `schema:<session_id>` with a 7-day TTL. The wire format is
//! zlib-compressed UTF-8 JSON. The store itself is an external collaborator
//! behind [`SnapshotStore`]; a missing key surfaces as the typed
//! [`SchemaError::SnapshotAbsent`] sentinel, which callers treat as
//! first-time, never as failure.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tokio::sync::RwLock;

use crate::engine::error::{SchemaError, SchemaResult};
use crate::engine::types::Snapshot;

/// TTL applied on every put; refreshed on each successful check.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Opaque key-value store contract. Implementations must return
/// [`SchemaError::SnapshotAbsent`] for a missing key and map every other
/// failure to [`SchemaError::SnapshotIo`].
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SchemaResult<()>;
    async fn get(&self, key: &str) -> SchemaResult<Vec<u8>>;
}

/// In-memory TTL-aware store. The default for tests and single-process use.
pub struct MemorySnapshotStore {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SchemaResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> SchemaResult<Vec<u8>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(value.clone()),
            Some(_) => {
                entries.remove(key);
                Err(SchemaError::SnapshotAbsent)
            }
            None => Err(SchemaError::SnapshotAbsent),
        }
    }
}

/// Marshal a snapshot to its wire format: JSON, then zlib.
pub fn encode_snapshot(snapshot: &Snapshot) -> SchemaResult<Vec<u8>> {
    let json = serde_json::to_vec(snapshot)
        .map_err(|e| SchemaError::serialization("marshal", e.to_string()))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map_err(|e| SchemaError::serialization("compress", e.to_string()))
}

/// Reverse of [`encode_snapshot`].
pub fn decode_snapshot(bytes: &[u8]) -> SchemaResult<Snapshot> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| SchemaError::serialization("decompress", e.to_string()))?;

    serde_json::from_slice(&json)
        .map_err(|e| SchemaError::serialization("unmarshal", e.to_string()))
}

/// Codec + keying layer over the opaque store. An encryption-at-rest codec,
/// when present, layers between this type and the store.
pub struct SnapshotRepository {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotRepository {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    fn key(session_id: &str) -> String {
        format!("schema:{}", session_id)
    }

    pub async fn save(&self, session_id: &str, snapshot: &Snapshot) -> SchemaResult<()> {
        let bytes = encode_snapshot(snapshot)?;
        self.store
            .put(&Self::key(session_id), bytes, SNAPSHOT_TTL)
            .await
    }

    /// Loads the stored snapshot; `Ok(None)` means first-time.
    pub async fn load(&self, session_id: &str) -> SchemaResult<Option<Snapshot>> {
        match self.store.get(&Self::key(session_id)).await {
            Ok(bytes) => Ok(Some(decode_snapshot(&bytes)?)),
            Err(SchemaError::SnapshotAbsent) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::checksum;
    use crate::engine::types::{Column, LlmSchema, Schema, Table};
    use chrono::Utc;

    fn sample_snapshot() -> Snapshot {
        let mut table = Table::new("users");
        table.columns.insert(
            "id".to_string(),
            Column {
                name: "id".to_string(),
                data_type: "bigint".to_string(),
                nullable: false,
                ..Default::default()
            },
        );
        table.row_count = 3;

        let mut schema = Schema::new();
        schema.tables.insert("users".to_string(), table);
        checksum::seal(&mut schema);

        let table_checksums = schema
            .tables
            .iter()
            .map(|(name, t)| (name.clone(), t.checksum.clone()))
            .collect();

        Snapshot {
            full_schema: schema,
            llm_schema: LlmSchema::default(),
            table_checksums,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn wire_format_round_trips() {
        let snapshot = sample_snapshot();
        let bytes = encode_snapshot(&snapshot).unwrap();
        let back = decode_snapshot(&bytes).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_snapshot(b"not zlib at all").unwrap_err();
        assert!(matches!(err, SchemaError::Serialization { .. }));
    }

    #[tokio::test]
    async fn missing_key_is_the_first_time_sentinel() {
        let store = MemorySnapshotStore::new();
        let err = store.get("schema:nope").await.unwrap_err();
        assert!(err.is_snapshot_absent());

        let repo = SnapshotRepository::new(Arc::new(store));
        assert!(repo.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let repo = SnapshotRepository::new(Arc::new(MemorySnapshotStore::new()));
        let snapshot = sample_snapshot();
        repo.save("chat-1", &snapshot).await.unwrap();

        let loaded = repo.load("chat-1").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemorySnapshotStore::new();
        store
            .put("schema:x", vec![1, 2, 3], Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = store.get("schema:x").await.unwrap_err();
        assert!(err.is_snapshot_absent());
        assert!(store.is_empty().await);
    }
}
