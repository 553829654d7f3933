// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the schema engine
//!
//! Driver-specific failures are mapped onto a small set of tagged kinds so
//! callers can branch on behavior instead of matching error strings.

use thiserror::Error;

/// Unified error type for all schema engine operations
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The caller's cancellation token fired or the operation deadline
    /// expired. Propagated immediately; nothing is cached or persisted.
    #[error("operation cancelled: {message}")]
    Cancelled { message: String },

    /// No fetcher or simplifier is registered for the requested engine tag.
    #[error("unsupported engine: {engine}")]
    Unsupported { engine: String },

    /// A required catalog query failed with no viable fallback.
    #[error("catalog query failed ({engine}, {stage}, {entity}): {message}")]
    Catalog {
        engine: String,
        stage: String,
        entity: String,
        message: String,
    },

    /// An optional sub-fetch (indexes, FKs, constraints, row count, example
    /// rows, views) failed. Never returned from public operations; fetchers
    /// swallow it into an empty subcollection and a structured log line.
    #[error("partial fetch failure ({stage}, {entity}): {message}")]
    Partial {
        stage: String,
        entity: String,
        message: String,
    },

    /// No snapshot exists for the session key. A sentinel, not a failure:
    /// callers that understand first-time semantics treat it as "no prior
    /// state".
    #[error("no snapshot stored for this session")]
    SnapshotAbsent,

    /// The snapshot store failed on put/get/delete.
    #[error("snapshot store {op} failed: {message}")]
    SnapshotIo { op: String, message: String },

    /// JSON marshalling or zlib (de)compression failed.
    #[error("serialization failed during {stage}: {message}")]
    Serialization { stage: String, message: String },
}

impl SchemaError {
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled { message: msg.into() }
    }

    pub fn unsupported(engine: impl Into<String>) -> Self {
        Self::Unsupported { engine: engine.into() }
    }

    pub fn catalog(
        engine: impl Into<String>,
        stage: impl Into<String>,
        entity: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Catalog {
            engine: engine.into(),
            stage: stage.into(),
            entity: entity.into(),
            message: msg.into(),
        }
    }

    pub fn partial(
        stage: impl Into<String>,
        entity: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Partial {
            stage: stage.into(),
            entity: entity.into(),
            message: msg.into(),
        }
    }

    pub fn snapshot_io(op: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SnapshotIo { op: op.into(), message: msg.into() }
    }

    pub fn serialization(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization { stage: stage.into(), message: msg.into() }
    }

    /// True for the first-time sentinel.
    pub fn is_snapshot_absent(&self) -> bool {
        matches!(self, Self::SnapshotAbsent)
    }
}

/// Result type alias for schema engine operations
pub type SchemaResult<T> = Result<T, SchemaError>;
