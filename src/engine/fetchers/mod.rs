//! Per-engine schema fetchers
//!
//! Each fetcher implements the extraction contract against one engine's
//! catalog, with fallback query paths where the primary views can be
//! unavailable or restricted.

pub mod clickhouse;
pub mod mongodb;
pub mod mysql;
pub mod postgres;

pub use clickhouse::ClickHouseFetcher;
pub use mongodb::MongoFetcher;
pub use mysql::MySqlFetcher;
pub use postgres::PostgresFetcher;

use tokio_util::sync::CancellationToken;

use crate::engine::error::{SchemaError, SchemaResult};

/// Cancellation poll. Called at every table boundary and between
/// sub-fetches; the in-flight operation's error is discarded in favor of
/// the cancellation cause.
pub(crate) fn ensure_live(ctx: &CancellationToken) -> SchemaResult<()> {
    if ctx.is_cancelled() {
        return Err(SchemaError::cancelled("context terminated"));
    }
    Ok(())
}

/// Structured log line for a degraded optional sub-fetch. The caller keeps
/// going with an empty subcollection.
pub(crate) fn log_partial(engine: &str, err: &SchemaError) {
    tracing::warn!(engine, error = %err, "optional sub-fetch degraded to empty result");
}

/// Coerces a raw byte value for example records: text when valid UTF-8,
/// placeholder otherwise.
pub(crate) fn bytes_to_json(bytes: Vec<u8>) -> serde_json::Value {
    match String::from_utf8(bytes) {
        Ok(text) => serde_json::Value::String(text),
        Err(err) => {
            serde_json::Value::String(format!("<binary:{} bytes>", err.as_bytes().len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_bytes_become_text() {
        assert_eq!(
            bytes_to_json(b"hello".to_vec()),
            serde_json::Value::String("hello".to_string())
        );
    }

    #[test]
    fn non_utf8_bytes_become_a_placeholder() {
        assert_eq!(
            bytes_to_json(vec![0xff, 0xfe, 0x00]),
            serde_json::Value::String("<binary:3 bytes>".to_string())
        );
    }

    #[test]
    fn cancelled_token_is_detected() {
        let ctx = CancellationToken::new();
        assert!(ensure_live(&ctx).is_ok());
        ctx.cancel();
        assert!(matches!(
            ensure_live(&ctx),
            Err(SchemaError::Cancelled { .. })
        ));
    }
}
