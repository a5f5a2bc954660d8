//! Document store operations
//!
//! The harvesting core only needs three things from a store: a liveness
//! check, an index-exists-or-create handshake and an upsert keyed by
//! `{source}-{base}-{document_id}`. [`DocumentStore`] captures that surface;
//! [`OpenSearchStore`] talks to a real cluster and [`InMemoryStore`] backs
//! tests and dry runs.

pub mod memory;
pub mod opensearch_store;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::Record;

pub use self::memory::InMemoryStore;
pub use self::opensearch_store::OpenSearchStore;

/// Errors returned by a document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be reached or the client could not be built
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    /// Transport-level failure from the OpenSearch client
    #[error("Request failed: {0}")]
    Request(#[from] ::opensearch::Error),

    /// Store answered with a non-success status
    #[error("Store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Index creation was not acknowledged by the cluster
    #[error("Index [{0}] was created, but not acknowledged")]
    NotAcknowledged(String),

    /// Invalid endpoint URL
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
}

impl StoreError {
    /// Whether the same call may succeed later
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Request(_) | Self::NotAcknowledged(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidUrl(_) => false,
        }
    }
}

/// Outcome of [`DocumentStore::ensure_index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Index was already present
    Existing,
    /// Index was missing and has been created
    Created,
}

/// Minimal document-store surface used by harvesting entry points
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check that the store answers
    async fn ping(&self) -> Result<(), StoreError>;

    /// Make sure the target index exists, creating it when missing
    async fn ensure_index(&self) -> Result<IndexStatus, StoreError>;

    /// Insert or replace the document stored under `key`
    async fn upsert(&self, key: &str, record: &Record) -> Result<(), StoreError>;
}

/// Run [`DocumentStore::ensure_index`] until it succeeds
///
/// Recoverable errors are logged and retried after `delay`. Anything else,
/// such as a rejected mapping, is returned to the caller.
pub async fn ensure_index_with_retry(
    store: &dyn DocumentStore,
    delay: Duration,
) -> Result<IndexStatus, StoreError> {
    loop {
        match store.ensure_index().await {
            Ok(status) => return Ok(status),
            Err(e) if e.is_recoverable() => {
                tracing::error!(error = %e, "Failed to prepare store index");
                tracing::warn!(delay_secs = delay.as_secs(), "Retrying index creation");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Index mapping for [`Record`] documents
pub fn record_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "source": { "type": "keyword" },
                "document_type": { "type": "keyword" },
                "document_id": { "type": "keyword" },
                "is_enabled": { "type": "boolean" },
                "checksum": { "type": "keyword" },
                "full_document_link": { "type": "keyword" },
                "content": { "type": "text" },
                "judged_at": { "type": "date" },
                "inserted_at": { "type": "date" },
                "updated_at": { "type": "date" }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_status() {
        let err = StoreError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_recoverable());

        let err = StoreError::Status {
            status: 400,
            body: "mapper_parsing_exception".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(!StoreError::InvalidUrl("::".to_string()).is_recoverable());
    }

    #[test]
    fn test_mapping_covers_record_fields() {
        let mapping = record_mapping();
        let properties = &mapping["mappings"]["properties"];
        let record = serde_json::to_value(Record::new("s", "t", "1", "c")).unwrap();

        for field in record.as_object().unwrap().keys() {
            assert!(properties.get(field).is_some(), "unmapped field {field}");
        }
    }
}
