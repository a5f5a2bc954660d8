//! In-process [`DocumentStore`] for tests and dry runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{DocumentStore, IndexStatus, StoreError};
use crate::models::Record;

/// Keeps upserted records in a map. Can be switched to "unavailable" to
/// exercise the failure path of the persistence bridge.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Record>>,
    index_created: AtomicBool,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of distinct documents stored
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Number of successful upserts, counting overwrites
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<Record> {
        self.documents.read().await.get(key).cloned()
    }

    /// Stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.documents.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unreachable("in-memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn ensure_index(&self) -> Result<IndexStatus, StoreError> {
        self.check_available()?;
        if self.index_created.swap(true, Ordering::SeqCst) {
            Ok(IndexStatus::Existing)
        } else {
            Ok(IndexStatus::Created)
        }
    }

    async fn upsert(&self, key: &str, record: &Record) -> Result<(), StoreError> {
        self.check_available()?;
        self.documents
            .write()
            .await
            .insert(key.to_string(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
