//! In-memory persistence backend for tests and local demos.

use super::{DocumentBlob, DocumentStore, StoreError};
use crate::chunk::ChunkRecord;
use crate::store::ChunkStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Hash-map backed store implementing both persistence traits.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<i64, DocumentBlob>>,
    chunks: Mutex<HashMap<String, ChunkRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document blob under the given id.
    pub fn insert_document(&self, document_id: i64, blob: DocumentBlob) {
        self.documents
            .lock()
            .expect("document table lock")
            .insert(document_id, blob);
    }

    /// Number of chunk records currently held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().expect("chunk table lock").len()
    }

    /// Ids of every chunk stored for a document.
    pub fn chunk_ids_for(&self, document_id: i64) -> Vec<String> {
        self.chunks
            .lock()
            .expect("chunk table lock")
            .values()
            .filter(|record| record.document_id == document_id)
            .map(|record| record.chunk_id.clone())
            .collect()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn is_processed(&self, document_id: i64) -> Result<bool, StoreError> {
        let chunks = self.chunks.lock().expect("chunk table lock");
        Ok(chunks
            .values()
            .any(|record| record.document_id == document_id))
    }

    async fn save_chunks(&self, records: &[ChunkRecord]) -> Result<usize, StoreError> {
        let mut chunks = self.chunks.lock().expect("chunk table lock");
        let mut saved = 0;
        for record in records {
            // Chunk ids are never reused; an existing key is a failed write.
            if chunks.contains_key(&record.chunk_id) {
                tracing::error!(
                    chunk_id = %record.chunk_id,
                    document_id = record.document_id,
                    "Failed to save chunk; skipping"
                );
                continue;
            }
            chunks.insert(record.chunk_id.clone(), record.clone());
            saved += 1;
        }
        Ok(saved)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let chunks = self.chunks.lock().expect("chunk table lock");
        Ok(chunks.get(chunk_id).cloned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_document(&self, document_id: i64) -> Result<Option<DocumentBlob>, StoreError> {
        let documents = self.documents.lock().expect("document table lock");
        Ok(documents.get(&document_id).cloned())
    }

    async fn replace_content(
        &self,
        document_id: i64,
        data: &[u8],
        doc_type: &str,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().expect("document table lock");
        match documents.get_mut(&document_id) {
            Some(blob) => {
                blob.data = data.to_vec();
                blob.doc_type = doc_type.to_string();
                Ok(())
            }
            None => Err(StoreError::DocumentMissing(document_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKind;

    fn record(chunk_id: &str, document_id: i64) -> ChunkRecord {
        ChunkRecord::new(chunk_id.into(), document_id, ChunkKind::Text, "[]".into())
    }

    #[tokio::test]
    async fn processed_becomes_and_stays_true() {
        let store = MemoryStore::new();
        assert!(!store.is_processed(42).await.unwrap());

        store.save_chunks(&[record("a", 42)]).await.unwrap();
        assert!(store.is_processed(42).await.unwrap());
        assert!(!store.is_processed(43).await.unwrap());
    }

    #[tokio::test]
    async fn save_continues_past_failing_records() {
        let store = MemoryStore::new();
        store.save_chunks(&[record("dup", 1)]).await.unwrap();

        let saved = store
            .save_chunks(&[record("x", 1), record("dup", 1), record("y", 1)])
            .await
            .unwrap();
        assert_eq!(saved, 2);
        assert!(store.get_chunk("y").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_chunk_is_none() {
        let store = MemoryStore::new();
        assert!(store.get_chunk("nope").await.unwrap().is_none());
    }
}
