//! Document and chunk persistence.
//!
//! The relational engine is an external collaborator; the traits here expose
//! only what the pipeline needs: raw document blobs, an "already processed"
//! query, append-only chunk writes, and chunk hydration by id.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::chunk::{ChunkContentError, ChunkRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query or connection failure from the relational engine.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Referenced document does not exist.
    #[error("document {0} not found")]
    DocumentMissing(i64),
    /// Stored chunk content failed to decode.
    #[error(transparent)]
    Content(#[from] ChunkContentError),
}

/// A raw document as stored externally.
#[derive(Debug, Clone)]
pub struct DocumentBlob {
    /// Display name of the document.
    pub name: String,
    /// Source format, e.g. `pdf` or `docx`.
    pub doc_type: String,
    /// Raw binary content.
    pub data: Vec<u8>,
}

/// Persistence of original chunk content keyed by chunk id.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// True iff at least one chunk exists for the document.
    ///
    /// Chunks are never deleted by the pipeline, so once true this stays true.
    async fn is_processed(&self, document_id: i64) -> Result<bool, StoreError>;

    /// Write one record per chunk, continuing past individual failures to
    /// maximize partial persistence. Returns the number of records written;
    /// failed records are logged and skipped.
    async fn save_chunks(&self, records: &[ChunkRecord]) -> Result<usize, StoreError>;

    /// Fetch a chunk by id; a missing id is `Ok(None)`, not an error.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError>;
}

/// Access to raw document blobs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the raw document, or `None` when the id is unknown.
    async fn fetch_document(&self, document_id: i64) -> Result<Option<DocumentBlob>, StoreError>;

    /// Replace a document's content and type after conversion.
    async fn replace_content(
        &self,
        document_id: i64,
        data: &[u8],
        doc_type: &str,
    ) -> Result<(), StoreError>;
}
