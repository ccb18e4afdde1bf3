//! The ingestion pipeline: lock, partition, summarize, index, persist.

use crate::chunk::{ChunkContentError, ChunkKind, ChunkRecord};
use crate::lock::{LockError, LockService};
use crate::partition::{PartitionError, Partitioner, classify_elements};
use crate::store::{ChunkStore, DocumentBlob, DocumentStore, StoreError};
use crate::summarize::{SummarizeError, Summarizer};
use crate::vector::{IndexError, VectorIndexer};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Stage labels attached to pipeline logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Acquiring the per-document processing lock.
    Locking,
    /// Shipping the document to the layout engine.
    Partitioning,
    /// Generating per-chunk summaries.
    Summarizing,
    /// Embedding summaries and writing the vector collection.
    Indexing,
    /// Writing original chunk content to the chunk store.
    Persisting,
    /// Pipeline completed.
    Done,
    /// Pipeline aborted with an error.
    Failed,
}

impl IngestStage {
    /// Stable label used in structured logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locking => "locking",
            Self::Partitioning => "partitioning",
            Self::Summarizing => "summarizing",
            Self::Indexing => "indexing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Errors raised by an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Another run currently holds the document's processing lock.
    #[error("document {0} is already being processed")]
    Contended(i64),
    /// Referenced document does not exist.
    #[error("document {0} not found")]
    DocumentMissing(i64),
    /// Lock backend failure; the document's lock state is unknown.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Partitioning failure.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Summarization failure.
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
    /// Vector indexing failure.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Chunk content could not be encoded for persistence.
    #[error(transparent)]
    Content(#[from] ChunkContentError),
    /// Scratch file handling failed.
    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters describing a completed ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestReport {
    /// Composite text chunks produced by partitioning.
    pub texts: usize,
    /// Table chunks produced by partitioning.
    pub tables: usize,
    /// Image chunks produced by partitioning.
    pub images: usize,
    /// Chunk records actually written to the chunk store.
    pub chunks_written: usize,
}

/// Drives one document through the full ingestion pipeline.
///
/// Chunk records are persisted only after vector indexing succeeds, so a
/// chunk id stored in the index always resolves to stored content (the
/// reverse orphan, content without an index entry, cannot occur either).
pub struct IngestPipeline {
    locks: Arc<dyn LockService>,
    documents: Arc<dyn DocumentStore>,
    chunks: Arc<dyn ChunkStore>,
    partitioner: Arc<dyn Partitioner>,
    summarizer: Summarizer,
    indexer: VectorIndexer,
}

impl IngestPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        locks: Arc<dyn LockService>,
        documents: Arc<dyn DocumentStore>,
        chunks: Arc<dyn ChunkStore>,
        partitioner: Arc<dyn Partitioner>,
        summarizer: Summarizer,
        indexer: VectorIndexer,
    ) -> Self {
        Self {
            locks,
            documents,
            chunks,
            partitioner,
            summarizer,
            indexer,
        }
    }

    /// Run the pipeline for one document.
    ///
    /// Exactly one run may be active per document; a concurrent attempt
    /// fails fast with [`IngestError::Contended`]. The lock is released on
    /// every terminal path, success or failure.
    pub async fn run(&self, document_id: i64) -> Result<IngestReport, IngestError> {
        tracing::debug!(document_id, stage = IngestStage::Locking.as_str(), "Starting ingestion");
        if !self.locks.try_acquire(document_id).await? {
            tracing::warn!(document_id, "Ingestion rejected, lock already held");
            return Err(IngestError::Contended(document_id));
        }

        let result = self.ingest_locked(document_id).await;

        if let Err(error) = self.locks.release(document_id).await {
            tracing::error!(document_id, error = %error, "Failed to release processing lock");
        }

        match &result {
            Ok(report) => tracing::info!(
                document_id,
                stage = IngestStage::Done.as_str(),
                chunks = report.chunks_written,
                "Ingestion finished"
            ),
            Err(error) => tracing::error!(
                document_id,
                stage = IngestStage::Failed.as_str(),
                error = %error,
                "Ingestion failed"
            ),
        }

        result
    }

    async fn ingest_locked(&self, document_id: i64) -> Result<IngestReport, IngestError> {
        // Re-checked under the lock: a queued duplicate job must not
        // re-ingest a document the previous job already finished.
        if self.chunks.is_processed(document_id).await? {
            tracing::info!(document_id, "Document already processed, skipping ingestion");
            return Ok(IngestReport::default());
        }

        let blob = self
            .documents
            .fetch_document(document_id)
            .await?
            .ok_or(IngestError::DocumentMissing(document_id))?;

        tracing::info!(
            document_id,
            stage = IngestStage::Partitioning.as_str(),
            name = %blob.name,
            "Partitioning document"
        );
        let scratch = self.write_scratch(document_id, &blob).await?;
        let partitioned = self.partitioner.partition(&scratch).await;
        tokio::fs::remove_file(&scratch).await.ok();
        let output = classify_elements(partitioned?);

        let report = IngestReport {
            texts: output.texts.len(),
            tables: output.tables.len(),
            images: output.images.len(),
            chunks_written: 0,
        };

        if output.is_empty() {
            tracing::warn!(document_id, "Partitioning produced no chunks");
            return Ok(report);
        }

        tracing::info!(
            document_id,
            stage = IngestStage::Summarizing.as_str(),
            texts = report.texts,
            tables = report.tables,
            images = report.images,
            "Summarizing chunks"
        );
        let (table_summaries, text_summaries) = self
            .summarizer
            .summarize_tables_and_texts(&output.tables, &output.texts)
            .await?;
        let image_summaries = self.summarizer.summarize_images(&output.images).await?;

        tracing::info!(document_id, stage = IngestStage::Indexing.as_str(), "Indexing summaries");
        let ids = self
            .indexer
            .index(document_id, &table_summaries, &text_summaries, &image_summaries)
            .await?;

        let mut records = Vec::with_capacity(report.texts + report.tables + report.images);
        for (chunk, chunk_id) in output.tables.iter().zip(ids.table_ids) {
            records.push(ChunkRecord::new(
                chunk_id,
                document_id,
                ChunkKind::Table,
                chunk.content_json()?,
            ));
        }
        for (chunk, chunk_id) in output.texts.iter().zip(ids.text_ids) {
            records.push(ChunkRecord::new(
                chunk_id,
                document_id,
                ChunkKind::Text,
                chunk.content_json()?,
            ));
        }
        for (chunk, chunk_id) in output.images.iter().zip(ids.image_ids) {
            records.push(ChunkRecord::new(
                chunk_id,
                document_id,
                ChunkKind::Image,
                chunk.content_json()?,
            ));
        }

        tracing::info!(
            document_id,
            stage = IngestStage::Persisting.as_str(),
            records = records.len(),
            "Persisting original chunks"
        );
        let chunks_written = self.chunks.save_chunks(&records).await?;

        Ok(IngestReport {
            chunks_written,
            ..report
        })
    }

    async fn write_scratch(
        &self,
        document_id: i64,
        blob: &DocumentBlob,
    ) -> Result<PathBuf, IngestError> {
        let extension = if blob.doc_type.is_empty() {
            "bin"
        } else {
            blob.doc_type.as_str()
        };
        let path = std::env::temp_dir().join(format!(
            "ragserve-{document_id}-{}.{extension}",
            Uuid::new_v4()
        ));
        tokio::fs::write(&path, &blob.data).await?;
        Ok(path)
    }
}
