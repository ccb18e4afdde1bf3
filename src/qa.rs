//! Question-answering facade tying retrieval, ingestion, and conversion
//! together behind one trait the HTTP surface consumes.
//!
//! Asking a question about an unprocessed document triggers ingestion
//! instead of answering: the caller gets a processing outcome with a job id
//! to poll and retries later. A document already being ingested, or with an
//! ingestion job still pending, is never enqueued a second time.

use crate::answer::{AnswerAssembler, AnswerError};
use crate::convert::{ConvertError, DocumentConverter};
use crate::ingest::{IngestQueue, JobRecord, QueueError};
use crate::lock::{LockError, LockService};
use crate::retrieve::{RetrieveError, Retriever};
use crate::store::{ChunkStore, DocumentStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the question-answering facade.
#[derive(Debug, Error)]
pub enum QaError {
    /// Referenced document does not exist.
    #[error("document {0} not found")]
    DocumentMissing(i64),
    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Lock backend failure.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Job submission failure.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Retrieval failure.
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    /// Answer generation failure.
    #[error(transparent)]
    Answer(#[from] AnswerError),
    /// Document conversion failure.
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Result of asking a question.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// The document is processed and an answer was generated.
    Answered {
        /// Model-generated answer text.
        answer: String,
    },
    /// The document is not processed yet; ingestion is underway.
    Processing {
        /// Id of the job to poll. Repeated asks share one job while it is
        /// pending; `None` when a run outside the queue holds the lock.
        job_id: Option<Uuid>,
    },
}

/// Processing state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentState {
    /// Whether chunks exist for the document.
    pub processed: bool,
    /// Whether an ingestion run currently holds the document's lock.
    pub locked: bool,
}

/// Operations the HTTP surface needs.
#[async_trait]
pub trait DocumentQa: Send + Sync {
    /// Answer a question, or kick off ingestion when the document is not
    /// processed yet.
    async fn answer_question(
        &self,
        document_id: i64,
        question: &str,
    ) -> Result<AskOutcome, QaError>;

    /// Explicitly enqueue an ingestion job for the document.
    async fn enqueue_processing(&self, document_id: i64) -> Result<Uuid, QaError>;

    /// Report the document's processing state.
    async fn document_status(&self, document_id: i64) -> Result<DocumentState, QaError>;

    /// Look up a submitted job; `None` for unknown ids.
    fn job_status(&self, job_id: Uuid) -> Option<JobRecord>;

    /// Convert a stored DOCX document to PDF in place.
    async fn convert_document(&self, document_id: i64) -> Result<(), QaError>;
}

/// Production wiring of the question-answering facade.
pub struct QaService {
    chunks: Arc<dyn ChunkStore>,
    documents: Arc<dyn DocumentStore>,
    locks: Arc<dyn LockService>,
    queue: IngestQueue,
    retriever: Retriever,
    assembler: AnswerAssembler,
    converter: Arc<dyn DocumentConverter>,
}

impl QaService {
    /// Assemble the facade from its collaborators.
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        documents: Arc<dyn DocumentStore>,
        locks: Arc<dyn LockService>,
        queue: IngestQueue,
        retriever: Retriever,
        assembler: AnswerAssembler,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        Self {
            chunks,
            documents,
            locks,
            queue,
            retriever,
            assembler,
            converter,
        }
    }
}

#[async_trait]
impl DocumentQa for QaService {
    async fn answer_question(
        &self,
        document_id: i64,
        question: &str,
    ) -> Result<AskOutcome, QaError> {
        if !self.chunks.is_processed(document_id).await? {
            // A held lock means a run is already in flight; submitting
            // another job would only fail on contention later.
            if self.locks.is_locked(document_id).await? {
                tracing::info!(document_id, "Question deferred, ingestion in progress");
                return Ok(AskOutcome::Processing { job_id: None });
            }
            let job_id = self.queue.enqueue(document_id)?;
            tracing::info!(document_id, %job_id, "Question triggered ingestion");
            return Ok(AskOutcome::Processing {
                job_id: Some(job_id),
            });
        }

        let bundle = self.retriever.retrieve(document_id, question).await?;
        let answer = self.assembler.answer(&bundle, question).await?;
        Ok(AskOutcome::Answered { answer })
    }

    async fn enqueue_processing(&self, document_id: i64) -> Result<Uuid, QaError> {
        Ok(self.queue.enqueue(document_id)?)
    }

    async fn document_status(&self, document_id: i64) -> Result<DocumentState, QaError> {
        Ok(DocumentState {
            processed: self.chunks.is_processed(document_id).await?,
            locked: self.locks.is_locked(document_id).await?,
        })
    }

    fn job_status(&self, job_id: Uuid) -> Option<JobRecord> {
        self.queue.status(job_id)
    }

    async fn convert_document(&self, document_id: i64) -> Result<(), QaError> {
        let blob = self
            .documents
            .fetch_document(document_id)
            .await?
            .ok_or(QaError::DocumentMissing(document_id))?;

        if blob.doc_type.eq_ignore_ascii_case("pdf") {
            tracing::debug!(document_id, "Document already PDF, skipping conversion");
            return Ok(());
        }

        let pdf = self.converter.docx_to_pdf(&blob.data).await?;
        self.documents
            .replace_content(document_id, &pdf, "pdf")
            .await?;
        tracing::info!(document_id, from = %blob.doc_type, "Document converted and replaced");
        Ok(())
    }
}
