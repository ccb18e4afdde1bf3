//! Background job queue for ingestion runs.
//!
//! Submission returns a job id immediately, and resubmitting a document with
//! a pending job hands back that job instead of queueing another run. A
//! single worker task drains the
//! channel and runs jobs sequentially, so queue order is also execution
//! order. Status is polled by id, not pushed. The queue knows nothing about
//! what a job does beyond the [`IngestRunner`] seam.

use crate::ingest::orchestrator::{IngestError, IngestPipeline, IngestReport};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Errors raised while submitting a job.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Worker task has stopped; no new jobs can be accepted.
    #[error("ingestion worker is not running")]
    WorkerGone,
}

/// Lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued or currently running.
    Pending,
    /// Finished without error.
    Success,
    /// Finished with an error; see the record's message.
    Failure,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Document the job ingests.
    pub document_id: i64,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Failure message, present only for failed jobs.
    pub error: Option<String>,
}

/// Unit of work the queue runs.
#[async_trait]
pub trait IngestRunner: Send + Sync {
    /// Ingest one document.
    async fn ingest(&self, document_id: i64) -> Result<IngestReport, IngestError>;
}

#[async_trait]
impl IngestRunner for IngestPipeline {
    async fn ingest(&self, document_id: i64) -> Result<IngestReport, IngestError> {
        self.run(document_id).await
    }
}

struct QueuedJob {
    job_id: Uuid,
    document_id: i64,
}

/// Handle for submitting jobs and polling their status.
#[derive(Clone)]
pub struct IngestQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    records: Arc<Mutex<HashMap<Uuid, JobRecord>>>,
}

/// Receiving half handed to [`spawn_worker`].
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<QueuedJob>,
}

impl IngestQueue {
    /// Create a queue and the receiver its worker will drain.
    pub fn new() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            records: Arc::new(Mutex::new(HashMap::new())),
        };
        (queue, JobReceiver { receiver })
    }

    /// Submit an ingestion job, returning its id.
    ///
    /// Submission is idempotent per document: while a job for `document_id`
    /// is still pending, further submissions return the existing job id
    /// instead of queueing a duplicate.
    pub fn enqueue(&self, document_id: i64) -> Result<Uuid, QueueError> {
        self.with_records(|records| {
            let pending = records.iter().find(|(_, record)| {
                record.document_id == document_id && record.status == JobStatus::Pending
            });
            if let Some((&job_id, _)) = pending {
                tracing::debug!(%job_id, document_id, "Ingestion already queued, reusing job");
                return Ok(job_id);
            }

            let job_id = Uuid::new_v4();
            if self.sender.send(QueuedJob { job_id, document_id }).is_err() {
                return Err(QueueError::WorkerGone);
            }
            records.insert(
                job_id,
                JobRecord {
                    document_id,
                    status: JobStatus::Pending,
                    error: None,
                },
            );
            tracing::info!(%job_id, document_id, "Ingestion job queued");
            Ok(job_id)
        })
    }

    /// Current state of a job; `None` for unknown ids.
    pub fn status(&self, job_id: Uuid) -> Option<JobRecord> {
        self.with_records(|records| records.get(&job_id).cloned())
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut HashMap<Uuid, JobRecord>) -> T) -> T {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut records)
    }

    fn complete(&self, job_id: Uuid, outcome: Result<IngestReport, IngestError>) {
        self.with_records(|records| {
            if let Some(record) = records.get_mut(&job_id) {
                match outcome {
                    Ok(_) => record.status = JobStatus::Success,
                    Err(error) => {
                        record.status = JobStatus::Failure;
                        record.error = Some(error.to_string());
                    }
                }
            }
        });
    }
}

/// Start the worker task draining the queue.
///
/// Jobs run one at a time; the task exits when every queue handle is dropped.
pub fn spawn_worker(
    queue: IngestQueue,
    mut receiver: JobReceiver,
    runner: Arc<dyn IngestRunner>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = receiver.receiver.recv().await {
            tracing::info!(job_id = %job.job_id, document_id = job.document_id, "Ingestion job started");
            let outcome = runner.ingest(job.document_id).await;
            match &outcome {
                Ok(report) => tracing::info!(
                    job_id = %job.job_id,
                    document_id = job.document_id,
                    chunks = report.chunks_written,
                    "Ingestion job succeeded"
                ),
                Err(error) => tracing::error!(
                    job_id = %job.job_id,
                    document_id = job.document_id,
                    error = %error,
                    "Ingestion job failed"
                ),
            }
            queue.complete(job.job_id, outcome);
        }
        tracing::debug!("Ingestion worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingRunner {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IngestRunner for CountingRunner {
        async fn ingest(&self, document_id: i64) -> Result<IngestReport, IngestError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(IngestError::DocumentMissing(document_id))
            } else {
                Ok(IngestReport {
                    chunks_written: 3,
                    ..Default::default()
                })
            }
        }
    }

    async fn wait_for_terminal(queue: &IngestQueue, job_id: Uuid) -> JobRecord {
        for _ in 0..100 {
            if let Some(record) = queue.status(job_id)
                && record.status != JobStatus::Pending
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn successful_job_transitions_to_success() {
        let (queue, receiver) = IngestQueue::new();
        let runner = Arc::new(CountingRunner {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        spawn_worker(queue.clone(), receiver, Arc::clone(&runner) as Arc<dyn IngestRunner>);

        let job_id = queue.enqueue(42).expect("enqueue");
        assert_eq!(queue.status(job_id).map(|r| r.document_id), Some(42));

        let record = wait_for_terminal(&queue, job_id).await;
        assert_eq!(record.status, JobStatus::Success);
        assert!(record.error.is_none());
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_job_carries_the_error_message() {
        let (queue, receiver) = IngestQueue::new();
        spawn_worker(
            queue.clone(),
            receiver,
            Arc::new(CountingRunner {
                runs: AtomicUsize::new(0),
                fail: true,
            }),
        );

        let job_id = queue.enqueue(7).expect("enqueue");
        let record = wait_for_terminal(&queue, job_id).await;
        assert_eq!(record.status, JobStatus::Failure);
        assert!(record.error.as_deref().unwrap_or("").contains("not found"));
    }

    #[tokio::test]
    async fn pending_document_is_not_enqueued_twice() {
        let (queue, _receiver) = IngestQueue::new();

        let first = queue.enqueue(11).expect("enqueue");
        let second = queue.enqueue(11).expect("enqueue");
        assert_eq!(first, second);

        let other = queue.enqueue(12).expect("enqueue");
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn finished_document_can_be_resubmitted() {
        let (queue, receiver) = IngestQueue::new();
        spawn_worker(
            queue.clone(),
            receiver,
            Arc::new(CountingRunner {
                runs: AtomicUsize::new(0),
                fail: false,
            }),
        );

        let first = queue.enqueue(5).expect("enqueue");
        wait_for_terminal(&queue, first).await;

        let second = queue.enqueue(5).expect("enqueue");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn unknown_job_id_has_no_status() {
        let (queue, _receiver) = IngestQueue::new();
        assert!(queue.status(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn enqueue_fails_once_the_worker_is_gone() {
        let (queue, receiver) = IngestQueue::new();
        drop(receiver);
        let error = queue.enqueue(1).expect_err("worker gone");
        assert!(matches!(error, QueueError::WorkerGone));
    }
}
