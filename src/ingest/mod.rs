//! Document ingestion: the pipeline itself and the queue that runs it in
//! the background.

mod orchestrator;
mod queue;

pub use orchestrator::{IngestError, IngestPipeline, IngestReport, IngestStage};
pub use queue::{
    IngestQueue, IngestRunner, JobReceiver, JobRecord, JobStatus, QueueError, spawn_worker,
};
