//! Concurrent summary generation for partitioned chunks.
//!
//! Every chunk gets a short summary before indexing; the summary is what
//! gets embedded, the original content is what gets retrieved. Calls to the
//! generation runtime run concurrently under a semaphore so a large document
//! does not stampede the model server. Output order always matches input
//! order, which downstream indexing relies on to pair summaries with chunks.

use crate::chunk::{CompositeChunk, ImageChunk, TableChunk};
use crate::generation::{GenerationClient, GenerationError, GenerationRequest};
use futures_util::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors raised while summarizing chunks.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Underlying generation call failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

const TEXT_PROMPT: &str = "You are an assistant tasked with summarizing tables and text. \
Give a concise summary of the table or text. Respond only with the summary, \
no additional comment. Do not start your message by saying \"Here is a summary\" \
or anything like that. Just give the summary as it is.";

const IMAGE_PROMPT: &str = "Describe the image in detail. Be specific about any \
graphs, charts, diagrams or figures, such as bar plots and their axes, values \
and trends.";

/// Runs chunk summarization against the generation runtime.
pub struct Summarizer {
    client: Arc<dyn GenerationClient>,
    limiter: Arc<Semaphore>,
}

impl Summarizer {
    /// Build a summarizer running at most `max_concurrency` calls at once.
    pub fn new(client: Arc<dyn GenerationClient>, max_concurrency: usize) -> Self {
        Self {
            client,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Summarize tables and composite texts in one pass.
    ///
    /// Both batches share the concurrency limit; each output vector is
    /// aligned by position with its input.
    pub async fn summarize_tables_and_texts(
        &self,
        tables: &[TableChunk],
        texts: &[CompositeChunk],
    ) -> Result<(Vec<String>, Vec<String>), SummarizeError> {
        let table_summaries = self.summarize_tables(tables).await?;
        let text_summaries = self.summarize_texts(texts).await?;
        Ok((table_summaries, text_summaries))
    }

    /// Summarize composite text chunks, preserving input order.
    pub async fn summarize_texts(
        &self,
        chunks: &[CompositeChunk],
    ) -> Result<Vec<String>, SummarizeError> {
        self.run_batch(chunks.iter().map(|chunk| {
            GenerationRequest::text(format!("{TEXT_PROMPT}\n\nTable or text chunk: {}", chunk.text))
        }))
        .await
    }

    /// Summarize table chunks using their rendered representation.
    pub async fn summarize_tables(
        &self,
        chunks: &[TableChunk],
    ) -> Result<Vec<String>, SummarizeError> {
        self.run_batch(chunks.iter().map(|chunk| {
            GenerationRequest::text(format!(
                "{TEXT_PROMPT}\n\nTable or text chunk: {}",
                chunk.rendered()
            ))
        }))
        .await
    }

    /// Describe image chunks by attaching their base64 payload to the prompt.
    pub async fn summarize_images(
        &self,
        chunks: &[ImageChunk],
    ) -> Result<Vec<String>, SummarizeError> {
        self.run_batch(chunks.iter().map(|chunk| GenerationRequest {
            prompt: IMAGE_PROMPT.to_string(),
            images: vec![chunk.payload().to_string()],
        }))
        .await
    }

    async fn run_batch<I>(&self, requests: I) -> Result<Vec<String>, SummarizeError>
    where
        I: Iterator<Item = GenerationRequest>,
    {
        let tasks = requests.map(|request| {
            let client = Arc::clone(&self.client);
            let limiter = Arc::clone(&self.limiter);
            async move {
                // A closed semaphore cannot happen here; the permit scopes the call.
                let _permit = limiter
                    .acquire()
                    .await
                    .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
                client.generate(request).await
            }
        });

        let summaries = try_join_all(tasks).await?;
        Ok(summaries)
    }
}
