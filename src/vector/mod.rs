//! Summary vector index integration.
//!
//! Each document owns one collection in the similarity index (`doc_<id>`);
//! entries pair a summary embedding with the chunk id that serves as the
//! join key back into the chunk store.

mod client;
mod types;

pub use client::{SummaryIndex, collection_for_document};
pub use types::{ScoredSummary, SummaryPoint, VectorError};

use crate::embedding::{EmbeddingClient, EmbeddingError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while indexing summaries.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Similarity index interaction failed.
    #[error(transparent)]
    Vector(#[from] VectorError),
    /// Embedding provider failed to produce vectors.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Chunk ids generated per category, aligned by position with the inputs.
#[derive(Debug, Clone, Default)]
pub struct IndexedIds {
    /// Ids for composite text chunks.
    pub text_ids: Vec<String>,
    /// Ids for table chunks.
    pub table_ids: Vec<String>,
    /// Ids for image chunks.
    pub image_ids: Vec<String>,
}

/// Embeds summaries and writes them into the per-document collection.
pub struct VectorIndexer {
    index: Arc<SummaryIndex>,
    embedder: Arc<dyn EmbeddingClient + Send + Sync>,
    dimension: usize,
}

impl VectorIndexer {
    /// Build an indexer over the given index client and embedder.
    pub fn new(
        index: Arc<SummaryIndex>,
        embedder: Arc<dyn EmbeddingClient + Send + Sync>,
        dimension: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            dimension,
        }
    }

    /// Index one document's summaries, returning fresh chunk ids per item.
    ///
    /// The collection is dropped and recreated first, so re-ingesting a
    /// document replaces its summaries instead of appending to them.
    /// `ids[i]` corresponds to `summaries[i]` within each category.
    pub async fn index(
        &self,
        document_id: i64,
        table_summaries: &[String],
        text_summaries: &[String],
        image_summaries: &[String],
    ) -> Result<IndexedIds, IndexError> {
        let collection = collection_for_document(document_id);
        self.index
            .reset_collection(&collection, self.dimension as u64)
            .await?;

        let ids = IndexedIds {
            table_ids: self.index_category(&collection, table_summaries).await?,
            text_ids: self.index_category(&collection, text_summaries).await?,
            image_ids: self.index_category(&collection, image_summaries).await?,
        };

        tracing::info!(
            document_id,
            collection,
            tables = ids.table_ids.len(),
            texts = ids.text_ids.len(),
            images = ids.image_ids.len(),
            "Summaries indexed"
        );

        Ok(ids)
    }

    async fn index_category(
        &self,
        collection: &str,
        summaries: &[String],
    ) -> Result<Vec<String>, IndexError> {
        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_ids: Vec<String> = summaries
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        let vectors = self.embedder.embed(summaries.to_vec()).await?;

        debug_assert_eq!(chunk_ids.len(), vectors.len());

        let points = chunk_ids
            .iter()
            .zip(summaries.iter().zip(vectors))
            .map(|(chunk_id, (summary, vector))| SummaryPoint {
                chunk_id: chunk_id.clone(),
                summary: summary.clone(),
                vector,
            })
            .collect();

        self.index.upsert_summaries(collection, points).await?;
        Ok(chunk_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicClient;
    use httpmock::{Method::DELETE, Method::PUT, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn index_returns_aligned_fresh_ids() {
        let server = MockServer::start_async().await;

        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/doc_42");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/doc_42");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let upserts = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/doc_42/points");
                then.status(200).json_body(json!({ "result": { "status": "acknowledged" } }));
            })
            .await;

        let indexer = VectorIndexer::new(
            Arc::new(SummaryIndex::new(&server.base_url(), None).expect("index")),
            Arc::new(DeterministicClient::new(8)),
            8,
        );

        let ids = indexer
            .index(
                42,
                &["table summary".into()],
                &["text one".into(), "text two".into()],
                &[],
            )
            .await
            .expect("indexing");

        // one upsert per non-empty category
        assert_eq!(upserts.hits_async().await, 2);
        assert_eq!(ids.table_ids.len(), 1);
        assert_eq!(ids.text_ids.len(), 2);
        assert!(ids.image_ids.is_empty());

        let mut all: Vec<&String> = ids
            .table_ids
            .iter()
            .chain(&ids.text_ids)
            .chain(&ids.image_ids)
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 3, "chunk ids must be unique");
    }
}
