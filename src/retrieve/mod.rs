//! Query-time retrieval: similarity search over summaries, hydration of the
//! original chunks, and page-grouped assembly of the context bundle.
//!
//! Summaries exist only for ranking; the bundle always carries the original
//! content. A composite hit expands into its sub-elements so the model sees
//! the exact text, each item keeping its own page and coordinates.

use crate::chunk::{ChunkContentError, ChunkKind};
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::store::{ChunkStore, StoreError};
use crate::vector::{SummaryIndex, VectorError, collection_for_document};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised during retrieval.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Query embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Similarity search failed.
    #[error(transparent)]
    Vector(#[from] VectorError),
    /// Chunk hydration failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Stored chunk content failed to decode.
    #[error(transparent)]
    Content(#[from] ChunkContentError),
    /// Embedding provider returned no vector for the query.
    #[error("no embedding produced for the query")]
    EmptyEmbedding,
}

/// Kind tag of a single context item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// Base64 image payload to attach to the prompt.
    Image,
    /// Text carrying the originating element type as its label.
    Text {
        /// Element type name, surfaced verbatim in the prompt.
        label: String,
    },
}

/// One item of retrieved context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    /// What the body holds.
    pub kind: ContentKind,
    /// Element text, or base64 payload for images.
    pub body: String,
    /// Page the content came from; unpaged content reports `None`.
    pub page_number: Option<u32>,
    /// Layout coordinates when the engine reported them.
    pub coordinates: Option<Value>,
}

impl ContentItem {
    /// Prompt rendering of a text item: `<label>: <body>`.
    ///
    /// Images have no text rendering; they ride as attachments.
    pub fn rendered(&self) -> Option<String> {
        match &self.kind {
            ContentKind::Text { label } => Some(format!("{label}: {}", self.body)),
            ContentKind::Image => None,
        }
    }
}

/// Retrieved context grouped by page, ascending. Unpaged items group under
/// page zero. Within a page, items keep discovery order.
pub type RetrievalBundle = BTreeMap<u32, Vec<ContentItem>>;

/// Runs similarity search and hydrates the matching original chunks.
pub struct Retriever {
    index: Arc<SummaryIndex>,
    embedder: Arc<dyn EmbeddingClient + Send + Sync>,
    chunks: Arc<dyn ChunkStore>,
    top_k: usize,
    score_threshold: f32,
}

impl Retriever {
    /// Assemble a retriever from its collaborators.
    pub fn new(
        index: Arc<SummaryIndex>,
        embedder: Arc<dyn EmbeddingClient + Send + Sync>,
        chunks: Arc<dyn ChunkStore>,
        top_k: usize,
        score_threshold: f32,
    ) -> Self {
        Self {
            index,
            embedder,
            chunks,
            top_k,
            score_threshold,
        }
    }

    /// Retrieve context relevant to `query` using the configured threshold.
    pub async fn retrieve(
        &self,
        document_id: i64,
        query: &str,
    ) -> Result<RetrievalBundle, RetrieveError> {
        self.retrieve_with_threshold(document_id, query, self.score_threshold)
            .await
    }

    /// Retrieve context relevant to `query` within one document.
    ///
    /// Candidates below `score_threshold` are dropped before hydration.
    /// A chunk id the store no longer knows is skipped, never an error; an
    /// empty bundle is a valid outcome meaning nothing relevant was found.
    pub async fn retrieve_with_threshold(
        &self,
        document_id: i64,
        query: &str,
        score_threshold: f32,
    ) -> Result<RetrievalBundle, RetrieveError> {
        let mut vectors = self.embedder.embed(vec![query.to_string()]).await?;
        let vector = if vectors.is_empty() {
            return Err(RetrieveError::EmptyEmbedding);
        } else {
            vectors.swap_remove(0)
        };

        let collection = collection_for_document(document_id);
        let candidates = self.index.search(&collection, vector, self.top_k).await?;
        let total = candidates.len();

        let mut items = Vec::new();
        let mut hydrated = 0usize;
        for candidate in candidates {
            if candidate.score < score_threshold {
                tracing::debug!(
                    chunk_id = %candidate.chunk_id,
                    score = candidate.score,
                    threshold = score_threshold,
                    "Dropping low-score candidate"
                );
                continue;
            }

            let Some(record) = self.chunks.get_chunk(&candidate.chunk_id).await? else {
                tracing::warn!(
                    chunk_id = %candidate.chunk_id,
                    document_id,
                    "Indexed chunk missing from the chunk store; skipping"
                );
                continue;
            };
            hydrated += 1;

            match record.kind {
                ChunkKind::Image => {
                    let metadata = record.decode_image()?;
                    items.push(ContentItem {
                        kind: ContentKind::Image,
                        body: metadata.image_base64.unwrap_or_default(),
                        page_number: metadata.page_number,
                        coordinates: metadata.coordinates,
                    });
                }
                ChunkKind::Text | ChunkKind::Table => {
                    for element in record.decode_elements()? {
                        let kind = if element.is_image()
                            && element.metadata.image_base64.is_some()
                        {
                            ContentKind::Image
                        } else {
                            ContentKind::Text {
                                label: element.element_type.clone(),
                            }
                        };
                        let body = match &kind {
                            ContentKind::Image => {
                                element.metadata.image_base64.clone().unwrap_or_default()
                            }
                            ContentKind::Text { .. } => element.text.clone(),
                        };
                        items.push(ContentItem {
                            kind,
                            body,
                            page_number: element.metadata.page_number,
                            coordinates: element.metadata.coordinates,
                        });
                    }
                }
            }
        }

        tracing::info!(
            document_id,
            candidates = total,
            hydrated,
            items = items.len(),
            "Retrieval complete"
        );

        let mut bundle = RetrievalBundle::new();
        for item in items {
            let page = item.page_number.unwrap_or(0);
            bundle.entry(page).or_default().push(item);
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkElement, ChunkRecord, CompositeChunk, ElementMetadata, ImageChunk};
    use crate::embedding::DeterministicClient;
    use crate::store::MemoryStore;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn retriever_for(server: &MockServer, store: Arc<MemoryStore>, threshold: f32) -> Retriever {
        Retriever::new(
            Arc::new(SummaryIndex::new(&server.base_url(), None).expect("index")),
            Arc::new(DeterministicClient::new(8)),
            store,
            10,
            threshold,
        )
    }

    async fn seed_composite(store: &MemoryStore, chunk_id: &str, elements: Vec<ChunkElement>) {
        let chunk = CompositeChunk {
            text: String::new(),
            elements,
        };
        let record = ChunkRecord::new(
            chunk_id.into(),
            1,
            ChunkKind::Text,
            chunk.content_json().expect("serialize"),
        );
        store.save_chunks(&[record]).await.expect("save");
    }

    fn element(label: &str, text: &str, page: u32) -> ChunkElement {
        ChunkElement {
            element_type: label.into(),
            text: text.into(),
            metadata: ElementMetadata {
                page_number: Some(page),
                ..Default::default()
            },
        }
    }

    fn mock_search(server: &MockServer, hits: serde_json::Value) {
        server.mock(|when, then| {
            when.method(POST).path("/collections/doc_1/points/query");
            then.status(200).json_body(json!({ "result": hits }));
        });
    }

    #[tokio::test]
    async fn low_score_candidates_are_filtered_out() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());
        seed_composite(&store, "keep", vec![element("NarrativeText", "kept", 1)]).await;
        seed_composite(&store, "mid", vec![element("NarrativeText", "mid", 1)]).await;
        seed_composite(&store, "drop", vec![element("NarrativeText", "dropped", 1)]).await;

        mock_search(
            &server,
            json!([
                {"id": "keep", "score": 0.9, "payload": {"chunk_id": "keep"}},
                {"id": "mid", "score": 0.4, "payload": {"chunk_id": "mid"}},
                {"id": "drop", "score": 0.2, "payload": {"chunk_id": "drop"}}
            ]),
        );

        // per-call threshold overrides the configured default
        let retriever = retriever_for(&server, store, 0.3);
        let bundle = retriever
            .retrieve_with_threshold(1, "question", 0.5)
            .await
            .expect("retrieve");

        let texts: Vec<_> = bundle
            .values()
            .flatten()
            .filter_map(ContentItem::rendered)
            .collect();
        assert_eq!(texts, vec!["NarrativeText: kept".to_string()]);
    }

    #[tokio::test]
    async fn items_group_by_page_in_ascending_order() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());
        seed_composite(
            &store,
            "c1",
            vec![
                element("Title", "Heading", 1),
                element("NarrativeText", "Body", 1),
            ],
        )
        .await;
        seed_composite(&store, "c2", vec![element("NarrativeText", "Later", 2)]).await;

        mock_search(
            &server,
            json!([
                {"id": "c2", "score": 0.8, "payload": {"chunk_id": "c2"}},
                {"id": "c1", "score": 0.7, "payload": {"chunk_id": "c1"}}
            ]),
        );

        let retriever = retriever_for(&server, store, 0.3);
        let bundle = retriever.retrieve(1, "question").await.expect("retrieve");

        let pages: Vec<_> = bundle.keys().copied().collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(bundle[&1].len(), 2);
        assert_eq!(bundle[&2].len(), 1);
        assert_eq!(
            bundle[&1][0].rendered().as_deref(),
            Some("Title: Heading")
        );
    }

    #[tokio::test]
    async fn image_chunks_become_attachments() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());

        let image = ImageChunk {
            metadata: ElementMetadata {
                page_number: Some(3),
                image_base64: Some("aW1n".into()),
                ..Default::default()
            },
        };
        let record = ChunkRecord::new(
            "img".into(),
            1,
            ChunkKind::Image,
            image.content_json().expect("serialize"),
        );
        store.save_chunks(&[record]).await.expect("save");

        mock_search(
            &server,
            json!([{"id": "img", "score": 0.95, "payload": {"chunk_id": "img"}}]),
        );

        let retriever = retriever_for(&server, store, 0.3);
        let bundle = retriever.retrieve(1, "what is in the figure").await.expect("retrieve");

        let item = &bundle[&3][0];
        assert_eq!(item.kind, ContentKind::Image);
        assert_eq!(item.body, "aW1n");
        assert!(item.rendered().is_none());
    }

    #[tokio::test]
    async fn missing_chunks_are_skipped_silently() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());
        seed_composite(&store, "there", vec![element("NarrativeText", "present", 1)]).await;

        mock_search(
            &server,
            json!([
                {"id": "gone", "score": 0.9, "payload": {"chunk_id": "gone"}},
                {"id": "there", "score": 0.8, "payload": {"chunk_id": "there"}}
            ]),
        );

        let retriever = retriever_for(&server, store, 0.3);
        let bundle = retriever.retrieve(1, "question").await.expect("retrieve");

        let texts: Vec<_> = bundle
            .values()
            .flatten()
            .filter_map(ContentItem::rendered)
            .collect();
        assert_eq!(texts, vec!["NarrativeText: present".to_string()]);
    }
}
