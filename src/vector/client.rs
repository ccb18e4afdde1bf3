//! HTTP client wrapper for the summary vector index (Qdrant wire format).

use crate::vector::types::{
    QueryPoint, QueryResponse, QueryResponseResult, ScoredSummary, SummaryPoint, VectorError,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Name of the per-document collection holding summary vectors.
pub fn collection_for_document(document_id: i64) -> String {
    format!("doc_{document_id}")
}

/// Lightweight HTTP client for summary index operations.
///
/// The index stores only `(summary embedding, chunk_id)` entries; original
/// content never leaves the chunk store.
pub struct SummaryIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl SummaryIndex {
    /// Construct a new client for the index at `base_url`.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, VectorError> {
        let client = Client::builder().user_agent("ragserve/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(VectorError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized summary index client");

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Drop and recreate a collection so re-ingestion replaces rather than
    /// appends summaries.
    pub async fn reset_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), VectorError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection}"))?
            .send()
            .await?;
        // 404 just means there was nothing to replace.
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorError::UnexpectedStatus { status, body });
        }

        self.create_collection(collection, vector_size).await
    }

    /// Create or update a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), VectorError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection, vector_size, "Collection ensured/created");
        })
        .await
    }

    /// Upsert summary points into the collection.
    pub async fn upsert_summaries(
        &self,
        collection: &str,
        points: Vec<SummaryPoint>,
    ) -> Result<(), VectorError> {
        if points.is_empty() {
            return Ok(());
        }

        let serialized: Vec<_> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.chunk_id,
                    "vector": point.vector,
                    "payload": {
                        "chunk_id": point.chunk_id,
                        "summary": point.summary,
                    },
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection}/points"))?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection, points = point_count, "Summaries indexed");
        })
        .await
    }

    /// Similarity search returning scored summary candidates.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredSummary>, VectorError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(Method::POST, &format!("collections/{collection}/points/query"))?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(collection, error = %error, "Similarity search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().map(map_query_point).collect())
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, VectorError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), VectorError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Vector index request failed");
            Err(error)
        }
    }
}

fn map_query_point(point: QueryPoint) -> ScoredSummary {
    let chunk_id = point
        .payload
        .as_ref()
        .and_then(|payload| payload.get("chunk_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| stringify_point_id(point.id));
    let summary = point
        .payload
        .as_ref()
        .and_then(|payload| payload.get("summary"))
        .and_then(Value::as_str)
        .map(str::to_string);

    ScoredSummary {
        chunk_id,
        score: point.score,
        summary,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}
