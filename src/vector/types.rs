//! Shared types used by the summary index client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the similarity index.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Base URL failed to parse or normalize.
    #[error("invalid vector index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("vector index request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Index responded with an unexpected status code.
    #[error("unexpected vector index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// A summary entry ready for upsert: the chunk id is both the point id and
/// the join key back into the chunk store.
#[derive(Debug, Clone)]
pub struct SummaryPoint {
    /// Chunk id the summary stands for.
    pub chunk_id: String,
    /// Generated summary text stored as payload.
    pub summary: String,
    /// Embedding of the summary text.
    pub vector: Vec<f32>,
}

/// Scored candidate returned by a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredSummary {
    /// Chunk id carried in the point payload.
    pub chunk_id: String,
    /// Similarity score computed by the index.
    pub score: f32,
    /// Stored summary text, if available.
    pub summary: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
