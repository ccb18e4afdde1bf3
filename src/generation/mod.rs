//! Opaque generation client used for summarization and answering.
//!
//! The language model is an external collaborator; this module issues HTTP
//! requests in the Ollama wire format and returns raw text. Image attachments
//! ride along as base64 payloads for multimodal prompts.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the generation runtime.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Runtime was unreachable; callers may retry.
    #[error("generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Runtime returned an error response.
    #[error("failed to generate output: {0}")]
    GenerationFailed(String),
    /// Runtime response could not be parsed.
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

/// A single generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Prompt text assembled by the caller.
    pub prompt: String,
    /// Base64 image attachments for multimodal prompts.
    pub images: Vec<String>,
}

impl GenerationRequest {
    /// Text-only request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run one generation call and return the raw text output.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Ollama-backed generation client.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationClient {
    /// Construct a client for the runtime at `base_url` using `model`.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("ragserve/generation")
            .build()
            .map_err(|error| GenerationError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": 0.2,
            }
        });
        if !request.images.is_empty() {
            payload["images"] = json!(request.images);
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach generation runtime at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "generation endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "generation runtime returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "generation response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
