//! Client for the layout/OCR partitioning service.
//!
//! Partitioning is an opaque capability reached over HTTP: the engine splits
//! a document into top-level elements (composite narrative blocks grouped by
//! heading and size heuristics, structured tables, embedded images) with
//! page and coordinate metadata. This module ships the file to the engine,
//! decodes the element JSON, and classifies the result into the typed chunk
//! model used by the rest of the pipeline.

use crate::chunk::{ChunkElement, CompositeChunk, ElementMetadata, ImageChunk, TableChunk};
use crate::config::Config;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while partitioning a document.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Document file could not be read from scratch storage.
    #[error("failed to read document file: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP layer failed before receiving a response.
    #[error("partitioner request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Partitioning engine responded with an unexpected status.
    #[error("unexpected partitioner response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the engine.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Chunking policy knobs forwarded to the layout engine.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionOptions {
    /// Hard character ceiling forcing a chunk boundary.
    pub max_characters: usize,
    /// Soft ceiling: a new heading past this size starts a new chunk.
    pub new_after_n_chars: usize,
    /// Fragments below this size merge into the preceding chunk.
    pub combine_text_under_n_chars: usize,
    /// Whether to extract structured tables.
    pub infer_table_structure: bool,
    /// Whether to extract embedded images as base64 payloads.
    pub extract_images: bool,
}

impl PartitionOptions {
    /// Build options from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_characters: config.partition_max_characters,
            new_after_n_chars: config.partition_new_after_n_chars,
            combine_text_under_n_chars: config.partition_combine_under_n_chars,
            infer_table_structure: config.partition_tables,
            extract_images: config.partition_images,
        }
    }
}

/// Category assigned to a top-level element at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementCategory {
    /// Grouped narrative content with nested original elements.
    Composite,
    /// Structured table.
    Table,
    /// Standalone embedded image.
    Image,
    /// Anything else the engine reports; dropped during classification.
    Other,
}

/// A top-level element as returned by the layout engine.
#[derive(Debug, Clone, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    element_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    coordinates: Option<serde_json::Value>,
    #[serde(default)]
    image_base64: Option<String>,
    #[serde(default)]
    text_as_html: Option<String>,
    #[serde(default)]
    orig_elements: Vec<ChunkElement>,
}

impl RawElement {
    /// Category tag for this element.
    pub fn category(&self) -> ElementCategory {
        match self.element_type.as_str() {
            "CompositeElement" => ElementCategory::Composite,
            "Table" => ElementCategory::Table,
            "Image" => ElementCategory::Image,
            _ => ElementCategory::Other,
        }
    }

    fn positional_metadata(&self) -> ElementMetadata {
        ElementMetadata {
            page_number: self.metadata.page_number,
            coordinates: self.metadata.coordinates.clone(),
            image_base64: self.metadata.image_base64.clone(),
            text_as_html: self.metadata.text_as_html.clone(),
        }
    }
}

/// Typed split of a partitioned document.
#[derive(Debug, Default)]
pub struct PartitionOutput {
    /// Composite text chunks in document order.
    pub texts: Vec<CompositeChunk>,
    /// Table chunks in document order.
    pub tables: Vec<TableChunk>,
    /// Embedded image chunks, including images nested inside composites.
    pub images: Vec<ImageChunk>,
}

impl PartitionOutput {
    /// Whether partitioning produced nothing at all. A valid outcome: the
    /// pipeline skips downstream steps for empty categories.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.tables.is_empty() && self.images.is_empty()
    }
}

/// Classify engine elements into the typed chunk model.
///
/// Images embedded inside a composite block are surfaced as standalone image
/// chunks while also remaining part of the composite's sub-elements, so
/// retrieval can expand them in place.
pub fn classify_elements(elements: Vec<RawElement>) -> PartitionOutput {
    let mut output = PartitionOutput::default();

    for element in elements {
        match element.category() {
            ElementCategory::Composite => {
                for nested in &element.metadata.orig_elements {
                    if nested.is_image() && nested.metadata.image_base64.is_some() {
                        output.images.push(ImageChunk {
                            metadata: nested.metadata.clone(),
                        });
                    }
                }
                let sub_elements = if element.metadata.orig_elements.is_empty() {
                    vec![ChunkElement {
                        element_type: "NarrativeText".into(),
                        text: element.text.clone(),
                        metadata: element.positional_metadata(),
                    }]
                } else {
                    element.metadata.orig_elements.clone()
                };
                output.texts.push(CompositeChunk {
                    text: element.text,
                    elements: sub_elements,
                });
            }
            ElementCategory::Table => {
                let metadata = element.positional_metadata();
                output.tables.push(TableChunk {
                    element: ChunkElement {
                        element_type: "Table".into(),
                        text: element.text,
                        metadata,
                    },
                });
            }
            ElementCategory::Image => {
                if element.metadata.image_base64.is_some() {
                    output.images.push(ImageChunk {
                        metadata: element.positional_metadata(),
                    });
                }
            }
            ElementCategory::Other => {
                tracing::trace!(element_type = %element.element_type, "Skipping unclassified element");
            }
        }
    }

    output
}

/// Splits a document file into typed layout elements.
#[async_trait]
pub trait Partitioner: Send + Sync {
    /// Partition the file at `file_path` into top-level elements.
    async fn partition(&self, file_path: &Path) -> Result<Vec<RawElement>, PartitionError>;
}

/// HTTP adapter for the partitioning engine.
pub struct HttpPartitioner {
    client: Client,
    base_url: String,
    options: PartitionOptions,
}

#[derive(Serialize)]
struct PartitionRequest<'a> {
    filename: &'a str,
    content_base64: String,
    #[serde(flatten)]
    options: &'a PartitionOptions,
}

impl HttpPartitioner {
    /// Construct a client for the engine at `base_url`.
    pub fn new(base_url: String, options: PartitionOptions) -> Result<Self, PartitionError> {
        let client = Client::builder().user_agent("ragserve/partition").build()?;
        Ok(Self {
            client,
            base_url,
            options,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/partition", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Partitioner for HttpPartitioner {
    async fn partition(&self, file_path: &Path) -> Result<Vec<RawElement>, PartitionError> {
        let data = tokio::fs::read(file_path).await?;
        let filename = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document");

        tracing::info!(file = filename, bytes = data.len(), "Partitioning document");

        let request = PartitionRequest {
            filename,
            content_base64: BASE64.encode(&data),
            options: &self.options,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = PartitionError::UnexpectedStatus { status, body };
            tracing::error!(file = filename, error = %error, "Partitioner request failed");
            return Err(error);
        }

        let elements: Vec<RawElement> = response.json().await?;
        tracing::debug!(file = filename, elements = elements.len(), "Document partitioned");
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn options() -> PartitionOptions {
        PartitionOptions::from_config(&Config::for_tests())
    }

    fn fixture_elements() -> Vec<RawElement> {
        serde_json::from_value(json!([
            {
                "type": "CompositeElement",
                "text": "Intro paragraph",
                "metadata": {
                    "page_number": 1,
                    "orig_elements": [
                        {"type": "Title", "text": "Intro", "metadata": {"page_number": 1}},
                        {
                            "type": "Image",
                            "text": "",
                            "metadata": {"page_number": 1, "image_base64": "aW1n"}
                        }
                    ]
                }
            },
            {
                "type": "Table",
                "text": "a 1",
                "metadata": {
                    "page_number": 2,
                    "text_as_html": "<table><tr><td>a</td><td>1</td></tr></table>"
                }
            },
            {"type": "PageBreak", "text": "", "metadata": {}}
        ]))
        .expect("fixture decodes")
    }

    #[test]
    fn classification_splits_by_category() {
        let output = classify_elements(fixture_elements());

        assert_eq!(output.texts.len(), 1);
        assert_eq!(output.tables.len(), 1);
        assert_eq!(output.images.len(), 1);

        let composite = &output.texts[0];
        assert_eq!(composite.text, "Intro paragraph");
        assert_eq!(composite.elements.len(), 2);
        assert!(composite.elements[1].is_image());

        assert!(output.tables[0].rendered().starts_with("<table>"));
        assert_eq!(output.images[0].payload(), "aW1n");
    }

    #[test]
    fn composite_without_nested_elements_gets_a_fallback() {
        let elements: Vec<RawElement> = serde_json::from_value(json!([
            {"type": "CompositeElement", "text": "flat", "metadata": {"page_number": 4}}
        ]))
        .expect("fixture decodes");

        let output = classify_elements(elements);
        assert_eq!(output.texts.len(), 1);
        let fallback = &output.texts[0].elements[0];
        assert_eq!(fallback.element_type, "NarrativeText");
        assert_eq!(fallback.metadata.page_number, Some(4));
    }

    #[test]
    fn empty_output_is_valid() {
        let output = classify_elements(Vec::new());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn http_partitioner_posts_file_and_decodes_elements() {
        let server = MockServer::start_async().await;
        let scratch = std::env::temp_dir().join(format!("ragserve-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&scratch, b"%PDF-1.4 fake")
            .await
            .expect("write scratch file");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/partition")
                    .json_body_partial(
                        json!({
                            "max_characters": 10000,
                            "new_after_n_chars": 6000,
                            "combine_text_under_n_chars": 2000
                        })
                        .to_string(),
                    );
                then.status(200).json_body(json!([
                    {"type": "CompositeElement", "text": "hello", "metadata": {"page_number": 1}}
                ]));
            })
            .await;

        let partitioner =
            HttpPartitioner::new(server.base_url(), options()).expect("build partitioner");
        let elements = partitioner.partition(&scratch).await.expect("partition");

        mock.assert();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].category(), ElementCategory::Composite);

        tokio::fs::remove_file(&scratch).await.ok();
    }

    #[tokio::test]
    async fn http_partitioner_surfaces_engine_errors() {
        let server = MockServer::start_async().await;
        let scratch = std::env::temp_dir().join(format!("ragserve-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&scratch, b"broken").await.expect("write");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/partition");
                then.status(422).body("unsupported format");
            })
            .await;

        let partitioner =
            HttpPartitioner::new(server.base_url(), options()).expect("build partitioner");
        let error = partitioner.partition(&scratch).await.expect_err("error");
        assert!(matches!(error, PartitionError::UnexpectedStatus { .. }));

        tokio::fs::remove_file(&scratch).await.ok();
    }
}
