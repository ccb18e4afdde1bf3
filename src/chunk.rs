//! Typed chunk data model shared by the partitioner, the chunk store, and the
//! retriever.
//!
//! Every chunk carries an explicit [`ChunkKind`] tag assigned at creation
//! time; downstream code branches on the tag, never on runtime type names.
//! The persisted content format mirrors the layout engine's element shape:
//! text/table chunks serialize their nested sub-elements, image chunks
//! serialize a single metadata record carrying the base64 payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Kind of content held by a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Composite narrative content, possibly with nested sub-elements.
    Text,
    /// Structured tabular content with a rendered HTML representation.
    Table,
    /// Embedded image, payload stored as base64.
    Image,
}

impl ChunkKind {
    /// Stable lowercase name used in persistence and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Image => "image",
        }
    }
}

impl std::str::FromStr for ChunkKind {
    type Err = ChunkContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            "image" => Ok(Self::Image),
            other => Err(ChunkContentError::UnknownKind(other.to_string())),
        }
    }
}

/// Errors raised while decoding persisted chunk content.
#[derive(Debug, Error)]
pub enum ChunkContentError {
    /// Stored kind column did not match a known chunk kind.
    #[error("unknown chunk kind: {0}")]
    UnknownKind(String),
    /// Stored content payload was not valid JSON for its kind.
    #[error("malformed chunk content: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Positional and payload metadata attached to a document element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    /// Page the element was found on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Layout coordinates as reported by the partitioning engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Value>,
    /// Base64 image payload, present on image elements only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    /// Rendered HTML representation, present on table elements only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_as_html: Option<String>,
}

/// A single sub-element of a composite chunk.
///
/// The `type` field keeps the layout engine's element vocabulary
/// (`NarrativeText`, `Title`, `Table`, `Image`, ...) because the answer
/// prompt surfaces it verbatim to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkElement {
    /// Element type name from the layout engine vocabulary.
    #[serde(rename = "type")]
    pub element_type: String,
    /// Plain-text rendering of the element.
    #[serde(default)]
    pub text: String,
    /// Positional metadata inherited by retrieval output.
    #[serde(default)]
    pub metadata: ElementMetadata,
}

impl ChunkElement {
    /// Whether this sub-element is an embedded image.
    pub fn is_image(&self) -> bool {
        self.element_type == "Image"
    }
}

/// Composite text chunk grouping narrative content and its original elements.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeChunk {
    /// Concatenated narrative text used for summarization.
    pub text: String,
    /// Original sub-elements preserved for retrieval expansion.
    pub elements: Vec<ChunkElement>,
}

impl CompositeChunk {
    /// Serialize the nested sub-elements as the persisted content payload.
    pub fn content_json(&self) -> Result<String, ChunkContentError> {
        Ok(serde_json::to_string(&self.elements)?)
    }
}

/// Table chunk retaining the rendered representation used for summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct TableChunk {
    /// The table element as reported by the layout engine.
    pub element: ChunkElement,
}

impl TableChunk {
    /// Rendered table text handed to the summarizer; HTML when available.
    pub fn rendered(&self) -> &str {
        self.element
            .metadata
            .text_as_html
            .as_deref()
            .unwrap_or(&self.element.text)
    }

    /// Serialize the table as a one-element sub-element sequence.
    pub fn content_json(&self) -> Result<String, ChunkContentError> {
        Ok(serde_json::to_string(&[&self.element])?)
    }
}

/// Embedded image chunk extracted from the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageChunk {
    /// Metadata record carrying the base64 payload and position.
    pub metadata: ElementMetadata,
}

impl ImageChunk {
    /// Base64 payload of the image, empty when the engine omitted it.
    pub fn payload(&self) -> &str {
        self.metadata.image_base64.as_deref().unwrap_or("")
    }

    /// Serialize the image as a single metadata record.
    pub fn content_json(&self) -> Result<String, ChunkContentError> {
        Ok(serde_json::to_string(
            &serde_json::json!({ "metadata": self.metadata }),
        )?)
    }
}

/// A chunk record as persisted by the chunk store.
///
/// `chunk_id` is assigned at ingestion time, globally unique, and doubles as
/// the join key into the summary vector index. Records are immutable once
/// written.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Opaque unique token identifying the chunk.
    pub chunk_id: String,
    /// Document the chunk belongs to.
    pub document_id: i64,
    /// Content kind tag.
    pub kind: ChunkKind,
    /// Serialized content payload (see module docs for the per-kind shape).
    pub content: String,
    /// Hex SHA-256 of the content payload.
    pub content_hash: String,
}

impl ChunkRecord {
    /// Build a record, computing the content hash.
    pub fn new(chunk_id: String, document_id: i64, kind: ChunkKind, content: String) -> Self {
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));
        Self {
            chunk_id,
            document_id,
            kind,
            content,
            content_hash,
        }
    }

    /// Decode the sub-element sequence of a text/table record.
    pub fn decode_elements(&self) -> Result<Vec<ChunkElement>, ChunkContentError> {
        Ok(serde_json::from_str(&self.content)?)
    }

    /// Decode the metadata record of an image chunk.
    pub fn decode_image(&self) -> Result<ElementMetadata, ChunkContentError> {
        #[derive(Deserialize)]
        struct ImageContent {
            #[serde(default)]
            metadata: ElementMetadata,
        }
        let decoded: ImageContent = serde_json::from_str(&self.content)?;
        Ok(decoded.metadata)
    }
}
