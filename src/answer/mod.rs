//! Grounded answer assembly from a retrieval bundle.
//!
//! The prompt instructs the model to answer strictly from the supplied
//! context; image items ride as base64 attachments rather than inline text.

use crate::generation::{GenerationClient, GenerationError, GenerationRequest};
use crate::retrieve::{ContentKind, RetrievalBundle};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while generating an answer.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Generation runtime failure.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

const INSTRUCTIONS: &str = "You are an assistant answering questions about a document. \
Use ONLY the context below to answer. If the information needed to answer is not in the \
context, respond with \"Information not available in provided context\". Do not use prior \
knowledge.

Context lines are labeled with their element type: Title and Header are headings, \
NarrativeText and Text are body text, ListItem is a bullet or numbered entry, Table is \
tabular data (possibly as HTML), Formula is a mathematical expression, FigureCaption \
describes a nearby figure, CodeSnippet is programming code, Address is a physical \
address, EmailAddress is an email contact, PageNumber and PageBreak mark pagination, \
Footer is a page footer, and UncategorizedText is any other text. Attached images \
are figures extracted from the document; consult them when the question concerns charts \
or diagrams.

Structure your response in three parts:
Answer: the direct answer to the question.
Supporting Evidence: the context lines or images the answer rests on.
Limitations: anything the context leaves unclear or unanswered.";

/// A fully assembled generation prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Instruction, context, and question text.
    pub text: String,
    /// Base64 image attachments drawn from the bundle.
    pub images: Vec<String>,
}

/// Build the answer prompt from a retrieval bundle and the user's question.
///
/// Text items concatenate in bundle order (pages ascending, discovery order
/// within a page); empty image payloads are dropped.
pub fn build_prompt(bundle: &RetrievalBundle, question: &str) -> Prompt {
    let mut context_lines = Vec::new();
    let mut images = Vec::new();

    for item in bundle.values().flatten() {
        match &item.kind {
            ContentKind::Image => {
                if !item.body.is_empty() {
                    images.push(item.body.clone());
                }
            }
            ContentKind::Text { .. } => {
                if let Some(line) = item.rendered() {
                    context_lines.push(line);
                }
            }
        }
    }

    let context = if context_lines.is_empty() {
        "(no text context)".to_string()
    } else {
        context_lines.join("\n")
    };

    Prompt {
        text: format!("{INSTRUCTIONS}\n\nContext:\n{context}\n\nQuestion: {question}"),
        images,
    }
}

/// Turns a retrieval bundle into a model-generated answer.
pub struct AnswerAssembler {
    client: Arc<dyn GenerationClient>,
}

impl AnswerAssembler {
    /// Build an assembler over the given generation backend.
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    /// Generate an answer for `question` grounded in `bundle`.
    pub async fn answer(
        &self,
        bundle: &RetrievalBundle,
        question: &str,
    ) -> Result<String, AnswerError> {
        let prompt = build_prompt(bundle, question);
        tracing::debug!(
            context_bytes = prompt.text.len(),
            images = prompt.images.len(),
            "Sending answer prompt"
        );
        let answer = self
            .client
            .generate(GenerationRequest {
                prompt: prompt.text,
                images: prompt.images,
            })
            .await?;
        Ok(answer)
    }
}
