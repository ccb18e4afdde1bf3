#![deny(missing_docs)]

//! Core library for the ragserve document question-answering service.

/// Prompt assembly and answer generation from retrieval bundles.
pub mod answer;
/// HTTP routing and REST handlers.
pub mod api;
/// Typed chunk data model shared across the pipeline.
pub mod chunk;
/// Environment-driven configuration management.
pub mod config;
/// DOCX to PDF conversion via a headless LibreOffice subprocess.
pub mod convert;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Opaque text/vision generation client.
pub mod generation;
/// Lock-guarded ingestion pipeline and background job queue.
pub mod ingest;
/// TTL-based per-document processing locks.
pub mod lock;
/// Structured logging and tracing setup.
pub mod logging;
/// Layout-engine client producing typed document chunks.
pub mod partition;
/// Query dispatch tying retrieval, generation, and ingestion together.
pub mod qa;
/// Similarity search and original-content hydration.
pub mod retrieve;
/// Document and chunk persistence.
pub mod store;
/// Bounded-concurrency chunk summarization.
pub mod summarize;
/// Summary vector index integration.
pub mod vector;
