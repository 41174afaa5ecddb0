#![deny(missing_docs)]

//! Core library for the docstruct conversion stage.
//!
//! Docstruct turns a stream of file references into structured, deduplicated
//! records by applying named natural-language queries to each file's content
//! through an embedding-backed extraction engine.

/// Environment-driven configuration management.
pub mod config;
/// Conversion stage turning file references into structured records.
pub mod convert;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Extraction engine: chunking, indexing, retrieval, and query answering.
pub mod extraction;
mod http;
/// Completion client abstraction and adapters.
pub mod llm;
/// Plain-text loaders for the supported file formats.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Conversion metrics helpers.
pub mod metrics;
/// Built-in query sets and query map types.
pub mod queries;
/// Vector store backends and backend selection.
pub mod vectorstore;
