//! Extraction engine: loading, chunking, embedding, retrieval, and answering.

pub mod chunking;
pub mod prompt;
mod service;
pub mod types;

pub use service::{DocumentExtractor, ExtractionApi};
pub use types::{ChunkingError, ExtractionError};
