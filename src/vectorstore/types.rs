//! Shared types used by the vector store backends.

use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors returned while interacting with a vector store backend.
#[derive(Debug, Error)]
pub enum VectorstoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected {backend} response ({status}): {body}")]
    UnexpectedStatus {
        /// Backend that produced the response.
        backend: &'static str,
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Prepared chunk ready for indexing, including text, hash, and vector.
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    /// Raw chunk text.
    pub text: String,
    /// Deterministic hash of the chunk used as its stable identifier.
    pub chunk_hash: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Scored chunk returned by a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Stored chunk text.
    pub text: String,
    /// Similarity score, higher is better across all backends.
    pub score: f32,
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for indexed payloads.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
