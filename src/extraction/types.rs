//! Core data types and error definitions for the extraction engine.

use anyhow::Error as TokenizerError;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::llm::CompletionError;
use crate::loader::LoaderError;
use crate::vectorstore::VectorstoreError;

/// Errors produced while turning raw text into semantic chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Extraction configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the document extraction pipeline.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No loader handles the file's format. Callers may treat this variant
    /// as a per-file skip; every other variant is fatal.
    #[error("File {path} has unsupported format: {reason}")]
    UnsupportedFormat {
        /// Path of the offending file.
        path: String,
        /// Human-readable description of the rejected format.
        reason: String,
    },
    /// Reading or parsing the file failed.
    #[error("Failed to load document: {0}")]
    Load(#[source] LoaderError),
    /// Document contained no extractable text.
    #[error("Document {path} contains no extractable text")]
    EmptyDocument {
        /// Path of the empty document.
        path: String,
    },
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// Language model failed to answer a query.
    #[error("Failed to generate completion: {0}")]
    Completion(#[from] CompletionError),
    /// Vector store interaction failed during indexing or retrieval.
    #[error("Vector store request failed: {0}")]
    Index(#[from] VectorstoreError),
}

impl From<LoaderError> for ExtractionError {
    fn from(error: LoaderError) -> Self {
        match error {
            LoaderError::UnsupportedFormat { path, extension } => Self::UnsupportedFormat {
                path,
                reason: format!("no loader registered for extension '{extension}'"),
            },
            other => Self::Load(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_maps_to_skippable_variant() {
        let error = ExtractionError::from(LoaderError::UnsupportedFormat {
            path: "scan.png".to_string(),
            extension: "png".to_string(),
        });
        match error {
            ExtractionError::UnsupportedFormat { path, reason } => {
                assert_eq!(path, "scan.png");
                assert!(reason.contains("png"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn io_failures_map_to_fatal_load_variant() {
        let error = ExtractionError::from(LoaderError::Io {
            path: "missing.txt".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
        assert!(matches!(error, ExtractionError::Load(_)));
    }
}
