//! Vector store backends used by the extraction engine.
//!
//! The backend is chosen by name when the stage is configured and resolved
//! into a [`VectorIndex`] handle right there, so a misspelled name or a
//! missing endpoint URL fails before any file is touched. Each backend keeps
//! chunk identifiers deterministic from the chunk hash, making re-indexing of
//! unchanged content an upsert instead of a duplicate.

pub mod chroma;
pub mod elastic;
pub mod types;
pub mod weaviate;

use async_trait::async_trait;

use crate::config::{ConfigError, EngineConfig};

pub use types::{ChunkInsert, ScoredChunk, VectorstoreError, compute_chunk_hash};

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vectorstore {
    /// Chroma, reached over its REST API.
    Chroma,
    /// Weaviate, reached over its REST and GraphQL APIs.
    Weaviate,
    /// Elasticsearch with dense-vector kNN search.
    ElasticSearch,
}

impl std::str::FromStr for Vectorstore {
    type Err = ();

    // Exact match, no case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chroma" => Ok(Self::Chroma),
            "weaviate" => Ok(Self::Weaviate),
            "elastic_search" => Ok(Self::ElasticSearch),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Vectorstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Chroma => "chroma",
            Self::Weaviate => "weaviate",
            Self::ElasticSearch => "elastic_search",
        };
        f.write_str(name)
    }
}

impl Vectorstore {
    /// Resolve the backend into a live index handle.
    ///
    /// Chroma falls back to a local default endpoint; weaviate and
    /// elastic_search require their endpoint URLs to be configured.
    pub fn connect(
        self,
        config: &EngineConfig,
    ) -> Result<Box<dyn VectorIndex + Send + Sync>, ConfigError> {
        match self {
            Self::Chroma => {
                let url = config
                    .chroma_url
                    .as_deref()
                    .unwrap_or(chroma::DEFAULT_CHROMA_URL);
                let index = chroma::ChromaIndex::new(url)
                    .map_err(|_| ConfigError::InvalidValue("CHROMA_URL".to_string()))?;
                Ok(Box::new(index))
            }
            Self::Weaviate => {
                let url = config
                    .weaviate_url
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingVariable("WEAVIATE_URL".to_string()))?;
                let index = weaviate::WeaviateIndex::new(url)
                    .map_err(|_| ConfigError::InvalidValue("WEAVIATE_URL".to_string()))?;
                Ok(Box::new(index))
            }
            Self::ElasticSearch => {
                let url = config.elasticsearch_url.as_deref().ok_or_else(|| {
                    ConfigError::MissingVariable("ELASTICSEARCH_URL".to_string())
                })?;
                let index = elastic::ElasticIndex::new(url)
                    .map_err(|_| ConfigError::InvalidValue("ELASTICSEARCH_URL".to_string()))?;
                Ok(Box::new(index))
            }
        }
    }
}

/// Interface implemented by vector store backends.
///
/// `scope` names the per-file index the chunks live in; each backend adapts
/// it to its own naming rules.
#[async_trait]
pub trait VectorIndex {
    /// Create the scoped index when it does not already exist.
    async fn ensure_index(&self, scope: &str, dimension: usize) -> Result<(), VectorstoreError>;

    /// Insert or update chunks under the given scope.
    async fn index_chunks(
        &self,
        scope: &str,
        chunks: Vec<ChunkInsert>,
    ) -> Result<(), VectorstoreError>;

    /// Similarity search returning the best matching chunks, best first.
    async fn search(
        &self,
        scope: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorstoreError>;

    /// Stable backend name used in logs.
    fn name(&self) -> &'static str;
}
