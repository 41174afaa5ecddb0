//! Extraction service coordinating loading, chunking, embedding, and answering.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};

use crate::config::{ConfigError, EngineConfig, EngineProvider};
use crate::embedding::{EmbeddingClient, OllamaEmbeddingClient, OpenAiEmbeddingClient};
use crate::llm::{CompletionClient, OllamaCompletionClient, OpenAiCompletionClient};
use crate::loader::load_document;
use crate::queries::QueryMap;
use crate::vectorstore::{ChunkInsert, VectorIndex, Vectorstore, compute_chunk_hash};

use super::chunking::{chunk_text, determine_chunk_size};
use super::prompt::answer_prompt;
use super::types::ExtractionError;

/// Coordinates the full extraction pipeline for a single file: loading,
/// semantic chunking, embedding, indexing, retrieval, and query answering.
///
/// The extractor owns long-lived handles to the embedding client, completion
/// client, and vector index so that every file processed by a stage reuses the
/// same components. Construct it once near process start and share it through
/// an `Arc`.
pub struct DocumentExtractor {
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    completion_client: Box<dyn CompletionClient + Send + Sync>,
    index: Box<dyn VectorIndex + Send + Sync>,
    provider: EngineProvider,
    embedding_model: String,
    embedding_dimension: usize,
    chunk_size: Option<usize>,
    top_k: usize,
    index_name: String,
}

/// Abstraction over the extraction engine used by the conversion stage.
#[async_trait]
pub trait ExtractionApi: Send + Sync {
    /// Index the file, then answer every query one at a time.
    async fn extract(
        &self,
        file_path: &str,
        queries: &QueryMap,
    ) -> Result<BTreeMap<String, String>, ExtractionError>;

    /// Index the file, then answer all queries with their retrieval and
    /// completion calls overlapping.
    async fn extract_concurrent(
        &self,
        file_path: &str,
        queries: &QueryMap,
    ) -> Result<BTreeMap<String, String>, ExtractionError>;
}

impl DocumentExtractor {
    /// Build an extractor from explicit components.
    pub fn new(
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        completion_client: Box<dyn CompletionClient + Send + Sync>,
        index: Box<dyn VectorIndex + Send + Sync>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            embedding_client,
            completion_client,
            index,
            provider: config.provider,
            embedding_model: config.embedding_model.clone(),
            embedding_dimension: config.embedding_dimension,
            chunk_size: config.chunk_size,
            top_k: config.top_k,
            index_name: config.index_name.clone(),
        }
    }

    /// Build an extractor with provider clients and the vector index resolved
    /// from configuration.
    pub fn from_config(
        vectorstore: Vectorstore,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        let embedding_client: Box<dyn EmbeddingClient + Send + Sync>;
        let completion_client: Box<dyn CompletionClient + Send + Sync>;
        match config.provider {
            EngineProvider::OpenAi => {
                embedding_client = Box::new(
                    OpenAiEmbeddingClient::new(
                        config.openai_base_url.as_deref(),
                        config.openai_api_key.clone(),
                        config.embedding_model.clone(),
                    )
                    .map_err(|_| ConfigError::InvalidValue("OPENAI_BASE_URL".to_string()))?,
                );
                completion_client = Box::new(
                    OpenAiCompletionClient::new(
                        config.openai_base_url.as_deref(),
                        config.openai_api_key.clone(),
                        config.completion_model.clone(),
                    )
                    .map_err(|_| ConfigError::InvalidValue("OPENAI_BASE_URL".to_string()))?,
                );
            }
            EngineProvider::Ollama => {
                embedding_client = Box::new(
                    OllamaEmbeddingClient::new(
                        config.ollama_url.as_deref(),
                        config.embedding_model.clone(),
                    )
                    .map_err(|_| ConfigError::InvalidValue("OLLAMA_URL".to_string()))?,
                );
                completion_client = Box::new(
                    OllamaCompletionClient::new(
                        config.ollama_url.as_deref(),
                        config.completion_model.clone(),
                    )
                    .map_err(|_| ConfigError::InvalidValue("OLLAMA_URL".to_string()))?,
                );
            }
        }

        let index = vectorstore.connect(config)?;
        Ok(Self::new(embedding_client, completion_client, index, config))
    }

    /// Index the file, then answer every query in order.
    pub async fn extract(
        &self,
        file_path: &str,
        queries: &QueryMap,
    ) -> Result<BTreeMap<String, String>, ExtractionError> {
        tracing::info!(file = file_path, queries = queries.len(), "Extracting fields");
        let scope = self.prepare(file_path).await?;

        let mut fields = BTreeMap::new();
        for (field, query) in queries {
            let value = self.answer(&scope, query).await?;
            fields.insert(field.clone(), value);
        }
        Ok(fields)
    }

    /// Index the file, then answer all queries concurrently.
    pub async fn extract_concurrent(
        &self,
        file_path: &str,
        queries: &QueryMap,
    ) -> Result<BTreeMap<String, String>, ExtractionError> {
        tracing::info!(
            file = file_path,
            queries = queries.len(),
            "Extracting fields concurrently"
        );
        let scope = self.prepare(file_path).await?;

        let answer_futures: Vec<_> = queries
            .iter()
            .map(|(field, query)| {
                let scope = scope.clone();
                async move {
                    let value = self.answer(&scope, query).await?;
                    Ok::<_, ExtractionError>((field.clone(), value))
                }
            })
            .collect();

        stream::iter(answer_futures)
            .buffer_unordered(queries.len().max(1))
            .try_collect()
            .await
    }

    /// Load, chunk, embed, and index the file, returning the scope name the
    /// chunks were indexed under.
    async fn prepare(&self, file_path: &str) -> Result<String, ExtractionError> {
        let text = load_document(Path::new(file_path))?;

        let chunk_size = determine_chunk_size(self.chunk_size, self.provider, &self.embedding_model);
        tracing::debug!(
            file = file_path,
            chunk_size,
            provider = ?self.provider,
            model = %self.embedding_model,
            "Derived chunk size"
        );
        let chunks = chunk_text(&text, chunk_size, self.provider, &self.embedding_model)?;
        if chunks.is_empty() {
            return Err(ExtractionError::EmptyDocument {
                path: file_path.to_string(),
            });
        }

        let texts = chunks.clone();
        let embeddings = self.embedding_client.embed(texts).await?;
        debug_assert_eq!(chunks.len(), embeddings.len());

        let inserts: Vec<ChunkInsert> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(text, vector)| ChunkInsert {
                chunk_hash: compute_chunk_hash(&text),
                text,
                vector,
            })
            .collect();

        let scope = self.scope_for(&text);
        self.index
            .ensure_index(&scope, self.embedding_dimension)
            .await?;
        let chunk_count = inserts.len();
        self.index.index_chunks(&scope, inserts).await?;
        tracing::debug!(
            file = file_path,
            backend = self.index.name(),
            scope = %scope,
            chunks = chunk_count,
            "Document indexed"
        );

        Ok(scope)
    }

    /// Answer one query from the chunks indexed under `scope`.
    async fn answer(&self, scope: &str, query: &str) -> Result<String, ExtractionError> {
        let mut vectors = self
            .embedding_client
            .embed(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(ExtractionError::EmptyEmbedding)?;

        let hits = self.index.search(scope, vector, self.top_k).await?;
        let contexts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
        let prompt = answer_prompt(query, &contexts);
        let completion = self.completion_client.complete(&prompt).await?;
        Ok(completion.trim().to_string())
    }

    /// Scope name for the per-file index: the configured prefix plus a short
    /// digest of the document text, so one file's chunks never answer another
    /// file's queries.
    fn scope_for(&self, text: &str) -> String {
        let digest = compute_chunk_hash(text);
        format!("{}_{}", self.index_name, &digest[..12])
    }
}

#[async_trait]
impl ExtractionApi for DocumentExtractor {
    async fn extract(
        &self,
        file_path: &str,
        queries: &QueryMap,
    ) -> Result<BTreeMap<String, String>, ExtractionError> {
        DocumentExtractor::extract(self, file_path, queries).await
    }

    async fn extract_concurrent(
        &self,
        file_path: &str,
        queries: &QueryMap,
    ) -> Result<BTreeMap<String, String>, ExtractionError> {
        DocumentExtractor::extract_concurrent(self, file_path, queries).await
    }
}
