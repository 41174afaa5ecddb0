use serde::Deserialize;
use std::env;
use thiserror::Error;

use crate::queries::{DEFAULT_TABLE_NAME, QueryMap};

/// Errors encountered while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Vector store name does not match any supported backend.
    #[error("Unknown vectorstore backend: {0}")]
    UnknownVectorstore(String),
}

/// How the conversion stage is wired into the host pipeline.
///
/// Mirrors the knobs a pipeline author sets per resource. Credentials are
/// carried here explicitly and handed to the provider clients at
/// construction; nothing is written into the process environment.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Field-name to query mapping; `None` or empty selects the built-in
    /// invoice queries.
    pub queries: Option<QueryMap>,
    /// API key for the OpenAI-compatible provider, when one is used.
    pub openai_api_key: Option<String>,
    /// Vector store backend name, resolved into a backend handle at
    /// configure time.
    pub vectorstore: String,
    /// Destination table declared in the stage contract.
    pub table_name: String,
    /// Answer the queries for each file concurrently instead of one by one.
    pub run_async: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            queries: None,
            openai_api_key: None,
            vectorstore: "chroma".to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            run_async: false,
        }
    }
}

/// Settings for the production extraction engine: providers, models, and
/// backend endpoints.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Provider used for embeddings and completions.
    pub provider: EngineProvider,
    /// API key handed to the OpenAI clients; ignored by other providers.
    pub openai_api_key: Option<String>,
    /// Override for the OpenAI-compatible base URL.
    pub openai_base_url: Option<String>,
    /// Override for the local Ollama endpoint.
    pub ollama_url: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Completion model used to answer queries.
    pub completion_model: String,
    /// Optional override for the automatic chunk size selection.
    pub chunk_size: Option<usize>,
    /// Number of chunks retrieved as context per query.
    pub top_k: usize,
    /// Base name for the per-file indexes created in the backend.
    pub index_name: String,
    /// Chroma endpoint; defaults to a local instance when unset.
    pub chroma_url: Option<String>,
    /// Weaviate endpoint; required when the weaviate backend is selected.
    pub weaviate_url: Option<String>,
    /// Elasticsearch endpoint; required when the elastic_search backend is
    /// selected.
    pub elasticsearch_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: EngineProvider::OpenAi,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            completion_model: "gpt-4o-mini".to_string(),
            chunk_size: None,
            top_k: 4,
            index_name: "docstruct".to_string(),
            chroma_url: None,
            weaviate_url: None,
            elasticsearch_url: None,
        }
    }
}

impl EngineConfig {
    /// Load engine settings from environment variables, falling back to the
    /// defaults for anything unset. Reads a `.env` file when one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let config = Self {
            provider: match load_env_optional("EMBEDDING_PROVIDER") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
                None => defaults.provider,
            },
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL"),
            ollama_url: load_env_optional("OLLAMA_URL"),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or(defaults.completion_model),
            chunk_size: parse_env_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            top_k: parse_env_optional("RETRIEVAL_TOP_K")?.unwrap_or(defaults.top_k),
            index_name: load_env_optional("INDEX_NAME").unwrap_or(defaults.index_name),
            chroma_url: load_env_optional("CHROMA_URL"),
            weaviate_url: load_env_optional("WEAVIATE_URL"),
            elasticsearch_url: load_env_optional("ELASTICSEARCH_URL"),
        };
        tracing::debug!(
            provider = ?config.provider,
            embedding_model = %config.embedding_model,
            embedding_dimension = config.embedding_dimension,
            completion_model = %config.completion_model,
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Return a copy with the API key replaced when the argument carries one.
    pub(crate) fn with_api_key(&self, openai_api_key: Option<String>) -> Self {
        let mut config = self.clone();
        if openai_api_key.is_some() {
            config.openai_api_key = openai_api_key;
        }
        config
    }
}

/// Supported embedding and completion providers for the extraction engine.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineProvider {
    /// Hosted OpenAI-compatible APIs.
    OpenAi,
    /// Local Ollama runtime.
    Ollama,
}

impl std::str::FromStr for EngineProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

pub(crate) fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}
