//! Embedding client abstraction and adapters.

use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::http::{format_endpoint, normalize_base_url};

/// Default endpoint for the hosted OpenAI embeddings API.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    Generation(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected embeddings response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embedding client for the OpenAI embeddings API and compatible runtimes.
pub struct OpenAiEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiEmbeddingClient {
    /// Construct a client against the given base URL, or the hosted API when
    /// `base_url` is `None`.
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().user_agent("docstruct/0.1").build()?;
        let base_url = normalize_base_url(base_url.unwrap_or(DEFAULT_OPENAI_BASE_URL))
            .map_err(EmbeddingError::Generation)?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::Generation("no texts provided".to_string()));
        }

        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting embeddings");

        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let mut request = self
            .client
            .post(format_endpoint(&self.base_url, "embeddings"))
            .json(&body);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Embeddings request failed");
            return Err(error);
        }

        let payload: EmbeddingsResponse = response.json().await?;
        let mut rows = payload.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client against the given Ollama endpoint, or the local
    /// default when `url` is `None`.
    pub fn new(url: Option<&str>, model: impl Into<String>) -> Result<Self, EmbeddingError> {
        let ollama = match url {
            Some(url) => Ollama::try_new(url)
                .map_err(|err| EmbeddingError::Generation(format!("invalid Ollama URL: {err}")))?,
            None => Ollama::default(),
        };
        Ok(Self {
            ollama,
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::Generation("no texts provided".to_string()));
        }

        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting Ollama embeddings");

        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|err| EmbeddingError::Generation(err.to_string()))?;
        Ok(response.embeddings)
    }
}

/// Deterministic offline embedding client.
///
/// Hashes the text bytes into a fixed-dimension normalized vector. Useful in
/// tests and for hosts that want the pipeline shape without a live provider;
/// wire it into [`crate::extraction::DocumentExtractor::new`] explicitly.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct a client producing vectors of the given dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::Generation(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingError::Generation("no texts provided".to_string()));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
