//! Completion client abstraction and adapters.

use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::embedding::DEFAULT_OPENAI_BASE_URL;
use crate::http::{format_endpoint, normalize_base_url};

/// Errors raised by completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider was unable to produce a completion for the prompt.
    #[error("Failed to generate completion: {0}")]
    Generation(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected completion response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a response without any choices.
    #[error("Completion response contained no choices")]
    EmptyResponse,
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait CompletionClient {
    /// Produce a completion for the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Completion client for the OpenAI chat API and compatible runtimes.
pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompletionClient {
    /// Construct a client against the given base URL, or the hosted API when
    /// `base_url` is `None`.
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder().user_agent("docstruct/0.1").build()?;
        let base_url = normalize_base_url(base_url.unwrap_or(DEFAULT_OPENAI_BASE_URL))
            .map_err(CompletionError::Generation)?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Requesting completion");

        // Temperature pinned to zero so repeated runs extract the same values.
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0,
        });
        let mut request = self
            .client
            .post(format_endpoint(&self.base_url, "chat/completions"))
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
            let error = CompletionError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Completion request failed");
            return Err(error);
        }

        let payload: ChatResponse = response.json().await?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyResponse)?;
        Ok(choice.message.content)
    }
}

/// Completion client backed by a local Ollama runtime.
pub struct OllamaCompletionClient {
    ollama: Ollama,
    model: String,
}

impl OllamaCompletionClient {
    /// Construct a client against the given Ollama endpoint, or the local
    /// default when `url` is `None`.
    pub fn new(url: Option<&str>, model: impl Into<String>) -> Result<Self, CompletionError> {
        let ollama = match url {
            Some(url) => Ollama::try_new(url)
                .map_err(|err| CompletionError::Generation(format!("invalid Ollama URL: {err}")))?,
            None => Ollama::default(),
        };
        Ok(Self {
            ollama,
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Requesting Ollama completion");

        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        let response = self
            .ollama
            .generate(request)
            .await
            .map_err(|err| CompletionError::Generation(err.to_string()))?;
        Ok(response.response)
    }
}
