//! Elasticsearch backend using the dense-vector kNN search API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::http::{format_endpoint, normalize_base_url};
use crate::vectorstore::VectorIndex;
use crate::vectorstore::types::{
    ChunkInsert, ScoredChunk, VectorstoreError, current_timestamp_rfc3339,
};

const BACKEND: &str = "elastic_search";

/// Index handle for an Elasticsearch cluster.
pub struct ElasticIndex {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_score", default)]
    score: f32,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    #[serde(default)]
    text: String,
}

impl ElasticIndex {
    /// Construct a new handle against the given base URL.
    pub fn new(base_url: &str) -> Result<Self, VectorstoreError> {
        let client = Client::builder().user_agent("docstruct/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(VectorstoreError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized Elasticsearch HTTP client");
        Ok(Self { client, base_url })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, VectorstoreError> {
        let response = self
            .client
            .head(format_endpoint(&self.base_url, index))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorstoreError::UnexpectedStatus {
                    backend: BACKEND,
                    status,
                    body,
                };
                tracing::error!(index, error = %error, "Index existence check failed");
                Err(error)
            }
        }
    }

    async fn create_index(&self, index: &str, dimension: usize) -> Result<(), VectorstoreError> {
        let body = json!({
            "mappings": {
                "properties": {
                    "text": { "type": "text" },
                    "chunk_hash": { "type": "keyword" },
                    "vector": {
                        "type": "dense_vector",
                        "dims": dimension,
                        "index": true,
                        "similarity": "cosine",
                    },
                    "indexed_at": { "type": "date" },
                },
            },
        });
        let response = self
            .client
            .put(format_endpoint(&self.base_url, index))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorstoreError::UnexpectedStatus {
                backend: BACKEND,
                status,
                body,
            };
            tracing::error!(index, error = %error, "Failed to create index");
            return Err(error);
        }

        tracing::debug!(index, dimension, "Elasticsearch index created");
        Ok(())
    }
}

/// Adapt a scope name to Elasticsearch's index naming rules (lowercase only).
fn index_name(scope: &str) -> String {
    scope.to_lowercase()
}

#[async_trait]
impl VectorIndex for ElasticIndex {
    async fn ensure_index(&self, scope: &str, dimension: usize) -> Result<(), VectorstoreError> {
        let index = index_name(scope);
        if self.index_exists(&index).await? {
            return Ok(());
        }
        self.create_index(&index, dimension).await
    }

    async fn index_chunks(
        &self,
        scope: &str,
        chunks: Vec<ChunkInsert>,
    ) -> Result<(), VectorstoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let index = index_name(scope);
        let now = current_timestamp_rfc3339();
        let chunk_count = chunks.len();
        for chunk in chunks {
            let response = self
                .client
                .put(format_endpoint(
                    &self.base_url,
                    &format!("{index}/_doc/{}", chunk.chunk_hash),
                ))
                .query(&[("refresh", "true")])
                .json(&json!({
                    "text": chunk.text,
                    "chunk_hash": chunk.chunk_hash,
                    "vector": chunk.vector,
                    "indexed_at": now,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = VectorstoreError::UnexpectedStatus {
                    backend: BACKEND,
                    status,
                    body,
                };
                tracing::error!(index, error = %error, "Elasticsearch document upsert failed");
                return Err(error);
            }
        }

        tracing::debug!(index, chunks = chunk_count, "Chunks indexed");
        Ok(())
    }

    async fn search(
        &self,
        scope: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorstoreError> {
        let index = index_name(scope);
        let response = self
            .client
            .post(format_endpoint(&self.base_url, &format!("{index}/_search")))
            .json(&json!({
                "knn": {
                    "field": "vector",
                    "query_vector": vector,
                    "k": limit,
                    "num_candidates": limit * 4,
                },
                "_source": ["text"],
                "size": limit,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorstoreError::UnexpectedStatus {
                backend: BACKEND,
                status,
                body,
            };
            tracing::error!(index, error = %error, "Elasticsearch search failed");
            return Err(error);
        }

        let payload: SearchResponse = response.json().await?;
        let results = payload
            .hits
            .hits
            .into_iter()
            .map(|hit| ScoredChunk {
                text: hit.source.text,
                score: hit.score,
            })
            .collect();
        Ok(results)
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}
