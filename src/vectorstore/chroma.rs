//! Chroma backend speaking the REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::http::{format_endpoint, normalize_base_url};
use crate::vectorstore::VectorIndex;
use crate::vectorstore::types::{
    ChunkInsert, ScoredChunk, VectorstoreError, current_timestamp_rfc3339,
};

/// Endpoint used when no Chroma URL is configured.
pub const DEFAULT_CHROMA_URL: &str = "http://127.0.0.1:8000";

const BACKEND: &str = "chroma";

/// Index handle for a Chroma instance.
pub struct ChromaIndex {
    client: Client,
    base_url: String,
}

impl ChromaIndex {
    /// Construct a new handle against the given base URL.
    pub fn new(base_url: &str) -> Result<Self, VectorstoreError> {
        let client = Client::builder().user_agent("docstruct/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(VectorstoreError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized Chroma HTTP client");
        Ok(Self { client, base_url })
    }

    /// Resolve a collection name to its identifier, creating it when missing.
    async fn get_or_create_collection(&self, name: &str) -> Result<String, VectorstoreError> {
        let body = json!({
            "name": name,
            "get_or_create": true,
        });
        let response = self
            .client
            .post(format_endpoint(&self.base_url, "api/v1/collections"))
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
            tracing::error!(collection = name, error = %error, "Failed to resolve collection");
            return Err(error);
        }

        let payload: CollectionResponse = response.json().await?;
        Ok(payload.id)
    }
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<String>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn ensure_index(&self, scope: &str, _dimension: usize) -> Result<(), VectorstoreError> {
        let id = self.get_or_create_collection(scope).await?;
        tracing::debug!(collection = scope, id = %id, "Chroma collection ensured");
        Ok(())
    }

    async fn index_chunks(
        &self,
        scope: &str,
        chunks: Vec<ChunkInsert>,
    ) -> Result<(), VectorstoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let id = self.get_or_create_collection(scope).await?;
        let now = current_timestamp_rfc3339();
        let chunk_count = chunks.len();

        let mut ids = Vec::with_capacity(chunk_count);
        let mut embeddings = Vec::with_capacity(chunk_count);
        let mut documents = Vec::with_capacity(chunk_count);
        let mut metadatas = Vec::with_capacity(chunk_count);
        for chunk in chunks {
            ids.push(chunk.chunk_hash.clone());
            embeddings.push(chunk.vector);
            documents.push(chunk.text);
            metadatas.push(json!({
                "chunk_hash": chunk.chunk_hash,
                "indexed_at": now,
            }));
        }

        let body = json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        let response = self
            .client
            .post(format_endpoint(
                &self.base_url,
                &format!("api/v1/collections/{id}/upsert"),
            ))
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
            tracing::error!(collection = scope, error = %error, "Chroma upsert failed");
            return Err(error);
        }

        tracing::debug!(collection = scope, chunks = chunk_count, "Chunks indexed");
        Ok(())
    }

    async fn search(
        &self,
        scope: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorstoreError> {
        let id = self.get_or_create_collection(scope).await?;
        let body = json!({
            "query_embeddings": [vector],
            "n_results": limit,
            "include": ["documents", "distances"],
        });
        let response = self
            .client
            .post(format_endpoint(
                &self.base_url,
                &format!("api/v1/collections/{id}/query"),
            ))
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
            tracing::error!(collection = scope, error = %error, "Chroma query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let documents = payload.documents.into_iter().next().unwrap_or_default();
        let distances = payload.distances.into_iter().next().unwrap_or_default();

        // Chroma reports distances, lower is closer.
        let results = documents
            .into_iter()
            .zip(distances)
            .map(|(text, distance)| ScoredChunk {
                text,
                score: 1.0 - distance,
            })
            .collect();
        Ok(results)
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn index_chunks_upserts_with_hash_ids() {
        let server = MockServer::start_async().await;

        let collection = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/collections")
                    .body_contains("\"get_or_create\":true");
                then.status(200)
                    .json_body(json!({ "id": "col-1", "name": "invoices_ab12" }));
            })
            .await;

        let upsert = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/collections/col-1/upsert")
                    .body_contains("\"ids\":[\"hash-a\"]");
                then.status(200).json_body(json!(true));
            })
            .await;

        let index = ChromaIndex::new(&server.base_url()).expect("client");
        index
            .index_chunks(
                "invoices_ab12",
                vec![ChunkInsert {
                    text: "Invoice from Acme".to_string(),
                    chunk_hash: "hash-a".to_string(),
                    vector: vec![0.1, 0.2],
                }],
            )
            .await
            .expect("upsert");

        collection.assert();
        upsert.assert();
    }

    #[tokio::test]
    async fn search_maps_documents_and_flips_distances() {
        let server = MockServer::start_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections");
                then.status(200)
                    .json_body(json!({ "id": "col-1", "name": "invoices_ab12" }));
            })
            .await;

        let query = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/collections/col-1/query")
                    .body_contains("\"n_results\":2");
                then.status(200).json_body(json!({
                    "ids": [["hash-a", "hash-b"]],
                    "documents": [["first chunk", "second chunk"]],
                    "distances": [[0.1, 0.4]]
                }));
            })
            .await;

        let index = ChromaIndex::new(&server.base_url()).expect("client");
        let hits = index
            .search("invoices_ab12", vec![0.1, 0.2], 2)
            .await
            .expect("query");

        query.assert();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "first chunk");
        assert!((hits[0].score - 0.9).abs() < f32::EPSILON);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn error_status_surfaces_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections");
                then.status(500).body("boom");
            })
            .await;

        let index = ChromaIndex::new(&server.base_url()).expect("client");
        let error = index
            .ensure_index("invoices_ab12", 2)
            .await
            .expect_err("500 must fail");
        assert!(matches!(
            error,
            VectorstoreError::UnexpectedStatus { backend: "chroma", .. }
        ));
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let server = MockServer::start_async().await;
        let index = ChromaIndex::new(&server.base_url()).expect("client");
        index
            .index_chunks("invoices_ab12", Vec::new())
            .await
            .expect("no-op");
    }
}
