//! Weaviate backend speaking the REST and GraphQL APIs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::http::{format_endpoint, normalize_base_url};
use crate::vectorstore::VectorIndex;
use crate::vectorstore::types::{
    ChunkInsert, ScoredChunk, VectorstoreError, current_timestamp_rfc3339,
};

const BACKEND: &str = "weaviate";

/// Index handle for a Weaviate instance.
pub struct WeaviateIndex {
    client: Client,
    base_url: String,
}

impl WeaviateIndex {
    /// Construct a new handle against the given base URL.
    pub fn new(base_url: &str) -> Result<Self, VectorstoreError> {
        let client = Client::builder().user_agent("docstruct/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(VectorstoreError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized Weaviate HTTP client");
        Ok(Self { client, base_url })
    }

    async fn class_exists(&self, class: &str) -> Result<bool, VectorstoreError> {
        let response = self
            .client
            .get(format_endpoint(&self.base_url, &format!("v1/schema/{class}")))
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
                tracing::error!(class, error = %error, "Class existence check failed");
                Err(error)
            }
        }
    }

    async fn create_class(&self, class: &str) -> Result<(), VectorstoreError> {
        let body = json!({
            "class": class,
            "vectorizer": "none",
            "properties": [
                { "name": "text", "dataType": ["text"] },
                { "name": "chunk_hash", "dataType": ["text"] },
                { "name": "indexed_at", "dataType": ["text"] },
            ],
        });
        let response = self
            .client
            .post(format_endpoint(&self.base_url, "v1/schema"))
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
            tracing::error!(class, error = %error, "Failed to create class");
            return Err(error);
        }

        tracing::debug!(class, "Weaviate class created");
        Ok(())
    }
}

/// Adapt a scope name to Weaviate's class naming rules: ASCII alphanumerics
/// only, leading capital.
fn class_name(scope: &str) -> String {
    let mut name = String::with_capacity(scope.len());
    for ch in scope.chars().filter(char::is_ascii_alphanumeric) {
        if name.is_empty() {
            name.extend(ch.to_uppercase());
        } else {
            name.push(ch);
        }
    }
    name
}

/// Deterministic object identifier derived from the chunk hash, so indexing
/// the same content twice updates in place.
fn object_id(chunk_hash: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_hash.as_bytes()).to_string()
}

#[async_trait]
impl VectorIndex for WeaviateIndex {
    async fn ensure_index(&self, scope: &str, _dimension: usize) -> Result<(), VectorstoreError> {
        let class = class_name(scope);
        if self.class_exists(&class).await? {
            return Ok(());
        }
        self.create_class(&class).await
    }

    async fn index_chunks(
        &self,
        scope: &str,
        chunks: Vec<ChunkInsert>,
    ) -> Result<(), VectorstoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let class = class_name(scope);
        let now = current_timestamp_rfc3339();
        let chunk_count = chunks.len();
        let objects: Vec<Value> = chunks
            .into_iter()
            .map(|chunk| {
                json!({
                    "class": class,
                    "id": object_id(&chunk.chunk_hash),
                    "vector": chunk.vector,
                    "properties": {
                        "text": chunk.text,
                        "chunk_hash": chunk.chunk_hash,
                        "indexed_at": now,
                    },
                })
            })
            .collect();

        let response = self
            .client
            .post(format_endpoint(&self.base_url, "v1/batch/objects"))
            .json(&json!({ "objects": objects }))
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
            tracing::error!(class, error = %error, "Weaviate batch insert failed");
            return Err(error);
        }

        tracing::debug!(class, chunks = chunk_count, "Chunks indexed");
        Ok(())
    }

    async fn search(
        &self,
        scope: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorstoreError> {
        let class = class_name(scope);
        let vector_json = Value::from(vector).to_string();
        let query = format!(
            "{{ Get {{ {class}(limit: {limit}, nearVector: {{ vector: {vector_json} }}) \
             {{ text _additional {{ certainty }} }} }} }}"
        );
        let response = self
            .client
            .post(format_endpoint(&self.base_url, "v1/graphql"))
            .json(&json!({ "query": query }))
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
            tracing::error!(class, error = %error, "Weaviate search failed");
            return Err(error);
        }

        let payload: Value = response.json().await?;
        let hits = payload
            .pointer(&format!("/data/Get/{class}"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let results = hits
            .into_iter()
            .filter_map(|hit| {
                let text = hit.get("text").and_then(Value::as_str)?.to_string();
                let score = hit
                    .pointer("/_additional/certainty")
                    .and_then(Value::as_f64)
                    .unwrap_or_default() as f32;
                Some(ScoredChunk { text, score })
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
    use httpmock::{Method::GET, Method::POST, MockServer};

    #[test]
    fn class_name_capitalizes_and_strips_separators() {
        assert_eq!(class_name("docstruct_ab12cd34"), "Docstructab12cd34");
        assert_eq!(class_name("invoices"), "Invoices");
    }

    #[test]
    fn object_ids_are_deterministic_per_hash() {
        assert_eq!(object_id("hash-a"), object_id("hash-a"));
        assert_ne!(object_id("hash-a"), object_id("hash-b"));
    }

    #[tokio::test]
    async fn ensure_index_creates_missing_class() {
        let server = MockServer::start_async().await;

        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/schema/Docstructab12");
                then.status(404).body("not found");
            })
            .await;

        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/schema")
                    .body_contains("\"class\":\"Docstructab12\"")
                    .body_contains("\"vectorizer\":\"none\"");
                then.status(200).json_body(json!({ "class": "Docstructab12" }));
            })
            .await;

        let index = WeaviateIndex::new(&server.base_url()).expect("client");
        index
            .ensure_index("docstruct_ab12", 2)
            .await
            .expect("ensure");

        exists.assert();
        create.assert();
    }

    #[tokio::test]
    async fn index_chunks_batches_objects_with_deterministic_ids() {
        let server = MockServer::start_async().await;
        let expected_id = object_id("hash-a");

        let batch = server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/v1/batch/objects")
                    .body_contains(expected_id.as_str())
                    .body_contains("\"chunk_hash\":\"hash-a\"");
                then.status(200).json_body(json!([]));
            })
            .await;

        let index = WeaviateIndex::new(&server.base_url()).expect("client");
        index
            .index_chunks(
                "docstruct_ab12",
                vec![ChunkInsert {
                    text: "Invoice from Acme".to_string(),
                    chunk_hash: "hash-a".to_string(),
                    vector: vec![0.1, 0.2],
                }],
            )
            .await
            .expect("batch insert");

        batch.assert();
    }

    #[tokio::test]
    async fn search_parses_graphql_hits() {
        let server = MockServer::start_async().await;

        let graphql = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/graphql")
                    .body_contains("nearVector");
                then.status(200).json_body(json!({
                    "data": {
                        "Get": {
                            "Docstructab12": [
                                {
                                    "text": "first chunk",
                                    "_additional": { "certainty": 0.91 }
                                }
                            ]
                        }
                    }
                }));
            })
            .await;

        let index = WeaviateIndex::new(&server.base_url()).expect("client");
        let hits = index
            .search("docstruct_ab12", vec![0.1, 0.2], 3)
            .await
            .expect("search");

        graphql.assert();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "first chunk");
        assert!((hits[0].score - 0.91).abs() < 1e-6);
    }
}
