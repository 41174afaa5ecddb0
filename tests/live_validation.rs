use std::{env, sync::Once};

use docstruct::config::EngineConfig;
use docstruct::embedding::{EmbeddingClient, OllamaEmbeddingClient};
use docstruct::vectorstore::chroma::{ChromaIndex, DEFAULT_CHROMA_URL};
use docstruct::vectorstore::{ChunkInsert, VectorIndex, compute_chunk_hash};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_env_once() {
    INIT.call_once(|| {
        set_default_env("CHROMA_URL", DEFAULT_CHROMA_URL);
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
    });
}

#[tokio::test]
#[ignore = "Requires live Chroma"]
async fn live_chroma_index_roundtrip() {
    init_env_once();
    let url = env::var("CHROMA_URL").expect("set by init_env_once");
    let index = ChromaIndex::new(&url).expect("failed to build Chroma client");

    let scope = "docstruct_live_validation";
    let first = "Invoice No. 2024-001 from Acme GmbH".to_string();
    let second = "Total amount due: 99.00 EUR".to_string();

    index
        .ensure_index(scope, 4)
        .await
        .expect("failed to ensure collection");
    index
        .index_chunks(
            scope,
            vec![
                ChunkInsert {
                    chunk_hash: compute_chunk_hash(&first),
                    text: first.clone(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                },
                ChunkInsert {
                    chunk_hash: compute_chunk_hash(&second),
                    text: second,
                    vector: vec![0.0, 1.0, 0.0, 0.0],
                },
            ],
        )
        .await
        .expect("failed to index chunks");

    let hits = index
        .search(scope, vec![1.0, 0.0, 0.0, 0.0], 2)
        .await
        .expect("failed to query collection");
    assert!(!hits.is_empty(), "expected at least one hit: {hits:?}");
    assert_eq!(hits[0].text, first, "closest chunk mismatch: {hits:?}");
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_env_once();
    let config = EngineConfig::from_env().expect("failed to load engine configuration");
    let client = OllamaEmbeddingClient::new(
        config.ollama_url.as_deref(),
        config.embedding_model.clone(),
    )
    .expect("failed to build Ollama client");

    let vectors = client
        .embed(vec!["docstruct live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}
