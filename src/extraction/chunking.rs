//! Token budgets and semantic splitting for document text.
//!
//! Retrieval quality depends on how a document is cut: every chunk must stay
//! inside the embedding model's token window, and each should carry enough
//! neighboring text to answer a query on its own. The budget is derived from
//! the model's window unless the caller pins one through
//! [`EngineConfig::chunk_size`](crate::config::EngineConfig).

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    p50k_edit, r50k_base,
};

use crate::config::EngineProvider;

use super::types::ChunkingError;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

// Derived budgets stay inside this range; explicit overrides may leave it.
const AUTO_BUDGET_MIN: usize = 256;
const AUTO_BUDGET_MAX: usize = 1024;

/// Pick the token budget per chunk.
///
/// An explicit override wins and is floored at one token. Without one, a
/// quarter of the model's context window is used, clamped into `[256, 1024]`.
pub(crate) fn determine_chunk_size(
    override_size: Option<usize>,
    provider: EngineProvider,
    model: &str,
) -> usize {
    match override_size {
        Some(explicit) => explicit.max(1),
        None => (context_window(provider, model) / 4).clamp(AUTO_BUDGET_MIN, AUTO_BUDGET_MAX),
    }
}

/// Context window of the embedding model, best effort.
///
/// OpenAI models resolve through `tiktoken`'s metadata with the current
/// embedding families special-cased. Ollama names are matched against the
/// embedding models commonly pulled locally; unknown ones are assumed to
/// have a 4k window.
fn context_window(provider: EngineProvider, model: &str) -> usize {
    match provider {
        EngineProvider::OpenAi => match model {
            m if m.starts_with("text-embedding-3") => 8192,
            m if m.starts_with("text-embedding-ada-002") => 8192,
            m => get_context_size(m),
        },
        EngineProvider::Ollama => {
            let name = model.to_lowercase();
            if name == "nomic-embed-text" || name.starts_with("mxbai-embed-large") {
                8192
            } else if name.contains("all-minilm") {
                512
            } else if name.contains("e5-large") {
                4096
            } else {
                tracing::trace!(model, "No window known for Ollama model, assuming 4096");
                4096
            }
        }
    }
}

/// Split text into semantic chunks of at most `chunk_size` tokens each.
///
/// Whitespace-only input yields no chunks. A zero budget is rejected.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    provider: EngineProvider,
    model: &str,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_token_counter(provider, model)?;
    Ok(split_with_counter(text, chunk_size, &counter))
}

/// Resolve the token counter used to enforce the chunk budget.
///
/// OpenAI model names must resolve to a `tiktoken` encoding. Ollama model
/// names usually do not; those fall back to counting whitespace-separated
/// words, which overshoots per token and therefore still respects the
/// window.
pub(crate) fn build_token_counter(
    provider: EngineProvider,
    model: &str,
) -> Result<TokenCounter, ChunkingError> {
    match (provider, tiktoken_counter(model)) {
        (_, Ok(counter)) => Ok(counter),
        (EngineProvider::OpenAi, Err(error)) => Err(error),
        (EngineProvider::Ollama, Err(error)) => {
            tracing::warn!(
                model,
                error = %error,
                "No tokenizer for Ollama model, counting whitespace words instead"
            );
            Ok(whitespace_counter())
        }
    }
}

fn tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let target = match model.trim() {
        "" => "cl100k_base",
        trimmed => trimmed,
    };
    let encoding = encoding_for(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;

    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Model name first, then encoding name, then the `cl100k_base` default.
fn encoding_for(name: &str) -> Result<CoreBPE, TokenizerError> {
    if let Ok(by_model) = get_bpe_from_model(name) {
        return Ok(by_model);
    }
    match name {
        "cl100k_base" => cl100k_base(),
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "p50k_edit" => p50k_edit(),
        "r50k_base" | "gpt2" => r50k_base(),
        other => {
            tracing::debug!(
                model = other,
                "Unknown tokenizer name, defaulting to cl100k_base"
            );
            cl100k_base()
        }
    }
}

fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let words = segment.split_whitespace().count();
        // A non-empty segment without whitespace still costs one token.
        words.max(usize::from(!segment.is_empty()))
    })
}

fn split_with_counter(text: &str, chunk_size: usize, counter: &TokenCounter) -> Vec<String> {
    let budget = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| budget.as_ref()(segment)),
    );
    chunker.chunk(text)
}
