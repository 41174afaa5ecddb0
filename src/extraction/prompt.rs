//! Prompt assembly for answering extraction queries from retrieved chunks.

/// Instructions prepended to every extraction prompt.
///
/// The queries themselves already tell the model to return `None` when the
/// answer is absent, so the instructions stay short and focus on grounding.
pub const ANSWER_INSTRUCTIONS: &str = "You extract a single field value from a document. \
Answer using ONLY the context excerpts below. \
Reply with the value alone, without labels, explanations, or surrounding quotes.";

/// Build the prompt sent to the completion model for one query.
///
/// Context excerpts are numbered so the model can tell them apart; they are
/// ordered by retrieval score, best first.
pub fn answer_prompt(query: &str, contexts: &[&str]) -> String {
    let mut prompt = String::new();
    prompt.push_str(ANSWER_INSTRUCTIONS);
    prompt.push_str("\n\nContext:\n");
    for (position, context) in contexts.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", position + 1, context));
    }
    prompt.push_str(&format!("\nQuestion: {query}\n"));
    prompt.push_str("Answer:");
    prompt
}
