//! Public API types re-used by external crates (e.g., the HTTP API layer).

use ai_llm_service::TokenStream;
use rag_store::Chunk;
use serde::Serialize;

/// Per-query pipeline state. Lives for one invocation only.
///
/// # Example
/// ```
/// use contextor::AgentState;
/// let s = AgentState::new("What is RAG?");
/// assert!(s.documents.is_empty() && s.generation.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentState {
    pub question: String,
    /// Context in descending similarity order.
    pub documents: Vec<Chunk>,
    pub generation: String,
}

impl AgentState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            generation: String::new(),
        }
    }
}

/// Result of the streaming pipeline: the context handed to the model and the
/// model output, still being produced.
pub struct StreamingAnswer {
    /// Question as sent for retrieval, including any uploaded-file prefix.
    pub question: String,
    /// Exactly the documents rendered into the prompt.
    pub documents: Vec<Chunk>,
    pub fragments: TokenStream,
}
