//! Typed error for the contextor crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextorError {
    /// Index, ingestion or loader failures from rag-store.
    #[error(transparent)]
    Rag(#[from] rag_store::RagError),

    /// Generation or provider setup failures.
    #[error(transparent)]
    Llm(#[from] ai_llm_service::AiLlmError),

    /// Source ledger persistence.
    #[error(transparent)]
    Ledger(#[from] source_ledger::LedgerError),

    /// Invalid environment configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
