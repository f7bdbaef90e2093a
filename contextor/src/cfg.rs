//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;

use ai_llm_service::{AiLlmError, LlmModelConfig, LlmProvider};
use ai_llm_service::config::default_config::{config_embedding, config_generation};
use rag_store::RagConfig;

use crate::error::ContextorError;

pub const DEFAULT_SEED_URL: &str = "https://docs.cohere.com/docs/intro-to-rag";

/// Where query and chunk vectors come from.
#[derive(Clone, Debug)]
pub enum EmbeddingChoice {
    /// A provider embedding profile (`EMBEDDING_KIND=ollama|openai`).
    Service(LlmModelConfig),
    /// Offline token hashing (`EMBEDDING_KIND=hashing`).
    Hashing { dim: usize },
}

/// Config bag for the agent. All fields have defaults via `from_env`.
#[derive(Clone, Debug)]
pub struct ContextorConfig {
    pub rag: RagConfig,
    pub generation: LlmModelConfig,
    pub embedding: EmbeddingChoice,
    /// Fetched only when no index is persisted yet.
    pub seed_urls: Vec<String>,
    pub sources_file: PathBuf,
}

impl ContextorConfig {
    /// Build from environment variables with sensible defaults.
    ///
    /// # Errors
    /// Invalid index settings, unknown provider names, or missing provider
    /// credentials.
    pub fn from_env() -> Result<Self, ContextorError> {
        let rag = RagConfig::from_env()?;
        let generation = config_generation()?;

        let embedding = match env("EMBEDDING_KIND", "ollama").to_ascii_lowercase().as_str() {
            "hashing" => EmbeddingChoice::Hashing {
                dim: parse("EMBEDDING_DIM", 384usize),
            },
            other => {
                let provider = other.parse::<LlmProvider>().map_err(AiLlmError::from)?;
                EmbeddingChoice::Service(config_embedding(provider)?)
            }
        };

        Ok(Self {
            rag,
            generation,
            embedding,
            seed_urls: seed_urls(&env("SEED_URLS", DEFAULT_SEED_URL)),
            sources_file: PathBuf::from(env("SOURCES_FILE", "sources_metadata.json")),
        })
    }
}

/// Comma-separated list; blanks dropped.
fn seed_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k).unwrap_or_else(|_| dflt.to_string())
}

fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(dflt)
}
