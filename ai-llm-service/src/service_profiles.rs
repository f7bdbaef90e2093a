//! Shared LLM service with two active profiles: `generation` and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Provider clients are built at construction, so a bad key or endpoint
//!   fails at startup instead of on the first request.
//! - The embedding profile is optional; without it [`LlmServiceProfiles::embed`]
//!   reports the operation as unsupported.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::{LlmProvider, LlmServiceProfiles};
//! use ai_llm_service::config::default_config::{config_embedding, config_generation};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let svc = Arc::new(LlmServiceProfiles::new(
//!     config_generation()?,
//!     Some(config_embedding(LlmProvider::Ollama)?),
//! )?);
//!
//! let txt = svc.generate("Hello world", None).await?;
//! println!("{txt}");
//!
//! let emb = svc.embed("Ferris").await?;
//! println!("Embedding dim = {}", emb.len());
//! # Ok(()) }
//! ```

use tracing::info;

use crate::{
    config::{
        llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::{AiLlmError, ProviderError, ProviderErrorKind, Result},
    services::{
        gemini_service::GeminiService, ollama_service::OllamaService,
        open_ai_service::OpenAiService,
    },
    streaming::TokenStream,
};

/// Concrete client for one profile.
#[derive(Debug)]
enum ProviderClient {
    Ollama(OllamaService),
    OpenAi(OpenAiService),
    Gemini(GeminiService),
}

impl ProviderClient {
    fn build(cfg: &LlmModelConfig) -> Result<Self> {
        Ok(match cfg.provider {
            LlmProvider::Ollama => Self::Ollama(OllamaService::new(cfg.clone())?),
            LlmProvider::OpenAI => Self::OpenAi(OpenAiService::new(cfg.clone())?),
            LlmProvider::Gemini => Self::Gemini(GeminiService::new(cfg.clone())?),
        })
    }
}

/// Shared service that manages the **generation** and **embedding** profiles.
#[derive(Debug)]
pub struct LlmServiceProfiles {
    generation: LlmModelConfig,
    embedding: Option<LlmModelConfig>,
    generation_client: ProviderClient,
    embedding_client: Option<ProviderClient>,
}

impl LlmServiceProfiles {
    /// Creates the service and its provider clients.
    ///
    /// # Errors
    /// Returns [`AiLlmError`] if a profile is invalid or a client cannot be built.
    pub fn new(generation: LlmModelConfig, embedding: Option<LlmModelConfig>) -> Result<Self> {
        generation.validate()?;
        let generation_client = ProviderClient::build(&generation)?;

        let embedding_client = match &embedding {
            Some(cfg) => {
                cfg.validate()?;
                if cfg.provider == LlmProvider::Gemini {
                    return Err(unsupported(LlmProvider::Gemini, "embeddings"));
                }
                Some(ProviderClient::build(cfg)?)
            }
            None => None,
        };

        info!(
            generation = %generation.provider,
            generation_model = %generation.model,
            embedding = ?embedding.as_ref().map(|c| c.model.as_str()),
            "LLM profiles ready"
        );

        Ok(Self {
            generation,
            embedding,
            generation_client,
            embedding_client,
        })
    }

    /// Generates text in one call using the **generation** profile.
    ///
    /// # Errors
    /// Returns [`AiLlmError`] if generation fails.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        match &self.generation_client {
            ProviderClient::Ollama(c) => c.generate(prompt, system).await,
            ProviderClient::OpenAi(c) => c.generate(prompt, system).await,
            ProviderClient::Gemini(c) => c.generate(prompt, system).await,
        }
    }

    /// Starts an incremental generation using the **generation** profile.
    ///
    /// Errors before the first fragment (connection, non-2xx status) are
    /// returned here; later ones arrive through the stream.
    pub async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream> {
        match &self.generation_client {
            ProviderClient::Ollama(c) => c.generate_stream(prompt, system).await,
            ProviderClient::OpenAi(c) => c.generate_stream(prompt, system).await,
            ProviderClient::Gemini(c) => c.generate_stream(prompt, system).await,
        }
    }

    /// Computes embeddings using the **embedding** profile.
    ///
    /// # Errors
    /// Returns [`AiLlmError`] if embedding fails or no embedding profile is set.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        match &self.embedding_client {
            Some(ProviderClient::Ollama(c)) => c.embeddings(input).await,
            Some(ProviderClient::OpenAi(c)) => c.embeddings(input).await,
            Some(ProviderClient::Gemini(_)) => Err(unsupported(LlmProvider::Gemini, "embeddings")),
            None => Err(unsupported(self.generation.provider, "no embedding profile")),
        }
    }

    /// Returns references to the current profiles `(generation, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, Option<&LlmModelConfig>) {
        (&self.generation, self.embedding.as_ref())
    }
}

fn unsupported(provider: LlmProvider, what: &'static str) -> AiLlmError {
    ProviderError::new(provider, ProviderErrorKind::Unsupported(what)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ollama(endpoint: &str, model: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: None,
            max_tokens: None,
            temperature: Some(0.2),
            top_p: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn gemini_embedding_profile_is_rejected() {
        let mut emb = ollama("http://localhost:11434", "x");
        emb.provider = LlmProvider::Gemini;
        emb.api_key = Some("k".into());
        let err = LlmServiceProfiles::new(ollama("http://localhost:11434", "llama3.2"), Some(emb))
            .unwrap_err();
        assert!(matches!(
            err,
            AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::Unsupported(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn embed_without_profile_is_unsupported() {
        let svc = LlmServiceProfiles::new(ollama("http://localhost:11434", "llama3.2"), None).unwrap();
        assert!(svc.embed("x").await.is_err());
        assert!(svc.profiles().1.is_none());
    }

    #[tokio::test]
    async fn routes_calls_to_the_configured_profiles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "hi", "done": true})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"embedding": [0.5, 0.5]})),
            )
            .mount(&server)
            .await;

        let svc = LlmServiceProfiles::new(
            ollama(&server.uri(), "llama3.2"),
            Some(ollama(&server.uri(), "all-minilm")),
        )
        .unwrap();

        assert_eq!(svc.generate("q", None).await.unwrap(), "hi");
        assert_eq!(svc.embed("q").await.unwrap(), vec![0.5, 0.5]);
        assert_eq!(svc.profiles().1.map(|c| c.model.as_str()), Some("all-minilm"));
    }
}
