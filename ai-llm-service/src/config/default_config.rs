//! Default LLM configs loaded from environment variables.
//!
//! Two roles are supported:
//!
//! - **Generation** → the model answering questions (Ollama, OpenAI or Gemini)
//! - **Embedding**  → the vector encoder (Ollama or OpenAI)
//!
//! # Environment variables
//!
//! Generation:
//! - `LLM_KIND`         = `ollama` | `openai` | `gemini` (default `ollama`)
//! - `LLM_MODEL`        = model id (default depends on provider)
//! - `LLM_MAX_TOKENS`   = optional max tokens (u32)
//! - `LLM_TEMPERATURE`  = optional temperature (default `0.2`)
//! - `LLM_TIMEOUT_SECS` = optional request timeout; unset means no timeout
//!
//! Embedding:
//! - `EMBEDDING_KIND`   = `ollama` | `openai` (default `ollama`)
//! - `EMBEDDING_MODEL`  = model id (default depends on provider)
//!
//! Provider endpoints/credentials:
//! - `OLLAMA_URL` or `OLLAMA_PORT` (default `http://localhost:11434`)
//! - `OPENAI_BASE_URL` (default `https://api.openai.com`), `OPENAI_API_KEY`
//! - `GEMINI_BASE_URL` (default `https://generativelanguage.googleapis.com`), `GOOGLE_API_KEY`

use tracing::debug;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt_f32, env_opt_u32, env_opt_u64, must_env, opt_env,
    },
};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Resolves the Ollama endpoint from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
/// 3. `http://localhost:11434`
///
/// # Errors
/// - [`ConfigError::InvalidNumber`] if `OLLAMA_PORT` is not a valid port
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Some(url) = opt_env("OLLAMA_URL") {
        return Ok(url);
    }
    if let Some(port) = opt_env("OLLAMA_PORT") {
        port.trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{}", port.trim()));
    }
    debug!(url = DEFAULT_OLLAMA_URL, "OLLAMA_URL/OLLAMA_PORT unset, using default");
    Ok(DEFAULT_OLLAMA_URL.to_string())
}

/// Endpoint + credential pair for a provider.
fn provider_access(provider: LlmProvider) -> Result<(String, Option<String>), AiLlmError> {
    match provider {
        LlmProvider::Ollama => Ok((ollama_endpoint()?, None)),
        LlmProvider::OpenAI => Ok((
            opt_env("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            Some(must_env("OPENAI_API_KEY")?),
        )),
        LlmProvider::Gemini => Ok((
            opt_env("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            Some(must_env("GOOGLE_API_KEY")?),
        )),
    }
}

/// Reads a provider kind variable, falling back to Ollama when unset.
///
/// # Errors
/// Returns [`ConfigError::UnsupportedProvider`] for unknown names.
pub fn provider_from_env(var: &'static str) -> Result<LlmProvider, AiLlmError> {
    match opt_env(var) {
        Some(v) => Ok(v.parse::<LlmProvider>()?),
        None => Ok(LlmProvider::Ollama),
    }
}

/// Default generation model per provider.
pub fn default_generation_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Ollama => "llama3.2",
        LlmProvider::OpenAI => "gpt-4o-mini",
        LlmProvider::Gemini => "gemini-pro",
    }
}

/// Default embedding model per provider.
///
/// `all-minilm` is the Ollama build of `all-MiniLM-L6-v2` (384 dimensions).
pub fn default_embedding_model(provider: LlmProvider) -> Option<&'static str> {
    match provider {
        LlmProvider::Ollama => Some("all-minilm"),
        LlmProvider::OpenAI => Some("text-embedding-3-small"),
        LlmProvider::Gemini => None,
    }
}

/// Constructs the **generation** profile from `LLM_*` variables.
///
/// # Defaults
/// - `temperature = Some(0.2)`
/// - `timeout_secs = None` (no timeout)
pub fn config_generation() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env("LLM_KIND")?;
    let (endpoint, api_key) = provider_access(provider)?;
    let model = opt_env("LLM_MODEL")
        .unwrap_or_else(|| default_generation_model(provider).to_string());

    let cfg = LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: env_opt_f32("LLM_TEMPERATURE")?.or(Some(0.2)),
        top_p: None,
        timeout_secs: env_opt_u64("LLM_TIMEOUT_SECS")?,
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Constructs the **embedding** profile for the given provider.
///
/// # Defaults
/// - `temperature = Some(0.0)` (deterministic)
/// - `timeout_secs = None`
///
/// # Errors
/// [`ConfigError::UnsupportedProvider`] for providers without an embeddings API here.
pub fn config_embedding(provider: LlmProvider) -> Result<LlmModelConfig, AiLlmError> {
    let default_model = default_embedding_model(provider)
        .ok_or_else(|| ConfigError::UnsupportedProvider(format!("{provider} (embeddings)")))?;
    let (endpoint, api_key) = provider_access(provider)?;
    let model = opt_env("EMBEDDING_MODEL").unwrap_or_else(|| default_model.to_string());

    let cfg = LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: None,
    };
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_has_no_embedding_default() {
        assert!(default_embedding_model(LlmProvider::Gemini).is_none());
        let err = config_embedding(LlmProvider::Gemini).unwrap_err();
        assert!(matches!(
            err,
            AiLlmError::Config(ConfigError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn generation_defaults_cover_every_provider() {
        for p in [LlmProvider::Ollama, LlmProvider::OpenAI, LlmProvider::Gemini] {
            assert!(!default_generation_model(p).is_empty());
        }
    }
}
