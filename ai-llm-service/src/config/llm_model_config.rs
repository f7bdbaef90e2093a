use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{ConfigError, Result, validate_http_endpoint, validate_range_f32};

/// Configuration for an LLM model invocation.
///
/// This struct contains both general and provider-specific parameters.
///
/// # Fields
///
/// - `provider`: Which LLM provider/backend to use (e.g., Ollama, OpenAI).
/// - `model`: The model identifier (e.g., `"gpt-4o-mini"`, `"llama3.2"`, `"all-minilm"`).
/// - `endpoint`: Base URL of the inference server (no path suffix).
/// - `api_key`: Optional API key for providers that require authentication.
/// - `max_tokens`: Maximum number of tokens to generate (if supported).
/// - `temperature`: Controls randomness (0.0 = deterministic).
/// - `top_p`: Nucleus sampling cutoff (alternative to temperature).
/// - `timeout_secs`: Optional request timeout in seconds. `None` means the
///   client waits indefinitely, which is the default for generation.
///
/// # Examples
///
/// ```
/// use ai_llm_service::{LlmModelConfig, LlmProvider};
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::Ollama,
///     model: "llama3.2".to_string(),
///     endpoint: "http://localhost:11434".to_string(),
///     api_key: None,
///     max_tokens: Some(1024),
///     temperature: Some(0.2),
///     top_p: None,
///     timeout_secs: None,
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Inference endpoint (local URL or remote API base).
    pub endpoint: String,

    /// Optional API key for authentication (OpenAI, Gemini).
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Validates static invariants before any client is built.
    ///
    /// # Errors
    /// - [`ConfigError::EmptyModel`] for a blank model name
    /// - [`ConfigError::InvalidFormat`] for a non-http(s) endpoint
    /// - [`ConfigError::OutOfRange`] for `temperature` outside `0.0..=2.0`
    ///   or `top_p` outside `0.0..=1.0`
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        validate_http_endpoint("endpoint", self.endpoint.trim())?;
        if let Some(t) = self.temperature {
            validate_range_f32("temperature", t, 0.0, 2.0)?;
        }
        if let Some(p) = self.top_p {
            validate_range_f32("top_p", p, 0.0, 1.0)?;
        }
        Ok(())
    }

    /// Endpoint without trailing slashes, ready for path concatenation.
    pub fn base_url(&self) -> String {
        self.endpoint.trim().trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::AiLlmError;

    fn cfg() -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/".into(),
            api_key: Some("sk-test".into()),
            max_tokens: None,
            temperature: Some(0.2),
            top_p: Some(0.9),
            timeout_secs: None,
        }
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        assert_eq!(cfg().base_url(), "https://api.openai.com");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = cfg();
        c.model = "  ".into();
        assert!(matches!(
            c.validate(),
            Err(AiLlmError::Config(ConfigError::EmptyModel))
        ));

        let mut c = cfg();
        c.endpoint = "localhost:11434".into();
        assert!(matches!(
            c.validate(),
            Err(AiLlmError::Config(ConfigError::InvalidFormat { .. }))
        ));

        let mut c = cfg();
        c.top_p = Some(1.5);
        assert!(matches!(
            c.validate(),
            Err(AiLlmError::Config(ConfigError::OutOfRange { field: "top_p", .. }))
        ));
    }
}
