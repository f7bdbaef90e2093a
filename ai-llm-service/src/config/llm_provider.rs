use std::fmt;
use std::str::FromStr;

use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for large language model (LLM) inference.
///
/// Adding more providers (e.g., Anthropic, Mistral API) is done by extending
/// this enum and the dispatch in [`crate::service_profiles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI API (or any OpenAI-compatible server).
    OpenAI,
    /// Google Generative Language API (Gemini models), API-key based.
    Gemini,
}

impl LlmProvider {
    /// Stable lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    /// Case-insensitive; accepts a few common aliases (`chatgpt`, `google`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" | "chatgpt" => Ok(LlmProvider::OpenAI),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}
