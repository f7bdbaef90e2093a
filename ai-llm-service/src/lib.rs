//! Shared LLM service used by the documentation agent.
//!
//! - Provider clients for Ollama, OpenAI and Gemini (generation) and
//!   Ollama/OpenAI (embeddings).
//! - A [`TokenStream`] producer for incremental generation output.
//! - [`LlmServiceProfiles`]: two profiles (generation + embedding) built once
//!   at startup and shared behind an `Arc`.
//! - Env-driven configuration helpers and a tracing layer for binaries.

pub mod config;
pub mod error_handler;
pub mod service_profiles;
pub mod services;
pub mod streaming;
pub mod telemetry;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{AiLlmError, ConfigError, ProviderError, ProviderErrorKind};
pub use service_profiles::LlmServiceProfiles;
pub use streaming::{Fragment, StreamState, TokenStream};
