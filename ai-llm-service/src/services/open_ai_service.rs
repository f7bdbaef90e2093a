//! OpenAI (ChatGPT) service for text generation and embeddings.
//!
//! Endpoints are derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/v1/chat/completions: chat completion (plain or SSE stream)
//! - POST {endpoint}/v1/embeddings      : embeddings retrieval
//!
//! Constructor validation:
//! - `cfg.provider` must be `LlmProvider::OpenAI`
//! - `cfg.api_key` must be present
//! - `cfg.endpoint` must start with http:// or https://
//!
//! Errors are normalized via unified error types in `error_handler`.

use std::time::{Duration, Instant};

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, HttpError, ProviderError, ProviderErrorKind, Result, make_snippet,
    },
    streaming::{LineEvent, TokenStream, spawn_line_stream},
};

/// Thin client for the OpenAI API (ChatGPT).
///
/// Constructed from a complete [`LlmModelConfig`]. Internally keeps a
/// preconfigured `reqwest::Client` (optional timeout and default headers).
///
/// High-level operations:
/// - [`OpenAiService::generate`]       : single chat completion
/// - [`OpenAiService::generate_stream`]: chat completion streamed over SSE
/// - [`OpenAiService::embeddings`]     : single embeddings vector retrieval
#[derive(Debug)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `InvalidProvider` if `cfg.provider` is not OpenAI
    /// - [`AiLlmError::Provider`] with `MissingApiKey` if `cfg.api_key` is `None`
    /// - [`AiLlmError::Provider`] with `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != LlmProvider::OpenAI {
            return Err(provider_err(ProviderErrorKind::InvalidProvider));
        }

        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| provider_err(ProviderErrorKind::MissingApiKey))?;

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(provider_err(ProviderErrorKind::InvalidEndpoint(
                cfg.endpoint.clone(),
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                provider_err(ProviderErrorKind::Decode(format!(
                    "invalid API key header: {e}"
                )))
            })?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let base = cfg.base_url();
        let url_chat = format!("{base}/v1/chat/completions");
        let url_embeddings = format!("{base}/v1/embeddings");

        info!(
            provider = %cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            "OpenAiService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    /// Performs a **non-streaming** chat completion request.
    ///
    /// Minimal `messages` array:
    /// - optional system message (if provided)
    /// - user message with `prompt`.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    /// - [`AiLlmError::Provider`] with `EmptyChoices` if no choices are returned
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let started = Instant::now();
        let body = ChatCompletionRequest::from_cfg(&self.cfg, prompt, system, false);
        let resp = self.post(&self.url_chat, &body).await?;

        let out: ChatCompletionResponse = resp.json().await.map_err(|e| {
            error!(error = %e, model = %self.cfg.model, "failed to decode chat completion");
            provider_err(ProviderErrorKind::Decode(format!(
                "serde error: {e}; expected `choices[0].message.content`"
            )))
        })?;

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| provider_err(ProviderErrorKind::EmptyChoices))?;

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "chat completion completed"
        );
        Ok(content)
    }

    /// Starts a **streaming** chat completion (`stream=true`).
    ///
    /// The body is Server-Sent Events; every `data:` line carries a
    /// `choices[0].delta.content` fragment and `data: [DONE]` ends the stream.
    pub async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream> {
        let body = ChatCompletionRequest::from_cfg(&self.cfg, prompt, system, true);
        let resp = self.post(&self.url_chat, &body).await?;
        debug!(model = %self.cfg.model, "openai stream opened");
        Ok(spawn_line_stream(resp, LlmProvider::OpenAI, parse_sse_line))
    }

    /// Retrieves a single embeddings vector via `/v1/embeddings`.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            input,
        };
        let resp = self.post(&self.url_embeddings, &body).await?;

        let out: EmbeddingsResponse = resp.json().await.map_err(|e| {
            provider_err(ProviderErrorKind::Decode(format!(
                "serde error: {e}; expected `data[0].embedding`"
            )))
        })?;

        out.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| provider_err(ProviderErrorKind::EmptyChoices))
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        debug!(model = %self.cfg.model, %url, "POST");
        let resp = self.client.post(url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%status, %url, %snippet, "OpenAI returned non-success status");
            return Err(provider_err(ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            })));
        }
        Ok(resp)
    }
}

fn provider_err(kind: ProviderErrorKind) -> AiLlmError {
    ProviderError::new(LlmProvider::OpenAI, kind).into()
}

/// Parses one SSE line of a streaming chat completion.
pub(crate) fn parse_sse_line(line: &str) -> std::result::Result<LineEvent, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        // Comments, `event:` lines and blank separators.
        return Ok(LineEvent::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(LineEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(LineEvent::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(
            LlmProvider::OpenAI,
            ProviderErrorKind::Decode(format!("invalid stream event: {e}")),
        )
    })?;
    let text = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect::<String>();
    Ok(LineEvent::Fragment(text))
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_cfg(
        cfg: &'a LlmModelConfig,
        prompt: &'a str,
        system: Option<&'a str>,
        stream: bool,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = system {
            messages.push(ChatMessage {
                role: "system",
                content: sys,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        Self {
            model: &cfg.model,
            messages,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOwned {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}
