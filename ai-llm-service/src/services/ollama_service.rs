//! Lightweight Ollama service for text generation and embeddings.
//!
//! This module implements a thin client for the local Ollama API:
//! - `POST {endpoint}/api/generate`  : generation, either in one response
//!   (`stream=false`) or as newline-delimited JSON chunks (`stream=true`)
//! - `POST {endpoint}/api/embeddings`: embeddings retrieval
//!
//! It uses the universal configuration [`LlmModelConfig`] and ensures
//! that the selected provider is [`LlmProvider::Ollama`].
//!
//! # Examples
//!
//! ```no_run
//! use ai_llm_service::{LlmModelConfig, LlmProvider};
//! use ai_llm_service::services::ollama_service::OllamaService;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = LlmModelConfig {
//!     provider: LlmProvider::Ollama,
//!     model: "llama3.2".into(),
//!     endpoint: "http://localhost:11434".into(),
//!     api_key: None,
//!     max_tokens: Some(256),
//!     temperature: Some(0.7),
//!     top_p: Some(0.9),
//!     timeout_secs: None,
//! };
//!
//! let svc = OllamaService::new(cfg)?;
//! let mut stream = svc.generate_stream("Write a haiku about Rust.", None).await?;
//! while let Some(fragment) = stream.next_fragment().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(()) }
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
use crate::error_handler::{
    AiLlmError, HttpError, ProviderError, ProviderErrorKind, Result, make_snippet,
};
use crate::streaming::{LineEvent, TokenStream, spawn_line_stream};

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses one HTTP client.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not `Ollama`
    /// - `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(provider_err(ProviderErrorKind::InvalidProvider));
        }

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(provider_err(ProviderErrorKind::InvalidEndpoint(
                cfg.endpoint.clone(),
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let base = cfg.base_url();
        let url_generate = format!("{base}/api/generate");
        let url_embeddings = format!("{base}/api/embeddings");

        Ok(Self {
            client,
            cfg,
            url_generate,
            url_embeddings,
        })
    }

    /// Performs a **non-streaming** generation request via `/api/generate`.
    ///
    /// Mapped options:
    /// - `model`        ← `self.cfg.model`
    /// - `prompt`       ← argument
    /// - `system`       ← optional argument
    /// - `num_predict`  ← `self.cfg.max_tokens`
    /// - `temperature`  ← `self.cfg.temperature`
    /// - `top_p`        ← `self.cfg.top_p`
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let started = Instant::now();
        let body = GenerateRequest::from_cfg(&self.cfg, prompt, system, false);
        let resp = self.post(&self.url_generate, &body).await?;

        let out: GenerateChunk = resp.json().await.map_err(|e| {
            provider_err(ProviderErrorKind::Decode(format!(
                "serde error: {e}; ensure `stream=false` is used"
            )))
        })?;

        info!(
            latency_ms = started.elapsed().as_millis(),
            "ollama generation completed"
        );
        Ok(out.response)
    }

    /// Starts a **streaming** generation request via `/api/generate`.
    ///
    /// Each NDJSON line carries a `response` fragment; the line with
    /// `done=true` terminates the stream.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream> {
        let body = GenerateRequest::from_cfg(&self.cfg, prompt, system, true);
        let resp = self.post(&self.url_generate, &body).await?;
        debug!("ollama stream opened");
        Ok(spawn_line_stream(resp, LlmProvider::Ollama, parse_ndjson_line))
    }

    /// Retrieves embeddings via `/api/embeddings`.
    ///
    /// Usually a dedicated embedding model is configured for this client.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };
        let resp = self.post(&self.url_embeddings, &body).await?;

        let out: EmbeddingsResponse = resp.json().await.map_err(|e| {
            provider_err(ProviderErrorKind::Decode(format!(
                "serde error: {e}; expected `{{ embedding: number[] }}`"
            )))
        })?;

        if out.embedding.is_empty() {
            return Err(provider_err(ProviderErrorKind::Decode(
                "empty embedding vector".into(),
            )));
        }
        Ok(out.embedding)
    }

    /// Sends a JSON POST and maps non-2xx statuses to [`ProviderErrorKind::HttpStatus`].
    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        debug!(%url, "POST");
        let resp = self.client.post(url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%status, %url, %snippet, "Ollama returned non-success status");
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
    ProviderError::new(LlmProvider::Ollama, kind).into()
}

/// Parses one NDJSON line of a streaming `/api/generate` response.
pub(crate) fn parse_ndjson_line(line: &str) -> std::result::Result<LineEvent, ProviderError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(LineEvent::Skip);
    }
    let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| {
        ProviderError::new(
            LlmProvider::Ollama,
            ProviderErrorKind::Decode(format!("invalid stream line: {e}")),
        )
    })?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::new(
            LlmProvider::Ollama,
            ProviderErrorKind::Decode(err),
        ));
    }
    if chunk.done {
        // The final line may still carry trailing text.
        return Ok(if chunk.response.is_empty() {
            LineEvent::Done
        } else {
            LineEvent::Last(chunk.response)
        });
    }
    Ok(LineEvent::Fragment(chunk.response))
}

/* ==========================
HTTP payloads & options
========================== */

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

impl<'a> GenerateRequest<'a> {
    fn from_cfg(
        cfg: &'a LlmModelConfig,
        prompt: &'a str,
        system: Option<&'a str>,
        stream: bool,
    ) -> Self {
        let options = GenerateOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_predict: cfg.max_tokens,
        };

        Self {
            model: &cfg.model,
            prompt,
            system,
            stream,
            options: Some(options),
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// One `/api/generate` object (the whole response, or one stream line).
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Request body for `/api/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response body for `/api/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::StreamState;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: "llama3.2".into(),
            endpoint: endpoint.into(),
            api_key: None,
            max_tokens: None,
            temperature: Some(0.2),
            top_p: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn rejects_foreign_provider_and_bad_endpoint() {
        let mut c = cfg("http://localhost:11434");
        c.provider = LlmProvider::OpenAI;
        assert!(OllamaService::new(c).is_err());
        assert!(OllamaService::new(cfg("localhost:11434")).is_err());
    }

    #[test]
    fn ndjson_line_parsing() {
        assert_eq!(
            parse_ndjson_line(r#"{"response":"Hi","done":false}"#).unwrap(),
            LineEvent::Fragment("Hi".into())
        );
        assert_eq!(
            parse_ndjson_line(r#"{"response":"","done":true,"eval_count":3}"#).unwrap(),
            LineEvent::Done
        );
        assert_eq!(
            parse_ndjson_line(r#"{"response":"!","done":true}"#).unwrap(),
            LineEvent::Last("!".into())
        );
        assert_eq!(parse_ndjson_line("   ").unwrap(), LineEvent::Skip);
        assert!(parse_ndjson_line(r#"{"error":"model not found"}"#).is_err());
        assert!(parse_ndjson_line("not json").is_err());
    }

    #[tokio::test]
    async fn generate_returns_full_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"stream": false, "model": "llama3.2"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "42", "done": true})),
            )
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        assert_eq!(svc.generate("q", None).await.unwrap(), "42");
    }

    #[tokio::test]
    async fn generate_stream_yields_fragments_in_order() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"The \",\"done\":false}\n",
            "{\"response\":\"answer\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        let stream = svc.generate_stream("q", Some("sys")).await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "The answer");
    }

    #[tokio::test]
    async fn stream_cut_before_done_line_fails() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"Hel\",\"done\":false}\n",
            "{\"response\":\"lo\",\"done\":false}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        let mut stream = svc.generate_stream("q", None).await.unwrap();
        let mut text = String::new();
        let mut failure = None;
        while let Some(fragment) = stream.next_fragment().await {
            match fragment {
                Ok(t) => text.push_str(&t),
                Err(e) => failure = Some(e),
            }
        }
        assert_eq!(text, "Hello");
        assert!(matches!(
            failure,
            Some(AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::Decode(_),
                ..
            }))
        ));
        assert_eq!(stream.state(), StreamState::Failed);
    }

    #[tokio::test]
    async fn final_line_text_is_kept() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"response\":\"Done\",\"done\":false}\n",
            "{\"response\":\".\",\"done\":true}"
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        let stream = svc.generate_stream("q", None).await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "Done.");
    }

    #[tokio::test]
    async fn non_success_status_maps_to_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        let err = svc.embeddings("text").await.unwrap_err();
        match err {
            AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::HttpStatus(http),
                ..
            }) => {
                assert_eq!(http.status.as_u16(), 404);
                assert!(http.snippet.contains("model not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn embeddings_decode_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(serde_json::json!({"prompt": "hello"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embedding": [0.1, 0.2, 0.3]})),
            )
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        assert_eq!(svc.embeddings("hello").await.unwrap().len(), 3);
    }
}
