//! Google Gemini service for text generation.
//!
//! Endpoints are derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/v1beta/models/{model}:generateContent
//! - POST {endpoint}/v1beta/models/{model}:streamGenerateContent?alt=sse
//!
//! Authentication uses the `x-goog-api-key` header. Embeddings are not
//! offered through this client.

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

/// Thin client for the Gemini `generateContent` API.
#[derive(Debug)]
pub struct GeminiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_stream: String,
}

impl GeminiService {
    /// Creates a new [`GeminiService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not Gemini
    /// - `MissingApiKey` if `cfg.api_key` is `None`
    /// - `InvalidEndpoint` if `cfg.endpoint` is invalid
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != LlmProvider::Gemini {
            return Err(provider_err(ProviderErrorKind::InvalidProvider));
        }
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| provider_err(ProviderErrorKind::MissingApiKey))?;

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(provider_err(ProviderErrorKind::InvalidEndpoint(
                cfg.endpoint.clone(),
            )));
        }

        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(&api_key).map_err(|e| {
            provider_err(ProviderErrorKind::Decode(format!(
                "invalid API key header: {e}"
            )))
        })?;
        headers.insert("x-goog-api-key", key);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = cfg.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let base = format!("{}/v1beta/models/{}", cfg.base_url(), cfg.model);
        let url_generate = format!("{base}:generateContent");
        let url_stream = format!("{base}:streamGenerateContent?alt=sse");

        info!(model = %cfg.model, endpoint = %cfg.endpoint, "GeminiService initialized");

        Ok(Self {
            client,
            cfg,
            url_generate,
            url_stream,
        })
    }

    /// Performs a single `generateContent` call and joins the text parts of
    /// the first candidate.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let started = Instant::now();
        let body = GenerateContentRequest::from_cfg(&self.cfg, prompt, system);
        let resp = self.post(&self.url_generate, &body).await?;

        let out: GenerateContentResponse = resp.json().await.map_err(|e| {
            provider_err(ProviderErrorKind::Decode(format!(
                "serde error: {e}; expected `candidates[0].content.parts`"
            )))
        })?;
        let text = out
            .first_text()
            .ok_or_else(|| provider_err(ProviderErrorKind::EmptyChoices))?;

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "gemini generation completed"
        );
        Ok(text)
    }

    /// Streams `streamGenerateContent` over SSE. The event carrying
    /// `finishReason` completes the stream.
    pub async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream> {
        let body = GenerateContentRequest::from_cfg(&self.cfg, prompt, system);
        let resp = self.post(&self.url_stream, &body).await?;
        debug!(model = %self.cfg.model, "gemini stream opened");
        Ok(spawn_line_stream(resp, LlmProvider::Gemini, parse_sse_line))
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        debug!(model = %self.cfg.model, %url, "POST");
        let resp = self.client.post(url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%status, %url, %snippet, "Gemini returned non-success status");
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
    ProviderError::new(LlmProvider::Gemini, kind).into()
}

pub(crate) fn parse_sse_line(line: &str) -> std::result::Result<LineEvent, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(LineEvent::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(LineEvent::Skip);
    }
    let chunk: GenerateContentResponse = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(
            LlmProvider::Gemini,
            ProviderErrorKind::Decode(format!("invalid stream event: {e}")),
        )
    })?;
    // Gemini has no terminator event; the last chunk carries `finishReason`.
    let finished = chunk.is_finished();
    let text = chunk.first_text().unwrap_or_default();
    Ok(if finished {
        LineEvent::Last(text)
    } else {
        LineEvent::Fragment(text)
    })
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_cfg(cfg: &LlmModelConfig, prompt: &'a str, system: Option<&'a str>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.map(|s| Content {
                role: None,
                parts: vec![Part { text: s }],
            }),
            generation_config: GenerationConfig {
                temperature: cfg.temperature,
                top_p: cfg.top_p,
                max_output_tokens: cfg.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn is_finished(&self) -> bool {
        self.candidates.iter().any(|c| c.finish_reason.is_some())
    }

    fn first_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let parts = candidate.content?.parts;
        Some(parts.into_iter().filter_map(|p| p.text).collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Gemini,
            model: "gemini-pro".into(),
            endpoint: endpoint.into(),
            api_key: Some("g-key".into()),
            max_tokens: None,
            temperature: Some(0.2),
            top_p: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn sse_line_joins_parts() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), LineEvent::Fragment("ab".into()));
        assert_eq!(
            parse_sse_line(r#"data: {"candidates":[]}"#).unwrap(),
            LineEvent::Fragment(String::new())
        );
        let last = r#"data: {"candidates":[{"content":{"parts":[{"text":"."}]},"finishReason":"STOP"}]}"#;
        assert_eq!(parse_sse_line(last).unwrap(), LineEvent::Last(".".into()));
        assert_eq!(parse_sse_line("event: ping").unwrap(), LineEvent::Skip);
    }

    #[tokio::test]
    async fn generate_uses_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .mount(&server)
            .await;

        let svc = GeminiService::new(cfg(&server.uri())).unwrap();
        assert_eq!(svc.generate("q", None).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn generate_stream_reads_sse_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Rust \"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"is fast\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let svc = GeminiService::new(cfg(&server.uri())).unwrap();
        let stream = svc.generate_stream("q", Some("sys")).await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "Rust is fast");
    }
}
