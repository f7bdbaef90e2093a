//! HTTP surface of the documentation agent.

use std::sync::Arc;

mod app;
mod error_handler;
mod routes;

use axum::{
    Router,
    routing::{delete, get, post},
};
use contextor::{DocAgent, Providers};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub use crate::app::{app_config::AppConfig, app_state::AppState};
pub use crate::error_handler::{AppError, AppResult};

use crate::routes::{
    ask::ask_question_route::ask_question,
    chat::chat_route::chat,
    root_route::root,
    sources::{
        add_file_source_route::add_file_source, add_url_source_route::add_url_source,
        delete_source_route::delete_source, list_sources_route::list_sources,
    },
};

/// All routes, with permissive CORS.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/sources", get(list_sources))
        .route("/sources/url", post(add_url_source))
        .route("/sources/file", post(add_file_source))
        .route("/sources/{id}", delete(delete_source))
        .route("/chat", post(chat))
        .route("/ask", post(ask_question))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Opens the agent from env config and serves until Ctrl+C.
///
/// # Errors
/// Configuration, fatal index lifecycle outcomes, bind and serve failures.
pub async fn start() -> Result<(), AppError> {
    let cfg = AppConfig::from_env()?;
    let providers = Providers::from_config(&cfg.agent)?;
    let agent = DocAgent::open(&cfg.agent, providers).await?;
    let app = router(Arc::new(AppState::new(agent)));

    let listener = TcpListener::bind(&cfg.address)
        .await
        .map_err(|source| AppError::Bind {
            address: cfg.address.clone(),
            source,
        })?;
    info!(address = %cfg.address, "documentation agent listening");

    // Start server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed, waits forever.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_llm_service::{LlmModelConfig, LlmProvider, TokenStream};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use contextor::{ContextorConfig, EmbeddingChoice, Generator, llm::GenFuture};
    use rag_store::{HashingEmbedder, RagConfig, WebLoader};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers with the question line of the prompt, in 4-char fragments.
    struct EchoGenerator;

    fn echo(prompt: &str) -> String {
        let question = prompt
            .lines()
            .skip_while(|l| !l.starts_with("Question:"))
            .nth(1)
            .unwrap_or("");
        format!("You asked: {question}")
    }

    impl Generator for EchoGenerator {
        fn generate<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, String> {
            Box::pin(async move { Ok(echo(prompt)) })
        }

        fn generate_stream<'a>(&'a self, prompt: &'a str) -> GenFuture<'a, TokenStream> {
            Box::pin(async move {
                let chars: Vec<char> = echo(prompt).chars().collect();
                Ok(TokenStream::from_fragments(
                    chars.chunks(4).map(|c| c.iter().collect::<String>()),
                ))
            })
        }
    }

    async fn app(dir: &std::path::Path) -> Router {
        let mut rag = RagConfig::new_local(dir.join("vector_index"));
        rag.chunk_size = 120;
        rag.chunk_overlap = 20;
        let cfg = ContextorConfig {
            rag,
            generation: LlmModelConfig {
                provider: LlmProvider::Ollama,
                model: "unused".into(),
                endpoint: "http://localhost:11434".into(),
                api_key: None,
                max_tokens: None,
                temperature: None,
                top_p: None,
                timeout_secs: None,
            },
            embedding: EmbeddingChoice::Hashing { dim: 96 },
            seed_urls: Vec::new(),
            sources_file: dir.join("sources_metadata.json"),
        };
        let providers = Providers {
            embedder: Arc::new(HashingEmbedder::new(96).unwrap()),
            generator: Arc::new(EchoGenerator),
            loader: Arc::new(WebLoader::new().unwrap()),
        };
        let agent = DocAgent::open(&cfg, providers).await.unwrap();
        router(Arc::new(AppState::new(agent)))
    }

    const BOUNDARY: &str = "X-DOC-AGENT-BOUNDARY";

    /// `(field, filename, content)` triples as a multipart/form-data request.
    fn multipart(uri: &str, fields: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, content) in fields {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(f) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: text/plain\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(res: Response) -> Value {
        serde_json::from_str(&body_text(res).await).unwrap()
    }

    #[tokio::test]
    async fn root_reports_running() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path()).await.oneshot(get("/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res).await,
            json!({"message": "Documentation Agent Backend is running"})
        );
    }

    #[tokio::test]
    async fn url_sources_are_indexed_then_listed() {
        let server = MockServer::start().await;
        for (p, text) in [
            ("/a", "Chunk overlap keeps sentences intact across window borders."),
            ("/b", "Streaming sends generated tokens to the browser as they arrive."),
        ] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_string(text))
                .mount(&server)
                .await;
        }
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        for p in ["/a", "/b"] {
            let url = format!("{}{p}", server.uri());
            let res = app
                .clone()
                .oneshot(json_request("POST", "/sources/url", json!({ "url": url })))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            let body = body_json(res).await;
            assert_eq!(body["source"]["url"], json!(url));
            assert!(body["chunks"].as_u64().unwrap() >= 1);
        }

        let sources = body_json(app.clone().oneshot(get("/sources")).await.unwrap()).await;
        let list = sources.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|s| s["type"] == "url"));
        assert!(list[0]["id"].as_u64() < list[1]["id"].as_u64());
    }

    #[tokio::test]
    async fn unreachable_url_is_rejected_and_not_registered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let url = format!("{}/missing", server.uri());
        let res = app
            .clone()
            .oneshot(json_request("POST", "/sources/url", json!({ "url": url })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "INGESTION_FAILED");

        let sources = body_json(app.oneshot(get("/sources")).await.unwrap()).await;
        assert_eq!(sources, json!([]));
    }

    #[tokio::test]
    async fn uploaded_file_is_registered_and_deletable() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let res = app
            .clone()
            .oneshot(multipart(
                "/sources/file",
                &[("file", Some("notes.md"), "The wombat_sort helper orders wombats by height.")],
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let record = body_json(res).await["source"].clone();
        assert_eq!(record["type"], "file");
        assert_eq!(record["source"], "notes.md");
        assert_eq!(record["url"], Value::Null);

        let res = app
            .clone()
            .oneshot(json_request("POST", "/ask", json!({"question": "wombat_sort"})))
            .await
            .unwrap();
        let answer = body_json(res).await;
        assert_eq!(answer["documents"][0]["metadata"]["source"], "notes.md");

        let id = record["id"].as_u64().unwrap();
        let del = |id: u64| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/sources/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(app.clone().oneshot(del(id)).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.clone().oneshot(del(id)).await.unwrap().status(),
            StatusCode::NOT_FOUND
        );
        let sources = body_json(app.oneshot(get("/sources")).await.unwrap()).await;
        assert_eq!(sources, json!([]));
    }

    #[tokio::test]
    async fn chat_streams_the_same_answer_as_ask() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let q = "How are answers streamed?";

        let res = app
            .clone()
            .oneshot(multipart("/chat", &[("text", None, q)]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(
            res.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        let streamed = body_text(res).await;

        let res = app
            .oneshot(json_request("POST", "/ask", json!({ "question": q })))
            .await
            .unwrap();
        let single = body_json(res).await;
        assert_eq!(json!(streamed), single["generation"]);
        assert_eq!(streamed, format!("You asked: {q}"));
    }

    #[tokio::test]
    async fn chat_with_file_uses_upload_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let res = app
            .clone()
            .oneshot(multipart(
                "/chat",
                &[
                    ("text", None, "What does function foo do?"),
                    ("file", Some("foo.py"), "def foo(): return 42"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_text(res).await,
            "You asked: Context from uploaded file:"
        );

        // The upload was never indexed.
        let sources = body_json(app.oneshot(get("/sources")).await.unwrap()).await;
        assert_eq!(sources, json!([]));
    }

    #[tokio::test]
    async fn chat_without_text_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(dir.path())
            .await
            .oneshot(multipart("/chat", &[("file", Some("a.txt"), "x")]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
