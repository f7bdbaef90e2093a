use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use contextor::ContextorError;
use rag_store::RagError;
use serde::Serialize;
use thiserror::Error;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / IO / server ---
    #[error("failed to bind listener on {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Adding a source failed; nothing was indexed or registered.
    #[error("{0}")]
    Ingestion(#[source] ContextorError),

    /// Any other agent failure (startup, retrieval, generation, ledger).
    #[error(transparent)]
    Agent(#[from] ContextorError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            // 4xx
            AppError::BadRequest(_) | AppError::Ingestion(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // provider side
            AppError::Agent(ContextorError::Llm(_))
            | AppError::Agent(ContextorError::Rag(RagError::Provider(_))) => StatusCode::BAD_GATEWAY,

            // 5xx
            AppError::Agent(_) | AppError::Bind { .. } | AppError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Bind { .. } => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Ingestion(_) => "INGESTION_FAILED",
            AppError::Agent(ContextorError::Llm(_))
            | AppError::Agent(ContextorError::Rag(RagError::Provider(_))) => "UPSTREAM_ERROR",
            AppError::Agent(ContextorError::Ledger(_)) => "LEDGER_ERROR",
            AppError::Agent(_) => "AGENT_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.error_code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(err: MultipartRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}
