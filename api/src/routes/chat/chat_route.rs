//! POST /chat: streamed answer, optionally grounded on an uploaded file.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::header,
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use tracing::{info, warn};

use crate::{
    app::app_state::AppState,
    error_handler::{AppError, AppResult},
};

/// Handler: POST /chat (multipart: `text`, optional `file`)
///
/// Responds with `text/plain`, one body frame per generated fragment. If the
/// model fails mid-answer the body ends early; fragments already sent stand.
/// A client that disconnects drops the stream, which stops generation.
///
/// # Example
/// ```bash
/// curl -N -X POST http://127.0.0.1:8000/chat \
///   -F text='What does foo do?' -F file=@foo.py
/// ```
pub async fn chat(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let mut multipart = multipart?;
    let mut text = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => text = Some(field.text().await?),
            Some("file") => {
                let bytes = field.bytes().await?;
                file = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            _ => {}
        }
    }
    let text = text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("missing multipart field 'text'".into()))?;

    let answer = state.agent.stream_pipeline(&text, file.as_deref()).await?;
    info!(
        documents = answer.documents.len(),
        upload = file.is_some(),
        "chat: streaming"
    );

    let body = Body::from_stream(
        answer
            .fragments
            .inspect_err(|e| warn!(error = %e, "chat: generation failed mid-stream")),
    );
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}
