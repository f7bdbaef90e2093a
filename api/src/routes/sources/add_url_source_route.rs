//! POST /sources/url: fetch a page, index it, register it.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use source_ledger::NewSource;
use tracing::{info, warn};

use crate::{
    app::app_state::AppState,
    error_handler::{AppError, AppResult},
    routes::sources::{register, source_request::{AddSourceResponse, AddUrlRequest}},
};

/// Handler: POST /sources/url
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8000/sources/url \
///   -H 'content-type: application/json' \
///   -d '{"url":"https://docs.cohere.com/docs/intro-to-rag"}'
/// ```
pub async fn add_url_source(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddUrlRequest>, JsonRejection>,
) -> AppResult<Json<AddSourceResponse>> {
    let Json(body) = payload?;
    let url = body.url.trim();
    if url.is_empty() {
        return Err(AppError::BadRequest("url must not be empty".into()));
    }
    info!(%url, "adding url source");

    let report = state.agent.add_url_source(url).await.map_err(|e| {
        warn!(%url, error = %e, "url ingestion failed");
        AppError::Ingestion(e)
    })?;
    Ok(Json(register(&state, report, NewSource::url(url)).await?))
}
