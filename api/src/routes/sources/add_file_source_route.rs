//! POST /sources/file: index an uploaded text file, register it.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use source_ledger::NewSource;
use tracing::{info, warn};

use crate::{
    app::app_state::AppState,
    error_handler::{AppError, AppResult},
    routes::sources::{register, source_request::AddSourceResponse},
};

/// Handler: POST /sources/file (multipart field `file`)
///
/// The body is decoded as UTF-8; invalid sequences are replaced.
pub async fn add_file_source(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<AddSourceResponse>> {
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("file field has no filename".into()))?;
        let bytes = field.bytes().await?;
        upload = Some((filename, String::from_utf8_lossy(&bytes).into_owned()));
        break;
    }
    let Some((filename, content)) = upload else {
        return Err(AppError::BadRequest("missing multipart field 'file'".into()));
    };
    info!(%filename, bytes = content.len(), "adding file source");

    let report = state
        .agent
        .add_file_source(&content, &filename)
        .await
        .map_err(|e| {
            warn!(%filename, error = %e, "file ingestion failed");
            AppError::Ingestion(e)
        })?;
    Ok(Json(register(&state, report, NewSource::file(filename)).await?))
}
