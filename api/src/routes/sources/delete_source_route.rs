//! DELETE /sources/{id}: forget a ledger record.
//!
//! Chunks already indexed for that source stay retrievable; the index has no
//! per-source deletion.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::PathRejection},
};
use source_ledger::SourceRecord;
use tracing::info;

use crate::{
    app::app_state::AppState,
    error_handler::{AppError, AppResult},
};

pub async fn delete_source(
    State(state): State<Arc<AppState>>,
    id: Result<Path<u64>, PathRejection>,
) -> AppResult<Json<SourceRecord>> {
    let Path(id) = id?;
    match state.agent.delete_source(id).await? {
        Some(record) => {
            info!(id, source = %record.source, "source record deleted");
            Ok(Json(record))
        }
        None => Err(AppError::NotFound(format!("source {id}"))),
    }
}
