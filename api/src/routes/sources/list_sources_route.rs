//! GET /sources: registered sources in insertion order.

use std::sync::Arc;

use axum::{Json, extract::State};
use source_ledger::SourceRecord;

use crate::app::app_state::AppState;

pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceRecord>> {
    Json(state.agent.get_sources().await)
}
