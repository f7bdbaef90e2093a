//! POST /ask: single-shot RAG answer with the context that was used.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use contextor::AgentState;
use tracing::debug;

use crate::{
    app::app_state::AppState,
    error_handler::{AppError, AppResult},
    routes::ask::ask_request::AskRequest,
};

/// Handler: POST /ask
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8000/ask \
///   -H 'content-type: application/json' \
///   -d '{"question":"What is retrieval augmented generation?"}'
/// ```
pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> AppResult<Json<AgentState>> {
    let Json(body) = payload?;
    if body.question.trim().is_empty() {
        return Err(AppError::BadRequest("question must not be empty".into()));
    }
    let answer = state.agent.run_pipeline(&body.question).await?;
    debug!(documents = answer.documents.len(), "ask_question: done");
    Ok(Json(answer))
}
