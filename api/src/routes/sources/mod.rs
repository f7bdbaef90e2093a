pub mod add_file_source_route;
pub mod add_url_source_route;
pub mod delete_source_route;
pub mod list_sources_route;
pub mod source_request;

use rag_store::IngestReport;
use source_ledger::NewSource;
use tracing::error;

use crate::{app::app_state::AppState, error_handler::AppResult};
use source_request::AddSourceResponse;

/// Second half of adding a source: the content is indexed, now record it.
///
/// A failure here leaves the index ahead of the ledger; it is logged and the
/// request fails.
pub(crate) async fn register(
    state: &AppState,
    report: IngestReport,
    new: NewSource,
) -> AppResult<AddSourceResponse> {
    let source = state.agent.register_source(new).await.inspect_err(|e| {
        error!(
            source = %report.source,
            error = %e,
            "source indexed but not registered; index and ledger diverged"
        )
    })?;
    Ok(AddSourceResponse {
        message: format!("Indexed {} chunks from {}", report.chunks, report.source),
        chunks: report.chunks,
        source,
    })
}
