use serde::{Deserialize, Serialize};
use source_ledger::SourceRecord;

/// Request payload for POST /sources/url.
#[derive(Debug, Deserialize)]
pub struct AddUrlRequest {
    pub url: String,
}

/// Response payload for both source-adding routes.
#[derive(Debug, Serialize)]
pub struct AddSourceResponse {
    pub message: String,
    /// Chunks written to the index.
    pub chunks: usize,
    /// The ledger record created for the source.
    pub source: SourceRecord,
}
