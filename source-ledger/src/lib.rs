//! Registry of user-facing source records (`sources_metadata.json`).
//!
//! The ledger is a flat JSON array rewritten atomically on every change. Ids
//! come from a counter persisted next to it, so they are never reused after a
//! deletion. It is independent of the vector index: keeping the two in step
//! is the caller's job.

mod errors;
mod ledger;
mod record;

pub use errors::LedgerError;
pub use ledger::SourceLedger;
pub use record::{NewSource, SourceKind, SourceRecord};
