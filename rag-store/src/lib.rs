//! Vector index and ingestion for the documentation agent.
//!
//! This crate provides:
//! - [`ChunkSplitter`]: overlapping fixed-size character windows
//! - [`VectorIndex`]: similarity search over a local file or a Qdrant collection
//! - [`IndexLifecycle`]: open / seed / rebuild-on-dimension-change at startup
//! - [`Ingestor`]: append URL or text sources to the live index
//!
//! The design is flat (no deep nesting) and splits responsibilities into focused modules.

mod config;
pub mod embed;
mod embed_pool;
mod errors;
mod ids;
pub mod index;
mod ingest;
mod lifecycle;
mod loader;
mod qdrant_facade;
mod record;
mod splitter;

pub use config::{DistanceKind, IndexBackend, RagConfig};
pub use embed::EmbeddingsProvider;
pub use embed::hashing::HashingEmbedder;
pub use embed::service::ServiceEmbedder;
pub use errors::RagError;
pub use ids::{entry_id, stable_uuid};
pub use index::{IndexLocation, IndexStore, VectorIndex, location_for};
pub use ingest::{IngestReport, Ingestor};
pub use lifecycle::IndexLifecycle;
pub use loader::{SourceLoader, WebLoader};
pub use record::{Chunk, Document, IndexEntry, Metadata, RetrievedChunk, SOURCE_KEY};
pub use splitter::ChunkSplitter;
