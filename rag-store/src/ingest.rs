//! Source ingestion into the live index.
//!
//! Both entry points fetch or wrap a [`Document`], split it and append the
//! chunks to the [`VectorIndex`]. They never touch the source ledger; the
//! caller registers the source after a successful ingestion.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::errors::RagError;
use crate::index::VectorIndex;
use crate::loader::SourceLoader;
use crate::record::Document;
use crate::splitter::ChunkSplitter;

/// Outcome of a successful ingestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source: String,
    /// Chunks written to the index.
    pub chunks: usize,
}

/// Appends new sources to a live index.
#[derive(Clone)]
pub struct Ingestor {
    index: VectorIndex,
    splitter: ChunkSplitter,
    loader: Arc<dyn SourceLoader>,
}

impl Ingestor {
    pub fn new(index: VectorIndex, splitter: ChunkSplitter, loader: Arc<dyn SourceLoader>) -> Self {
        Self {
            index,
            splitter,
            loader,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Fetches `url` and indexes its content.
    ///
    /// # Errors
    /// Fetch, empty-content, embedding or storage failures. The index is
    /// unchanged on error.
    #[instrument(skip(self))]
    pub async fn ingest_url(&self, url: &str) -> Result<IngestReport, RagError> {
        let doc = self.loader.load(url).await?;
        self.ingest_document(doc).await
    }

    /// Indexes `content` as one document whose source is `label`.
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub async fn ingest_text(&self, content: &str, label: &str) -> Result<IngestReport, RagError> {
        self.ingest_document(Document::new(content, label)).await
    }

    /// Splits and indexes an already loaded document.
    pub async fn ingest_document(&self, doc: Document) -> Result<IngestReport, RagError> {
        let source = doc.source().to_string();
        if doc.text.trim().is_empty() {
            warn!(%source, "refusing to ingest empty document");
            return Err(RagError::EmptyDocument(source));
        }
        let chunks = self.splitter.split(&doc);
        let written = self.index.add_chunks(chunks).await?;
        info!(%source, chunks = written, "source ingested");
        Ok(IngestReport {
            source,
            chunks: written,
        })
    }
}
