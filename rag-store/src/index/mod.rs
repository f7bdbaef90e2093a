//! Vector index: storage seams plus the query-time handle.
//!
//! - [`IndexLocation`] owns a persistence location (directory, collection):
//!   load what is there, create a fresh index, or destroy everything.
//! - [`IndexStore`] is an opened index: insert, search, count.
//! - [`VectorIndex`] pairs a store with the embedding provider used to encode
//!   queries and new chunks. It is cheap to clone and shared across requests.

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{debug, trace};

use crate::config::{IndexBackend, RagConfig};
use crate::embed::EmbeddingsProvider;
use crate::embed_pool::embed_chunks;
use crate::errors::RagError;
use crate::ids::entry_id;
use crate::qdrant_facade::QdrantFacade;
use crate::record::{Chunk, IndexEntry, RetrievedChunk};

pub mod local;
pub mod qdrant;

/// Boxed future returned by the storage traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RagError>> + Send + 'a>>;

/// An opened, persistent set of index entries.
///
/// Implementations serialize concurrent inserts and searches themselves, and
/// apply each `insert` call entirely or not at all.
pub trait IndexStore: Send + Sync {
    /// Dimensionality of every stored vector.
    fn dimension(&self) -> usize;

    /// Inserts entries; an existing entry with the same id is replaced.
    /// Returns the number of entries written.
    fn insert<'a>(&'a self, entries: Vec<IndexEntry>) -> StoreFuture<'a, usize>;

    /// Up to `top_k` entries in descending similarity to `query`.
    fn search<'a>(&'a self, query: &'a [f32], top_k: usize) -> StoreFuture<'a, Vec<RetrievedChunk>>;

    /// Number of stored entries.
    fn count<'a>(&'a self) -> StoreFuture<'a, usize>;

    /// Whether any entry carries `source` as its source metadata.
    fn contains_source<'a>(&'a self, source: &'a str) -> StoreFuture<'a, bool>;
}

/// A persistence location that may or may not hold an index.
pub trait IndexLocation: Send + Sync {
    /// Human-readable location for logs.
    fn describe(&self) -> String;

    /// Opens the persisted index, `Ok(None)` if there is none.
    fn load<'a>(&'a self) -> StoreFuture<'a, Option<Arc<dyn IndexStore>>>;

    /// Creates a new index of `dimension` holding `entries`, replacing
    /// nothing: the location must be empty.
    fn create<'a>(
        &'a self,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> StoreFuture<'a, Arc<dyn IndexStore>>;

    /// Removes the persisted index entirely.
    fn destroy<'a>(&'a self) -> StoreFuture<'a, ()>;
}

/// Builds the location described by `cfg.backend`.
///
/// # Errors
/// Returns `RagError::Qdrant` if the Qdrant client cannot be built.
pub fn location_for(cfg: &RagConfig) -> Result<Arc<dyn IndexLocation>, RagError> {
    let location: Arc<dyn IndexLocation> = match &cfg.backend {
        IndexBackend::Local { dir } => {
            Arc::new(local::LocalLocation::new(dir.clone(), cfg.distance))
        }
        IndexBackend::Qdrant { .. } => {
            Arc::new(qdrant::QdrantLocation::new(Arc::new(QdrantFacade::new(cfg)?)))
        }
    };
    Ok(location)
}

/// Builds index entries from chunks and their vectors (same order).
pub(crate) fn to_entries(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Vec<IndexEntry> {
    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry {
            id: entry_id(chunk.source(), chunk.chunk_index, &chunk.text),
            vector,
            chunk,
        })
        .collect()
}

/// Query-time handle over an opened index.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingsProvider>,
    top_k: usize,
    embedding_concurrency: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.store.dimension())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingsProvider>,
        top_k: usize,
        embedding_concurrency: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k: top_k.max(1),
            embedding_concurrency: embedding_concurrency.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The `top_k` chunks most similar to `query`, best first.
    ///
    /// # Errors
    /// Embedding failures, a query vector of the wrong size, or store errors.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, RagError> {
        let qv = self.embedder.embed(query).await?;
        if qv.len() != self.dimension() {
            return Err(RagError::VectorSizeMismatch {
                got: qv.len(),
                want: self.dimension(),
            });
        }
        let hits = self.store.search(&qv, self.top_k).await?;
        trace!(top_k = self.top_k, hits = hits.len(), "retrieve");
        Ok(hits)
    }

    /// Embeds and inserts chunks. Every vector is computed before the store
    /// is touched, so a failure leaves the index unmodified.
    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let vectors = embed_chunks(
            &chunks,
            self.embedder.as_ref(),
            Some(self.dimension()),
            self.embedding_concurrency,
        )
        .await?;
        let written = self.store.insert(to_entries(chunks, vectors)).await?;
        debug!(written, "chunks added to index");
        Ok(written)
    }

    pub async fn len(&self) -> Result<usize, RagError> {
        self.store.count().await
    }

    pub async fn contains_source(&self, source: &str) -> Result<bool, RagError> {
        self.store.contains_source(source).await
    }
}

/// Similarity of `a` and `b` under `distance`; higher is closer.
pub(crate) fn similarity(distance: crate::config::DistanceKind, a: &[f32], b: &[f32]) -> f32 {
    use crate::config::DistanceKind;
    match distance {
        DistanceKind::Dot => dot(a, b),
        DistanceKind::Cosine => {
            let na = dot(a, a).sqrt();
            let nb = dot(b, b).sqrt();
            if na == 0.0 || nb == 0.0 {
                0.0
            } else {
                dot(a, b) / (na * nb)
            }
        }
        DistanceKind::Euclid => {
            let d: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            1.0 / (1.0 + d.sqrt())
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceKind;

    #[test]
    fn similarity_orders_closer_vectors_higher() {
        let q = [1.0, 0.0];
        let near = [0.9, 0.1];
        let far = [0.0, 1.0];
        for d in [DistanceKind::Cosine, DistanceKind::Dot, DistanceKind::Euclid] {
            assert!(similarity(d, &q, &near) > similarity(d, &q, &far), "{d:?}");
        }
        assert_eq!(similarity(DistanceKind::Cosine, &q, &[0.0, 0.0]), 0.0);
    }
}
