//! Index lifecycle: open a persisted index, seed a fresh one, or rebuild
//! after the embedding model changed dimensionality.
//!
//! Decision table for [`IndexLifecycle::open`]:
//!
//! | persisted state                     | action                               |
//! |-------------------------------------|--------------------------------------|
//! | healthy, same dimension             | reuse as is (no fetch, no embedding) |
//! | absent                              | seed from URLs (or create empty)     |
//! | dimension differs from the provider | destroy, then seed                   |
//! | destroy fails                       | fatal: the mismatch error            |
//! | any other load error                | fatal                                |

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::RagConfig;
use crate::embed::EmbeddingsProvider;
use crate::embed_pool::embed_chunks;
use crate::errors::RagError;
use crate::index::{IndexLocation, IndexStore, VectorIndex, to_entries};
use crate::loader::SourceLoader;
use crate::splitter::ChunkSplitter;

/// Owns creation, reload and recovery of the vector index.
#[derive(Clone)]
pub struct IndexLifecycle {
    location: Arc<dyn IndexLocation>,
    embedder: Arc<dyn EmbeddingsProvider>,
    loader: Arc<dyn SourceLoader>,
    splitter: ChunkSplitter,
    top_k: usize,
    embedding_concurrency: usize,
}

impl IndexLifecycle {
    /// # Errors
    /// Invalid chunking configuration.
    pub fn new(
        cfg: &RagConfig,
        location: Arc<dyn IndexLocation>,
        embedder: Arc<dyn EmbeddingsProvider>,
        loader: Arc<dyn SourceLoader>,
    ) -> Result<Self, RagError> {
        Ok(Self {
            location,
            embedder,
            loader,
            splitter: ChunkSplitter::new(cfg.chunk_size, cfg.chunk_overlap)?,
            top_k: cfg.top_k,
            embedding_concurrency: cfg.embedding_concurrency,
        })
    }

    /// Opens the index at the configured location.
    ///
    /// # Errors
    /// - the provider cannot report its dimensionality
    /// - a seed URL cannot be fetched or embedded
    /// - the persisted index is unusable for any reason other than dimension
    /// - an incompatible index cannot be removed (returns the mismatch)
    pub async fn open(&self, seed_urls: &[String]) -> Result<VectorIndex, RagError> {
        let location = self.location.describe();
        let dimension = self.embedder.dimension().await?;
        info!(%location, dimension, "opening vector index");

        match self.load_checked(dimension).await {
            Ok(Some(store)) => {
                info!(%location, "reusing persisted index");
                return Ok(self.handle(store));
            }
            Ok(None) => info!(%location, "no persisted index, building a new one"),
            Err(RagError::DimensionMismatch { stored, expected }) => {
                warn!(
                    %location,
                    stored,
                    expected,
                    "embedding dimension changed, rebuilding index"
                );
                if let Err(e) = self.location.destroy().await {
                    error!(%location, error = %e, "cannot remove incompatible index");
                    return Err(RagError::DimensionMismatch { stored, expected });
                }
            }
            Err(e) => {
                error!(%location, error = %e, "failed to load persisted index");
                return Err(e);
            }
        }

        let store = self.seed(dimension, seed_urls).await?;
        Ok(self.handle(store))
    }

    async fn load_checked(&self, expected: usize) -> Result<Option<Arc<dyn IndexStore>>, RagError> {
        match self.location.load().await? {
            Some(store) if store.dimension() != expected => Err(RagError::DimensionMismatch {
                stored: store.dimension(),
                expected,
            }),
            other => Ok(other),
        }
    }

    /// Fetches, splits and embeds every seed before creating the index, so
    /// a failure leaves the location empty.
    async fn seed(&self, dimension: usize, seed_urls: &[String]) -> Result<Arc<dyn IndexStore>, RagError> {
        let mut chunks = Vec::new();
        for url in seed_urls {
            let doc = self.loader.load(url).await?;
            if doc.text.trim().is_empty() {
                warn!(%url, "seed source has no text, skipped");
                continue;
            }
            let split = self.splitter.split(&doc);
            info!(%url, chunks = split.len(), "seed source loaded");
            chunks.extend(split);
        }

        let vectors = embed_chunks(
            &chunks,
            self.embedder.as_ref(),
            Some(dimension),
            self.embedding_concurrency,
        )
        .await?;
        let entries = to_entries(chunks, vectors);
        info!(entries = entries.len(), seeds = seed_urls.len(), "creating index");
        self.location.create(dimension, entries).await
    }

    fn handle(&self, store: Arc<dyn IndexStore>) -> VectorIndex {
        VectorIndex::new(
            store,
            Arc::clone(&self.embedder),
            self.top_k,
            self.embedding_concurrency,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DistanceKind;
    use crate::embed::hashing::HashingEmbedder;
    use crate::index::StoreFuture;
    use crate::index::local::LocalLocation;
    use crate::record::{Document, IndexEntry};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::{future::Future, pin::Pin};

    /// Serves canned pages and counts fetches.
    #[derive(Default)]
    pub(crate) struct FakeLoader {
        pub pages: HashMap<String, String>,
        pub fetches: AtomicUsize,
    }

    impl FakeLoader {
        pub(crate) fn with(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, t)| (u.to_string(), t.to_string()))
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl SourceLoader for FakeLoader {
        fn load<'a>(
            &'a self,
            url: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Document, RagError>> + Send + 'a>> {
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                self.pages
                    .get(url)
                    .map(|t| Document::new(t.clone(), url))
                    .ok_or_else(|| RagError::fetch(url, "unreachable"))
            })
        }
    }

    /// Local location whose destroy always fails, as if the files were locked.
    struct LockedLocation(LocalLocation);

    impl IndexLocation for LockedLocation {
        fn describe(&self) -> String {
            self.0.describe()
        }
        fn load<'a>(&'a self) -> StoreFuture<'a, Option<Arc<dyn IndexStore>>> {
            self.0.load()
        }
        fn create<'a>(&'a self, d: usize, e: Vec<IndexEntry>) -> StoreFuture<'a, Arc<dyn IndexStore>> {
            self.0.create(d, e)
        }
        fn destroy<'a>(&'a self) -> StoreFuture<'a, ()> {
            Box::pin(async {
                Err(RagError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "locked",
                )))
            })
        }
    }

    const SEED: &str = "https://docs.example/intro-to-rag";
    const SEED_TEXT: &str = "Retrieval augmented generation grounds a language model in \
        documents fetched from a vector store before it answers.";

    fn lifecycle(
        location: Arc<dyn IndexLocation>,
        dim: usize,
        loader: Arc<FakeLoader>,
    ) -> IndexLifecycle {
        let mut cfg = RagConfig::new_local("unused");
        cfg.chunk_size = 40;
        cfg.chunk_overlap = 10;
        IndexLifecycle::new(
            &cfg,
            location,
            Arc::new(HashingEmbedder::new(dim).unwrap()),
            loader,
        )
        .unwrap()
    }

    fn local(dir: &std::path::Path) -> Arc<dyn IndexLocation> {
        Arc::new(LocalLocation::new(dir.join("idx"), DistanceKind::Cosine))
    }

    #[tokio::test]
    async fn second_open_reuses_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(FakeLoader::with(&[(SEED, SEED_TEXT)]));
        let seeds = vec![SEED.to_string()];

        let first = lifecycle(local(dir.path()), 64, loader.clone())
            .open(&seeds)
            .await
            .unwrap();
        let second = lifecycle(local(dir.path()), 64, loader.clone())
            .open(&seeds)
            .await
            .unwrap();

        assert_eq!(loader.fetches.load(Ordering::SeqCst), 1);
        let q = "what does a vector store do";
        assert_eq!(first.retrieve(q).await.unwrap(), second.retrieve(q).await.unwrap());
        assert!(second.len().await.unwrap() > 1);
    }

    #[tokio::test]
    async fn dimension_change_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(FakeLoader::with(&[(SEED, SEED_TEXT)]));
        let seeds = vec![SEED.to_string()];

        lifecycle(local(dir.path()), 16, loader.clone())
            .open(&seeds)
            .await
            .unwrap();
        let rebuilt = lifecycle(local(dir.path()), 32, loader.clone())
            .open(&seeds)
            .await
            .unwrap();

        assert_eq!(rebuilt.dimension(), 32);
        assert_eq!(loader.fetches.load(Ordering::SeqCst), 2);
        let hits = rebuilt.retrieve("vector store").await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.chunk.source() == SEED));
    }

    #[tokio::test]
    async fn rebuild_in_shared_dir_keeps_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(FakeLoader::with(&[(SEED, SEED_TEXT)]));
        let seeds = vec![SEED.to_string()];
        let shared = || -> Arc<dyn IndexLocation> {
            Arc::new(LocalLocation::new(dir.path(), DistanceKind::Cosine))
        };

        lifecycle(shared(), 16, loader.clone()).open(&seeds).await.unwrap();
        let ledger = dir.path().join("sources_metadata.json");
        tokio::fs::write(&ledger, b"[]").await.unwrap();

        let rebuilt = lifecycle(shared(), 32, loader.clone()).open(&seeds).await.unwrap();

        assert_eq!(rebuilt.dimension(), 32);
        assert!(ledger.exists());
    }

    #[tokio::test]
    async fn blocked_destroy_surfaces_the_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(FakeLoader::with(&[(SEED, SEED_TEXT)]));
        let seeds = vec![SEED.to_string()];
        lifecycle(local(dir.path()), 16, loader.clone())
            .open(&seeds)
            .await
            .unwrap();

        let locked: Arc<dyn IndexLocation> = Arc::new(LockedLocation(LocalLocation::new(
            dir.path().join("idx"),
            DistanceKind::Cosine,
        )));
        let err = lifecycle(locked, 32, loader).open(&seeds).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                stored: 16,
                expected: 32
            }
        ));
    }

    #[tokio::test]
    async fn other_load_failures_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let idx = dir.path().join("idx");
        tokio::fs::create_dir_all(&idx).await.unwrap();
        tokio::fs::write(idx.join("index.json"), b"garbage").await.unwrap();

        let loader = Arc::new(FakeLoader::with(&[(SEED, SEED_TEXT)]));
        let res = lifecycle(local(dir.path()), 16, loader.clone())
            .open(&[SEED.to_string()])
            .await;
        assert!(matches!(res, Err(RagError::Parse(_))));
        assert_eq!(loader.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_seeds_creates_empty_queryable_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = lifecycle(local(dir.path()), 8, Arc::new(FakeLoader::default()))
            .open(&[])
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
        assert!(index.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_seed_is_fatal_and_leaves_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let res = lifecycle(local(dir.path()), 8, Arc::new(FakeLoader::default()))
            .open(&["https://down.example".to_string()])
            .await;
        assert!(matches!(res, Err(RagError::Fetch { .. })));
        assert!(local(dir.path()).load().await.unwrap().is_none());
    }
}
