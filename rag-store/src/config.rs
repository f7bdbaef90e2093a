//! Runtime and index configuration.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::errors::RagError;

/// Distance function used for the vector space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DistanceKind {
    /// Cosine similarity (recommended for most embeddings).
    #[default]
    Cosine,
    /// Dot product (useful for normalized vectors).
    Dot,
    /// Euclidean distance (L2).
    Euclid,
}

impl FromStr for DistanceKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclid" | "euclidean" | "l2" => Ok(Self::Euclid),
            other => Err(RagError::Config(format!("unknown distance '{other}'"))),
        }
    }
}

/// Where the vector index lives.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexBackend {
    /// `index.json` inside a directory on the local filesystem.
    Local { dir: PathBuf },
    /// A Qdrant collection.
    Qdrant {
        /// gRPC endpoint, e.g. `http://localhost:6334`.
        url: String,
        /// Optional API key for Qdrant Cloud.
        api_key: Option<String>,
        collection: String,
    },
}

/// Configuration for chunking, ingestion and retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub backend: IndexBackend,
    /// Distance function (Cosine by default).
    pub distance: DistanceKind,
    /// Chunks returned per retrieval.
    pub top_k: usize,
    /// Window size in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub chunk_overlap: usize,
    /// Concurrent embedding requests during ingestion.
    pub embedding_concurrency: usize,
    /// Upsert batch size for Qdrant (typical range: 128..512).
    pub upsert_batch: usize,
    /// Exact search flag for Qdrant (false = HNSW ANN).
    pub exact_search: bool,
}

impl RagConfig {
    /// Defaults for a local index stored under `dir`.
    pub fn new_local(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: IndexBackend::Local { dir: dir.into() },
            distance: DistanceKind::Cosine,
            top_k: 4,
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_concurrency: 4,
            upsert_batch: 256,
            exact_search: false,
        }
    }

    /// Build from environment variables, falling back to defaults.
    ///
    /// - `INDEX_BACKEND` = `local` | `qdrant` (default `local`)
    /// - `INDEX_DIR` (default `./vector_index`)
    /// - `QDRANT_URL`, `QDRANT_API_KEY`, `QDRANT_COLLECTION`
    /// - `RAG_DISTANCE`, `RAG_TOP_K`, `CHUNK_SIZE`, `CHUNK_OVERLAP`
    /// - `EMBEDDING_CONCURRENCY`, `QDRANT_BATCH_SIZE`, `RAG_EXACT_SEARCH`
    ///
    /// # Errors
    /// Unknown backend or distance names, or values rejected by [`RagConfig::validate`].
    pub fn from_env() -> Result<Self, RagError> {
        let backend = match env("INDEX_BACKEND", "local").to_ascii_lowercase().as_str() {
            "local" => IndexBackend::Local {
                dir: PathBuf::from(env("INDEX_DIR", "./vector_index")),
            },
            "qdrant" => IndexBackend::Qdrant {
                url: env("QDRANT_URL", "http://localhost:6334"),
                api_key: std::env::var("QDRANT_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                collection: env("QDRANT_COLLECTION", "doc_chunks"),
            },
            other => {
                return Err(RagError::Config(format!(
                    "INDEX_BACKEND must be 'local' or 'qdrant', got '{other}'"
                )));
            }
        };

        let defaults = Self::new_local("");
        let cfg = Self {
            backend,
            distance: env("RAG_DISTANCE", "cosine").parse()?,
            top_k: parse("RAG_TOP_K", defaults.top_k),
            chunk_size: parse("CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: parse("CHUNK_OVERLAP", defaults.chunk_overlap),
            embedding_concurrency: parse("EMBEDDING_CONCURRENCY", defaults.embedding_concurrency),
            upsert_batch: parse("QDRANT_BATCH_SIZE", defaults.upsert_batch),
            exact_search: env("RAG_EXACT_SEARCH", "false") == "true",
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        match &self.backend {
            IndexBackend::Local { dir } if dir.as_os_str().is_empty() => {
                return Err(RagError::Config("index dir is empty".into()));
            }
            IndexBackend::Qdrant {
                url, collection, ..
            } => {
                if url.trim().is_empty() {
                    return Err(RagError::Config("qdrant_url is empty".into()));
                }
                if collection.trim().is_empty() {
                    return Err(RagError::Config("collection is empty".into()));
                }
            }
            IndexBackend::Local { .. } => {}
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be > 0".into()));
        }
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(
                "chunk_size must be > 0 and chunk_overlap < chunk_size".into(),
            ));
        }
        if self.upsert_batch == 0 {
            return Err(RagError::Config("upsert_batch must be > 0".into()));
        }
        Ok(())
    }
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| dflt.to_string())
}

fn parse<T: FromStr>(k: &str, dflt: T) -> T {
    match std::env::var(k) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(var = k, value = %v, "unparsable value, using default");
            dflt
        }),
        Err(_) => dflt,
    }
}
