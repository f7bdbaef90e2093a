//! Documentation Q&A agent: the context object behind the HTTP layer.
//!
//! [`DocAgent`] is built once at startup. It opens (or seeds) the vector
//! index, the source ledger and the providers, then serves:
//! - [`DocAgent::add_url_source`] / [`DocAgent::add_file_source`]: index new content
//! - [`DocAgent::run_pipeline`]: retrieve + generate, one answer
//! - [`DocAgent::stream_pipeline`]: retrieve + generate, answer as a token stream
//! - [`DocAgent::get_sources`]: the registered source records
//!
//! Indexing a source and registering it in the ledger are two separate
//! writes; callers register after a successful ingestion.

mod api_types;
pub mod cfg;
mod error;
pub mod llm;
pub mod pipeline;
pub mod prompt;

use std::sync::Arc;

use ai_llm_service::LlmServiceProfiles;
use rag_store::{
    ChunkSplitter, EmbeddingsProvider, HashingEmbedder, IndexLifecycle, IngestReport, Ingestor,
    ServiceEmbedder, SourceLoader, VectorIndex, WebLoader, location_for,
};
use source_ledger::{NewSource, SourceLedger, SourceRecord};
use tracing::{info, warn};

pub use api_types::{AgentState, StreamingAnswer};
pub use cfg::{ContextorConfig, EmbeddingChoice};
pub use error::ContextorError;
pub use llm::Generator;
pub use pipeline::{PipelineStage, RagPipeline, UPLOAD_SOURCE};

/// Capability providers injected into the agent.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingsProvider>,
    pub generator: Arc<dyn Generator>,
    pub loader: Arc<dyn SourceLoader>,
}

impl Providers {
    /// Builds the configured HTTP-backed providers.
    ///
    /// # Errors
    /// Invalid profiles or HTTP clients that cannot be built.
    pub fn from_config(cfg: &ContextorConfig) -> Result<Self, ContextorError> {
        let (embedding_profile, hashing_dim) = match &cfg.embedding {
            EmbeddingChoice::Service(profile) => (Some(profile.clone()), None),
            EmbeddingChoice::Hashing { dim } => (None, Some(*dim)),
        };
        let profiles = Arc::new(LlmServiceProfiles::new(
            cfg.generation.clone(),
            embedding_profile,
        )?);

        let embedder: Arc<dyn EmbeddingsProvider> = match hashing_dim {
            Some(dim) => {
                info!(dim, "using offline hashing embedder");
                Arc::new(HashingEmbedder::new(dim)?)
            }
            None => Arc::new(ServiceEmbedder::new(Arc::clone(&profiles))),
        };

        Ok(Self {
            embedder,
            generator: profiles,
            loader: Arc::new(WebLoader::new()?),
        })
    }
}

/// Process-wide agent state: index, ingestion, pipeline and source ledger.
#[derive(Clone)]
pub struct DocAgent {
    index: VectorIndex,
    ingestor: Ingestor,
    pipeline: RagPipeline,
    ledger: Arc<SourceLedger>,
}

impl DocAgent {
    /// Opens the index (seeding or rebuilding it when needed) and the ledger.
    ///
    /// # Errors
    /// Any fatal index lifecycle outcome; see [`IndexLifecycle::open`].
    pub async fn open(cfg: &ContextorConfig, providers: Providers) -> Result<Self, ContextorError> {
        let location = location_for(&cfg.rag)?;
        let index = IndexLifecycle::new(
            &cfg.rag,
            location,
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.loader),
        )?
        .open(&cfg.seed_urls)
        .await?;

        let splitter = ChunkSplitter::new(cfg.rag.chunk_size, cfg.rag.chunk_overlap)?;
        let ingestor = Ingestor::new(index.clone(), splitter, providers.loader);
        let pipeline = RagPipeline::new(index.clone(), providers.generator);
        let ledger = Arc::new(SourceLedger::open(&cfg.sources_file).await);

        let agent = Self {
            index,
            ingestor,
            pipeline,
            ledger,
        };
        agent.report_unindexed_sources().await;
        Ok(agent)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Fetches and indexes `url`. Does not touch the ledger.
    pub async fn add_url_source(&self, url: &str) -> Result<IngestReport, ContextorError> {
        Ok(self.ingestor.ingest_url(url).await?)
    }

    /// Indexes uploaded text under `filename`. Does not touch the ledger.
    pub async fn add_file_source(
        &self,
        content: &str,
        filename: &str,
    ) -> Result<IngestReport, ContextorError> {
        Ok(self.ingestor.ingest_text(content, filename).await?)
    }

    pub async fn run_pipeline(&self, question: &str) -> Result<AgentState, ContextorError> {
        self.pipeline.run(question).await
    }

    pub async fn stream_pipeline(
        &self,
        question: &str,
        file_content: Option<&str>,
    ) -> Result<StreamingAnswer, ContextorError> {
        self.pipeline.stream(question, file_content).await
    }

    pub async fn get_sources(&self) -> Vec<SourceRecord> {
        self.ledger.list().await
    }

    /// Appends a ledger record for an already indexed source.
    pub async fn register_source(&self, new: NewSource) -> Result<SourceRecord, ContextorError> {
        Ok(self.ledger.add(new).await?)
    }

    /// Drops a ledger record. Indexed chunks of that source stay searchable.
    pub async fn delete_source(&self, id: u64) -> Result<Option<SourceRecord>, ContextorError> {
        Ok(self.ledger.delete(id).await?)
    }

    /// Logs ledger entries whose source has no chunks in the index. Nothing is
    /// repaired.
    async fn report_unindexed_sources(&self) {
        for record in self.ledger.list().await {
            match self.index.contains_source(&record.source).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    id = record.id,
                    source = %record.source,
                    "registered source has no indexed chunks"
                ),
                Err(e) => {
                    warn!(error = %e, "index/ledger consistency check skipped");
                    return;
                }
            }
        }
    }
}
