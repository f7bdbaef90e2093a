//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! This facade concentrates all Qdrant interactions behind a minimal API,
//! hiding away the verbose builder pattern and keeping the rest of the
//! crate decoupled from `qdrant-client`.

use std::collections::HashMap;

use crate::config::{DistanceKind, IndexBackend, RagConfig};
use crate::errors::RagError;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, PointStruct,
    SearchParamsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QValue,
    VectorParamsBuilder, vectors_config,
};
use tracing::{debug, info};

/// A facade over the Qdrant client to keep the rest of the code clean and stable.
///
/// This struct encapsulates:
/// - The underlying Qdrant client.
/// - The target collection name.
/// - The distance function and batching/search knobs.
pub struct QdrantFacade {
    client: Qdrant,
    pub(crate) collection: String,
    distance: DistanceKind,
    upsert_batch: usize,
    exact: bool,
}

impl QdrantFacade {
    /// Creates a new facade from the given configuration.
    ///
    /// # Errors
    /// `RagError::Config` unless `cfg.backend` is Qdrant, `RagError::Qdrant`
    /// if the client cannot be built.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        cfg.validate()?;
        let IndexBackend::Qdrant {
            url,
            api_key,
            collection,
        } = &cfg.backend
        else {
            return Err(RagError::Config("backend is not qdrant".into()));
        };

        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.clone(),
            distance: cfg.distance,
            upsert_batch: cfg.upsert_batch,
            exact: cfg.exact_search,
        })
    }

    pub async fn collection_exists(&self) -> Result<bool, RagError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(qerr)
    }

    /// Vector size the collection was created with.
    pub async fn stored_dimension(&self) -> Result<usize, RagError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(qerr)?;

        let config = info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        match config {
            Some(vectors_config::Config::Params(p)) => Ok(p.size as usize),
            Some(vectors_config::Config::ParamsMap(_)) => Err(RagError::Corrupt(format!(
                "collection '{}' uses named vectors",
                self.collection
            ))),
            None => Err(RagError::Corrupt(format!(
                "collection '{}' has no vector params",
                self.collection
            ))),
        }
    }

    /// Creates the collection with the given vector size.
    pub async fn create_collection(&self, size: usize) -> Result<(), RagError> {
        let distance = match self.distance {
            DistanceKind::Cosine => Distance::Cosine,
            DistanceKind::Dot => Distance::Dot,
            DistanceKind::Euclid => Distance::Euclid,
        };

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(size as u64, distance)),
            )
            .await
            .map_err(qerr)?;

        info!(
            collection = %self.collection,
            size,
            distance = ?self.distance,
            "collection created"
        );
        Ok(())
    }

    pub async fn drop_collection(&self) -> Result<(), RagError> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(qerr)?;
        info!(collection = %self.collection, "collection dropped");
        Ok(())
    }

    /// Upserts points in batches, waiting for each batch to be applied.
    ///
    /// Returns the number of points written.
    pub async fn upsert_points(&self, points: Vec<PointStruct>) -> Result<usize, RagError> {
        if points.is_empty() {
            debug!(collection = %self.collection, "no points to upsert");
            return Ok(0);
        }
        let total = points.len();
        info!(collection = %self.collection, total, "upserting points");

        let mut rest = points;
        while !rest.is_empty() {
            let tail = rest.split_off(rest.len().min(self.upsert_batch));
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, rest).wait(true))
                .await
                .map_err(qerr)?;
            rest = tail;
        }
        Ok(total)
    }

    /// Performs a similarity search. Results are sorted by score.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        top_k: u64,
    ) -> Result<Vec<(f32, HashMap<String, QValue>)>, RagError> {
        debug!(
            collection = %self.collection,
            top_k,
            exact = self.exact,
            "searching collection"
        );

        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector, top_k).with_payload(true);
        if self.exact {
            builder = builder.params(SearchParamsBuilder::default().exact(true));
        }

        let res = self.client.search_points(builder).await.map_err(qerr)?;
        Ok(res
            .result
            .into_iter()
            .map(|p| (p.score, p.payload))
            .collect())
    }

    /// Exact number of points, optionally restricted to a keyword match.
    pub async fn count(&self, keyword: Option<(&str, &str)>) -> Result<usize, RagError> {
        let mut builder = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some((key, value)) = keyword {
            builder = builder.filter(Filter::must([Condition::matches(key, value.to_string())]));
        }
        let res = self.client.count(builder).await.map_err(qerr)?;
        Ok(res.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

fn qerr(e: impl std::fmt::Display) -> RagError {
    RagError::Qdrant(e.to_string())
}
