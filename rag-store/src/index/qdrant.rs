//! Qdrant-backed index: one collection per index.

use std::collections::HashMap;
use std::sync::Arc;

use qdrant_client::qdrant::{PointStruct, Value as QValue, value::Kind};
use tracing::{info, warn};

use super::{IndexLocation, IndexStore, StoreFuture};
use crate::errors::RagError;
use crate::ids::stable_uuid;
use crate::qdrant_facade::QdrantFacade;
use crate::record::{Chunk, IndexEntry, Metadata, RetrievedChunk, SOURCE_KEY};

const TEXT_KEY: &str = "text";
const CHUNK_INDEX_KEY: &str = "chunk_index";
const START_KEY: &str = "start";

/// A Qdrant collection that may hold an index.
pub struct QdrantLocation {
    facade: Arc<QdrantFacade>,
}

impl QdrantLocation {
    pub fn new(facade: Arc<QdrantFacade>) -> Self {
        Self { facade }
    }

    async fn load_impl(&self) -> Result<Option<Arc<dyn IndexStore>>, RagError> {
        if !self.facade.collection_exists().await? {
            return Ok(None);
        }
        let dimension = self.facade.stored_dimension().await?;
        info!(collection = %self.facade.collection, dimension, "opened qdrant index");
        Ok(Some(Arc::new(QdrantIndex {
            facade: Arc::clone(&self.facade),
            dimension,
        })))
    }

    async fn create_impl(
        &self,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Arc<dyn IndexStore>, RagError> {
        if self.facade.collection_exists().await? {
            return Err(RagError::Config(format!(
                "collection '{}' already exists",
                self.facade.collection
            )));
        }
        let index = QdrantIndex {
            facade: Arc::clone(&self.facade),
            dimension,
        };
        let points = index.to_points(entries)?;

        self.facade.create_collection(dimension).await?;
        if let Err(e) = self.facade.upsert_points(points).await {
            // Leave no half-seeded collection behind.
            if let Err(drop_err) = self.facade.drop_collection().await {
                warn!(error = %drop_err, "failed to drop collection after seeding error");
            }
            return Err(e);
        }
        Ok(Arc::new(index))
    }
}

impl IndexLocation for QdrantLocation {
    fn describe(&self) -> String {
        format!("qdrant collection '{}'", self.facade.collection)
    }

    fn load<'a>(&'a self) -> StoreFuture<'a, Option<Arc<dyn IndexStore>>> {
        Box::pin(self.load_impl())
    }

    fn create<'a>(
        &'a self,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> StoreFuture<'a, Arc<dyn IndexStore>> {
        Box::pin(self.create_impl(dimension, entries))
    }

    fn destroy<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if self.facade.collection_exists().await? {
                self.facade.drop_collection().await?;
            }
            Ok(())
        })
    }
}

/// An opened Qdrant index.
pub struct QdrantIndex {
    facade: Arc<QdrantFacade>,
    dimension: usize,
}

impl QdrantIndex {
    fn to_points(&self, entries: Vec<IndexEntry>) -> Result<Vec<PointStruct>, RagError> {
        entries
            .into_iter()
            .map(|e| {
                if e.vector.len() != self.dimension {
                    return Err(RagError::VectorSizeMismatch {
                        got: e.vector.len(),
                        want: self.dimension,
                    });
                }
                let id = stable_uuid(&e.id).to_string();
                Ok(PointStruct {
                    id: Some(id.into()),
                    payload: chunk_to_payload(e.chunk),
                    vectors: Some(e.vector.into()),
                    ..Default::default()
                })
            })
            .collect()
    }
}

impl IndexStore for QdrantIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert<'a>(&'a self, entries: Vec<IndexEntry>) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let points = self.to_points(entries)?;
            self.facade.upsert_points(points).await
        })
    }

    fn search<'a>(&'a self, query: &'a [f32], top_k: usize) -> StoreFuture<'a, Vec<RetrievedChunk>> {
        Box::pin(async move {
            let hits = self.facade.search(query.to_vec(), top_k as u64).await?;
            Ok(hits
                .into_iter()
                .map(|(score, payload)| RetrievedChunk {
                    score,
                    chunk: payload_to_chunk(payload),
                })
                .collect())
        })
    }

    fn count<'a>(&'a self) -> StoreFuture<'a, usize> {
        Box::pin(self.facade.count(None))
    }

    fn contains_source<'a>(&'a self, source: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.facade.count(Some((SOURCE_KEY, source))).await? > 0) })
    }
}

/// Flattens a chunk into a Qdrant payload: text, position and every
/// metadata key as a string field.
fn chunk_to_payload(chunk: Chunk) -> HashMap<String, QValue> {
    let mut payload: HashMap<String, QValue> = chunk
        .metadata
        .into_iter()
        .map(|(k, v)| (k, qvalue(Kind::StringValue(v))))
        .collect();
    payload.insert(TEXT_KEY.into(), qvalue(Kind::StringValue(chunk.text)));
    payload.insert(
        CHUNK_INDEX_KEY.into(),
        qvalue(Kind::IntegerValue(chunk.chunk_index as i64)),
    );
    payload.insert(START_KEY.into(), qvalue(Kind::IntegerValue(chunk.start as i64)));
    payload
}

fn payload_to_chunk(payload: HashMap<String, QValue>) -> Chunk {
    let mut text = String::new();
    let mut chunk_index = 0usize;
    let mut start = 0usize;
    let mut metadata = Metadata::new();

    for (k, v) in payload {
        let Some(kind) = v.kind else { continue };
        match kind {
            Kind::StringValue(s) if k == TEXT_KEY => text = s,
            Kind::IntegerValue(i) if k == CHUNK_INDEX_KEY => chunk_index = i.max(0) as usize,
            Kind::IntegerValue(i) if k == START_KEY => start = i.max(0) as usize,
            Kind::StringValue(s) => {
                metadata.insert(k, s);
            }
            _ => {}
        }
    }
    Chunk {
        text,
        metadata,
        chunk_index,
        start,
    }
}

fn qvalue(kind: Kind) -> QValue {
    QValue { kind: Some(kind) }
}
