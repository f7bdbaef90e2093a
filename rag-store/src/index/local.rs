//! File-backed index: `<dir>/index.json` with an in-memory copy.
//!
//! Writes go to `index.json.tmp` and are renamed over the live file, so a
//! crash never leaves a half-written index behind. Inserts hold the write
//! lock while persisting; the in-memory copy only changes after the file did.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{IndexLocation, IndexStore, StoreFuture, similarity};
use crate::config::DistanceKind;
use crate::errors::RagError;
use crate::record::{IndexEntry, RetrievedChunk};

const INDEX_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Default)]
struct Entries {
    items: Vec<IndexEntry>,
    by_id: HashMap<String, usize>,
}

impl Entries {
    fn from_vec(items: Vec<IndexEntry>) -> Self {
        let mut out = Self::default();
        out.upsert(items);
        out
    }

    fn upsert(&mut self, entries: Vec<IndexEntry>) -> usize {
        let mut written = 0;
        for e in entries {
            match self.by_id.get(&e.id) {
                Some(&pos) => self.items[pos] = e,
                None => {
                    self.by_id.insert(e.id.clone(), self.items.len());
                    self.items.push(e);
                }
            }
            written += 1;
        }
        written
    }
}

/// A directory that may hold `index.json`.
#[derive(Clone, Debug)]
pub struct LocalLocation {
    dir: PathBuf,
    distance: DistanceKind,
}

impl LocalLocation {
    pub fn new(dir: impl Into<PathBuf>, distance: DistanceKind) -> Self {
        Self {
            dir: dir.into(),
            distance,
        }
    }

    fn file(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    async fn load_impl(&self) -> Result<Option<Arc<dyn IndexStore>>, RagError> {
        let path = self.file();
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted index");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let file: IndexFile = serde_json::from_slice(&bytes)?;
        if file.version != FORMAT_VERSION {
            return Err(RagError::Corrupt(format!(
                "{}: unsupported format version {}",
                path.display(),
                file.version
            )));
        }
        if file.dimension == 0 {
            return Err(RagError::Corrupt(format!("{}: dimension is 0", path.display())));
        }
        if let Some(bad) = file.entries.iter().find(|e| e.vector.len() != file.dimension) {
            return Err(RagError::Corrupt(format!(
                "{}: entry {} has {} dimensions, header says {}",
                path.display(),
                bad.id,
                bad.vector.len(),
                file.dimension
            )));
        }

        info!(
            path = %path.display(),
            dimension = file.dimension,
            entries = file.entries.len(),
            "loaded local index"
        );
        Ok(Some(Arc::new(LocalIndex {
            path,
            dimension: file.dimension,
            distance: self.distance,
            entries: RwLock::new(Entries::from_vec(file.entries)),
        })))
    }

    async fn create_impl(
        &self,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Arc<dyn IndexStore>, RagError> {
        if dimension == 0 {
            return Err(RagError::Config("index dimension must be > 0".into()));
        }
        check_dimensions(&entries, dimension)?;
        let path = self.file();
        if tokio::fs::try_exists(&path).await? {
            return Err(RagError::Config(format!(
                "{} already holds an index",
                path.display()
            )));
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let entries = Entries::from_vec(entries);
        persist(&path, dimension, &entries.items).await?;
        info!(path = %path.display(), dimension, entries = entries.items.len(), "created local index");

        Ok(Arc::new(LocalIndex {
            path,
            dimension,
            distance: self.distance,
            entries: RwLock::new(entries),
        }))
    }
}

impl IndexLocation for LocalLocation {
    fn describe(&self) -> String {
        self.file().display().to_string()
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

    /// Removes `index.json` and its temp sibling. The directory itself goes
    /// only when nothing else is left in it.
    fn destroy<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let file = self.file();
            remove_if_present(&file).await?;
            remove_if_present(&tmp_path(&file)).await?;
            if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
                debug!(dir = %self.dir.display(), error = %e, "index dir kept");
            }
            info!(dir = %self.dir.display(), "local index removed");
            Ok(())
        })
    }
}

/// An opened local index.
#[derive(Debug)]
pub struct LocalIndex {
    path: PathBuf,
    dimension: usize,
    distance: DistanceKind,
    entries: RwLock<Entries>,
}

impl LocalIndex {
    async fn insert_impl(&self, entries: Vec<IndexEntry>) -> Result<usize, RagError> {
        check_dimensions(&entries, self.dimension)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut guard = self.entries.write().await;
        let mut next = Entries {
            items: guard.items.clone(),
            by_id: guard.by_id.clone(),
        };
        let written = next.upsert(entries);
        persist(&self.path, self.dimension, &next.items).await?;
        *guard = next;

        debug!(written, total = guard.items.len(), "local index updated");
        Ok(written)
    }

    async fn search_impl(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if query.len() != self.dimension {
            return Err(RagError::VectorSizeMismatch {
                got: query.len(),
                want: self.dimension,
            });
        }
        let guard = self.entries.read().await;
        let mut scored: Vec<(f32, usize)> = guard
            .items
            .iter()
            .enumerate()
            .map(|(i, e)| (similarity(self.distance, query, &e.vector), i))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, i)| RetrievedChunk {
                score,
                chunk: guard.items[i].chunk.clone(),
            })
            .collect())
    }
}

impl IndexStore for LocalIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert<'a>(&'a self, entries: Vec<IndexEntry>) -> StoreFuture<'a, usize> {
        Box::pin(self.insert_impl(entries))
    }

    fn search<'a>(&'a self, query: &'a [f32], top_k: usize) -> StoreFuture<'a, Vec<RetrievedChunk>> {
        Box::pin(self.search_impl(query, top_k))
    }

    fn count<'a>(&'a self) -> StoreFuture<'a, usize> {
        Box::pin(async move { Ok(self.entries.read().await.items.len()) })
    }

    fn contains_source<'a>(&'a self, source: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .entries
                .read()
                .await
                .items
                .iter()
                .any(|e| e.chunk.source() == source))
        })
    }
}

fn check_dimensions(entries: &[IndexEntry], dimension: usize) -> Result<(), RagError> {
    match entries.iter().find(|e| e.vector.len() != dimension) {
        Some(bad) => Err(RagError::VectorSizeMismatch {
            got: bad.vector.len(),
            want: dimension,
        }),
        None => Ok(()),
    }
}

/// Writes the whole index to a temp file and renames it over `path`.
async fn persist(path: &Path, dimension: usize, entries: &[IndexEntry]) -> Result<(), RagError> {
    #[derive(Serialize)]
    struct IndexFileRef<'a> {
        version: u32,
        dimension: usize,
        entries: &'a [IndexEntry],
    }

    let bytes = serde_json::to_vec(&IndexFileRef {
        version: FORMAT_VERSION,
        dimension,
        entries,
    })?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

async fn remove_if_present(path: &Path) -> Result<(), RagError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::to_entries;
    use crate::record::{Chunk, Document};

    fn entries(texts: &[(&str, Vec<f32>)]) -> Vec<IndexEntry> {
        let (chunks, vecs): (Vec<_>, Vec<_>) = texts
            .iter()
            .map(|(t, v)| (Chunk::whole(Document::new(*t, format!("src-{t}"))), v.clone()))
            .unzip();
        to_entries(chunks, vecs)
    }

    #[tokio::test]
    async fn missing_index_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loc = LocalLocation::new(dir.path().join("idx"), DistanceKind::Cosine);
        assert!(loc.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_persists_and_reload_sees_entries() {
        let dir = tempfile::tempdir().unwrap();
        let loc = LocalLocation::new(dir.path().join("idx"), DistanceKind::Cosine);
        let store = loc
            .create(2, entries(&[("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])]))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let reloaded = loc.load().await.unwrap().unwrap();
        assert_eq!(reloaded.dimension(), 2);
        let hits = reloaded.search(&[1.0, 0.1], 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "a");
        assert!(reloaded.contains_source("src-b").await.unwrap());
        assert!(!reloaded.contains_source("src-z").await.unwrap());
    }

    #[tokio::test]
    async fn create_refuses_occupied_location() {
        let dir = tempfile::tempdir().unwrap();
        let loc = LocalLocation::new(dir.path(), DistanceKind::Cosine);
        loc.create(2, Vec::new()).await.unwrap();
        assert!(loc.create(2, Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn insert_is_upsert_and_rejects_wrong_dimensions_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let loc = LocalLocation::new(dir.path(), DistanceKind::Cosine);
        let store = loc.create(2, entries(&[("a", vec![1.0, 0.0])])).await.unwrap();

        // Same chunk again replaces the entry.
        assert_eq!(store.insert(entries(&[("a", vec![0.5, 0.5])])).await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);

        // One bad vector rejects the whole batch.
        let mut batch = entries(&[("b", vec![0.0, 1.0])]);
        batch.extend(entries(&[("c", vec![1.0, 1.0, 1.0])]));
        assert!(matches!(
            store.insert(batch).await,
            Err(RagError::VectorSizeMismatch { got: 3, want: 2 })
        ));
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(loc.load().await.unwrap().unwrap().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_absence() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(INDEX_FILE), b"{ not json").await.unwrap();
        let loc = LocalLocation::new(dir.path(), DistanceKind::Cosine);
        assert!(matches!(loc.load().await, Err(RagError::Parse(_))));
    }

    #[tokio::test]
    async fn destroy_removes_own_dir_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let idx = dir.path().join("idx");
        let loc = LocalLocation::new(&idx, DistanceKind::Cosine);
        loc.destroy().await.unwrap();
        loc.create(3, Vec::new()).await.unwrap();
        tokio::fs::write(idx.join("index.json.tmp"), b"stale").await.unwrap();
        loc.destroy().await.unwrap();
        assert!(loc.load().await.unwrap().is_none());
        assert!(!idx.exists());
    }

    #[tokio::test]
    async fn destroy_leaves_unrelated_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let neighbour = dir.path().join("sources_metadata.json");
        tokio::fs::write(&neighbour, b"[]").await.unwrap();
        let loc = LocalLocation::new(dir.path(), DistanceKind::Cosine);
        loc.create(3, entries(&[("a", vec![1.0, 0.0, 0.0])])).await.unwrap();

        loc.destroy().await.unwrap();

        assert!(!dir.path().join(INDEX_FILE).exists());
        assert_eq!(tokio::fs::read(&neighbour).await.unwrap(), b"[]");
    }
}
