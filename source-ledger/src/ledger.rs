//! File-backed ledger with a persisted id counter.
//!
//! Layout next to each other:
//! - `<path>`: pretty JSON array of [`SourceRecord`]
//! - `<path>.seq`: last id handed out, as a decimal number
//!
//! Both files are replaced with temp file + rename. Writers inside one
//! process are serialized by a mutex; several processes sharing the files
//! can still lose updates.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::LedgerError;
use crate::record::{NewSource, SourceRecord};

#[derive(Debug, Default)]
struct State {
    records: Vec<SourceRecord>,
    last_id: u64,
}

#[derive(Debug)]
pub struct SourceLedger {
    path: PathBuf,
    seq_path: PathBuf,
    state: Mutex<State>,
}

impl SourceLedger {
    /// Opens the ledger at `path`.
    ///
    /// A missing, unreadable or malformed ledger file yields an empty ledger
    /// (logged). The id counter never goes below the highest stored id.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seq_path = sibling(&path, ".seq");

        let records = load_records(&path).await;
        let stored_seq = load_seq(&seq_path).await;
        let max_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        let last_id = stored_seq.max(max_id);

        info!(path = %path.display(), records = records.len(), last_id, "source ledger opened");
        Self {
            path,
            seq_path,
            state: Mutex::new(State { records, last_id }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in insertion order.
    pub async fn list(&self) -> Vec<SourceRecord> {
        self.state.lock().await.records.clone()
    }

    /// Appends a record with the next id and persists the ledger.
    ///
    /// # Errors
    /// Write failures. The in-memory ledger is unchanged on error, but the id
    /// may already be consumed.
    #[instrument(skip(self, new), fields(source = %new.source))]
    pub async fn add(&self, new: NewSource) -> Result<SourceRecord, LedgerError> {
        let mut state = self.state.lock().await;
        let id = state.last_id + 1;
        write_atomic(&self.seq_path, id.to_string().as_bytes()).await?;
        state.last_id = id;

        let record = new.with_id(id);
        state.records.push(record.clone());
        if let Err(e) = self.save(&state.records).await {
            state.records.pop();
            return Err(e);
        }
        info!(id, kind = ?record.kind, "source registered");
        Ok(record)
    }

    /// Removes the record with `id`; `None` if there is no such record.
    ///
    /// # Errors
    /// Write failures; the record is kept in that case.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> Result<Option<SourceRecord>, LedgerError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.records.iter().position(|r| r.id == id) else {
            debug!(id, "no such source");
            return Ok(None);
        };
        let removed = state.records.remove(pos);
        if let Err(e) = self.save(&state.records).await {
            state.records.insert(pos, removed);
            return Err(e);
        }
        info!(id, source = %removed.source, "source removed from ledger");
        Ok(Some(removed))
    }

    async fn save(&self, records: &[SourceRecord]) -> Result<(), LedgerError> {
        let body = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.path, &body).await
    }
}

async fn load_records(path: &Path) -> Vec<SourceRecord> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read source ledger, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(records) => records,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed source ledger, starting empty");
            Vec::new()
        }
    }
}

async fn load_seq(path: &Path) -> u64 {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => s.trim().parse().unwrap_or_else(|_| {
            warn!(path = %path.display(), "malformed id counter, ignoring");
            0
        }),
        Err(_) => 0,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LedgerError::io(parent, e))?;
    }
    let tmp = sibling(path, ".tmp");
    tokio::fs::write(&tmp, body)
        .await
        .map_err(|e| LedgerError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(LedgerError::io(path, e));
    }
    Ok(())
}
