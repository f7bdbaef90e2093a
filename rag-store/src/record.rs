//! Core data models used by the library.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String metadata attached to documents and chunks. `BTreeMap` keeps the
/// on-disk order stable.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key naming where a document came from (URL, filename, `upload`).
pub const SOURCE_KEY: &str = "source";

/// Raw text of one source plus its metadata. Only ever split, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    /// Creates a document whose only metadata is its `source`.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("")
    }
}

/// A window of a document's text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Parent document metadata.
    pub metadata: Metadata,
    /// Position of this window within its document.
    pub chunk_index: usize,
    /// Offset of the first character, in chars.
    pub start: usize,
}

impl Chunk {
    /// A chunk that stands for a whole document.
    pub fn whole(document: Document) -> Self {
        Self {
            text: document.text,
            metadata: document.metadata,
            chunk_index: 0,
            start: 0,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("")
    }
}

/// A persisted `(vector, chunk)` pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Stable UUID derived from the chunk (see [`crate::ids::entry_id`]).
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieval hit: the chunk plus its similarity score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub score: f32,
    pub chunk: Chunk,
}
