use serde::{Deserialize, Serialize};

/// How a source entered the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    File,
}

/// One registered source, as stored and as returned by `GET /sources`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub title: String,
    /// Value of the `source` metadata on the indexed chunks.
    pub source: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A record before the ledger assigns its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSource {
    pub kind: SourceKind,
    pub title: String,
    pub source: String,
    pub url: Option<String>,
}

impl NewSource {
    /// A web page; title, source and url are all the URL.
    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind: SourceKind::Url,
            title: url.clone(),
            source: url.clone(),
            url: Some(url),
        }
    }

    /// An uploaded file, identified by its filename.
    pub fn file(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            kind: SourceKind::File,
            title: filename.clone(),
            source: filename,
            url: None,
        }
    }

    pub(crate) fn with_id(self, id: u64) -> SourceRecord {
        SourceRecord {
            id,
            kind: self.kind,
            title: self.title,
            source: self.source,
            url: self.url,
        }
    }
}
