//! Fixed-size character windows with overlap.
//!
//! Windows are measured in Unicode scalar values. Consecutive windows start
//! `size - overlap` characters apart, so every window except the last shares
//! exactly `overlap` characters with its successor. The last window may be
//! shorter than `size`.

use crate::errors::RagError;
use crate::record::{Chunk, Document};

/// Splits documents into overlapping chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSplitter {
    size: usize,
    overlap: usize,
}

impl ChunkSplitter {
    /// # Errors
    /// [`RagError::Config`] when `size == 0` or `overlap >= size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self, RagError> {
        if size == 0 || overlap >= size {
            return Err(RagError::Config(format!(
                "invalid splitter: size={size} overlap={overlap} (need size > 0 and overlap < size)"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `document` into ordered chunks. Empty text yields no chunks.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        // Byte offset of every char boundary, plus the end.
        let bounds: Vec<usize> = document
            .text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(document.text.len()))
            .collect();
        let total = bounds.len() - 1;
        if total == 0 {
            return Vec::new();
        }

        let step = self.size - self.overlap;
        let mut chunks = Vec::with_capacity(total / step + 1);
        let mut start = 0usize;
        loop {
            let end = (start + self.size).min(total);
            chunks.push(Chunk {
                text: document.text[bounds[start]..bounds[end]].to_string(),
                metadata: document.metadata.clone(),
                chunk_index: chunks.len(),
                start,
            });
            if end == total {
                break;
            }
            start += step;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuilds the text from chunks by dropping each chunk's overlap.
    fn reassemble(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut covered = 0usize;
        for c in chunks {
            let skip = covered - c.start;
            out.extend(c.text.chars().skip(skip));
            covered = c.start + c.text.chars().count();
        }
        out
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(ChunkSplitter::new(0, 0).is_err());
        assert!(ChunkSplitter::new(10, 10).is_err());
        assert!(ChunkSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn empty_text_yields_nothing() {
        let s = ChunkSplitter::new(5, 2).unwrap();
        assert!(s.split(&Document::new("", "x")).is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let s = ChunkSplitter::new(1000, 200).unwrap();
        let chunks = s.split(&Document::new("short", "x"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
    }

    #[test]
    fn windows_overlap_and_last_may_be_short() {
        let s = ChunkSplitter::new(4, 1).unwrap();
        let chunks = s.split(&Document::new("abcdefghij", "src"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
        assert_eq!(chunks[2].start, 6);
        assert!(chunks.iter().all(|c| c.source() == "src"));
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn reassembly_reconstructs_text_for_many_shapes() {
        let texts = [
            "a".repeat(1),
            "b".repeat(999),
            "c".repeat(1000),
            "d".repeat(1001),
            "e".repeat(2600),
            "héllo wörld ✓ ".repeat(150),
        ];
        for (size, overlap) in [(1000, 200), (7, 3), (2, 1), (1, 0)] {
            let s = ChunkSplitter::new(size, overlap).unwrap();
            for t in &texts {
                let chunks = s.split(&Document::new(t.clone(), "src"));
                assert_eq!(&reassemble(&chunks), t, "size={size} overlap={overlap}");
                assert!(chunks.iter().all(|c| c.text.chars().count() <= size));
            }
        }
    }

    #[test]
    fn metadata_is_preserved() {
        let mut doc = Document::new("x".repeat(30), "https://docs");
        doc.metadata.insert("title".into(), "Docs".into());
        let s = ChunkSplitter::new(10, 2).unwrap();
        for c in s.split(&doc) {
            assert_eq!(c.metadata.get("title").map(String::as_str), Some("Docs"));
        }
    }
}
