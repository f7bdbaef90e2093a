//! Offline bag-of-words embedder.
//!
//! Lowercased alphanumeric tokens are hashed (FNV-1a) into `dim` buckets
//! with a hash-derived sign, then the vector is L2-normalized. Texts sharing
//! distinctive words end up with a high cosine similarity. Useful without a
//! model server and as a deterministic substitute in tests.

use std::{future::Future, pin::Pin};

use crate::{EmbeddingsProvider, RagError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    /// # Errors
    /// [`RagError::Config`] for `dim == 0`.
    pub fn new(dim: usize) -> Result<Self, RagError> {
        if dim == 0 {
            return Err(RagError::Config("hashing embedder needs dim > 0".into()));
        }
        Ok(Self { dim })
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(&token.to_lowercase());
            let bucket = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingsProvider for HashingEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.embed_sync(text)) })
    }

    fn dimension<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<usize, RagError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.dim) })
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ b as u64).wrapping_mul(FNV_PRIME))
}
