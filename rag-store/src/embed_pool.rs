//! Embedding executor with concurrency and dimension checks.

use crate::{embed::EmbeddingsProvider, errors::RagError, record::Chunk};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

/// Embeds every chunk's text, returning vectors in chunk order.
///
/// # Arguments
/// - `chunks`: chunks to embed.
/// - `provider`: embedding backend.
/// - `expected_dim`: if `Some`, enforces this vector size (error on mismatch).
/// - `concurrency`: maximum number of concurrent embedding requests.
///
/// # Errors
/// Returns [`RagError::VectorSizeMismatch`] if dimensions mismatch, or the
/// provider's error. Nothing is returned partially.
pub async fn embed_chunks(
    chunks: &[Chunk],
    provider: &dyn EmbeddingsProvider,
    expected_dim: Option<usize>,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    info!(total = chunks.len(), concurrency, "embedding chunks");
    if chunks.is_empty() {
        debug!("nothing to embed");
        return Ok(Vec::new());
    }

    let results: Vec<(usize, Vec<f32>)> = stream::iter(chunks.iter().enumerate())
        .map(|(i, chunk)| async move {
            let v = provider.embed(&chunk.text).await?;
            Ok::<(usize, Vec<f32>), RagError>((i, v))
        })
        .buffer_unordered(concurrency.max(1))
        .boxed()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, RagError>>()?;

    let mut out = vec![Vec::new(); chunks.len()];
    for (i, v) in results {
        if let Some(want) = expected_dim {
            if v.len() != want {
                return Err(RagError::VectorSizeMismatch { got: v.len(), want });
            }
        }
        out[i] = v;
    }

    debug!(total = out.len(), "embeddings filled");
    Ok(out)
}
