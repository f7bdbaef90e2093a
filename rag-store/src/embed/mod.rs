use crate::errors::RagError;
use std::{future::Future, pin::Pin};

pub mod hashing;
pub mod service;

/// Text embedded to discover a provider's dimensionality.
const DIMENSION_PROBE: &str = "dimension probe";

/// Asynchronous embedding provider.
///
/// Async is required because most real providers (Ollama, OpenAI, etc.)
/// perform HTTP requests. Implementations must be deterministic for identical
/// input and model version.
pub trait EmbeddingsProvider: Send + Sync {
    /// Async embedding function.
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>>;

    /// Output dimensionality. The default embeds a probe string.
    fn dimension<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<usize, RagError>> + Send + 'a>> {
        Box::pin(async move {
            let v = self.embed(DIMENSION_PROBE).await?;
            if v.is_empty() {
                return Err(RagError::Config(
                    "embedding provider returned an empty vector".into(),
                ));
            }
            Ok(v.len())
        })
    }
}
