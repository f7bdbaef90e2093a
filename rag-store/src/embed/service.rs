//! Embeddings through the shared LLM service's embedding profile.

use std::sync::Arc;

use crate::{EmbeddingsProvider, RagError};
use ai_llm_service::service_profiles::LlmServiceProfiles;

/// Embedding provider backed by [`LlmServiceProfiles::embed`].
#[derive(Clone, Debug)]
pub struct ServiceEmbedder {
    svc: Arc<LlmServiceProfiles>,
}

impl ServiceEmbedder {
    pub fn new(svc: Arc<LlmServiceProfiles>) -> Self {
        Self { svc }
    }
}

impl EmbeddingsProvider for ServiceEmbedder {
    fn embed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>>
    {
        Box::pin(async move { Ok(self.svc.embed(text).await?) })
    }
}
