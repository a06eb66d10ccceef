//! Embedding function backed by a provider's embeddings endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use codeloop_core::embedding::Embedder;
use codeloop_core::error::MemoryError;
use codeloop_core::provider::{EmbeddingRequest, Provider};
use tracing::debug;

/// Adapts a [`Provider`] plus an embedding model name into an [`Embedder`].
#[derive(Clone)]
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        debug!(provider = %self.provider.name(), model = %self.model, chars = text.chars().count(), "Embedding text");

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::EmbeddingFailed("provider returned no embedding".into()))
    }
}
