//! Embedder trait — the opaque text → vector function.

use async_trait::async_trait;
use crate::error::MemoryError;

/// Text the similarity store embeds once at startup to learn the vector
/// dimension.
pub const DIMENSION_PROBE: &str = "test query";

/// Produces fixed-dimension vectors from text.
///
/// The dimension must stay constant for the lifetime of any store built
/// on top of the embedder.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name (e.g., "ollama:nomic-embed-text", "hash").
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, MemoryError>;

    /// Probe the embedder once and report its output dimension.
    async fn probe_dimension(&self) -> std::result::Result<usize, MemoryError> {
        let vector = self.embed(DIMENSION_PROBE).await?;
        if vector.is_empty() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "Embedder '{}' returned an empty vector",
                self.name()
            )));
        }
        Ok(vector.len())
    }
}
