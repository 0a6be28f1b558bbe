use async_trait::async_trait;

use crate::types::{BatchEmbeddingResponse, EmbeddingResult, ModelInfo};

/// Trait for embedding model providers.
///
/// A provider is bound to one deployment for its whole lifetime and is
/// shared by every in-flight request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text inputs.
    ///
    /// `embeddings[i]` corresponds to `inputs[i]`. Calls are never retried
    /// and results are never cached.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `inputs` is empty
    /// - The provider cannot be reached or rejects the credential
    /// - The response is malformed (wrong item count, inconsistent dimensions)
    async fn embed_batch(&self, inputs: &[String]) -> EmbeddingResult<BatchEmbeddingResponse>;

    /// Get model information (deployment name and output dimension).
    async fn model_info(&self) -> EmbeddingResult<ModelInfo>;
}
