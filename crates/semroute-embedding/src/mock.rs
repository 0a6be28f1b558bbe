use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;

use crate::provider::EmbeddingProvider;
use crate::types::{BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo, Usage};

/// Mock embedding provider for testing.
///
/// Generates deterministic, L2-normalized embeddings from the input hash so
/// identical texts always map to identical vectors and unrelated texts are
/// close to orthogonal.
pub struct MockEmbeddingProvider {
    model: String,
    dimension: usize,
    aliases: HashMap<String, String>,
    failing: AtomicBool,
    calls: AtomicUsize,
    embedded: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Default model name for mock provider.
    pub const DEFAULT_MODEL: &'static str = "mock-embed-256";
    /// Default dimension.
    pub const DEFAULT_DIMENSION: usize = 256;

    /// Creates a new mock provider with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_model(Self::DEFAULT_MODEL, Self::DEFAULT_DIMENSION)
    }

    /// Creates a mock provider with custom dimension.
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self::with_model(format!("mock-embed-{dimension}"), dimension)
    }

    /// Creates a mock provider with custom model and dimension.
    #[must_use]
    pub fn with_model(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            aliases: HashMap::new(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            embedded: AtomicUsize::new(0),
        }
    }

    /// Makes `text` embed exactly like `target`, standing in for a paraphrase.
    #[must_use]
    pub fn with_alias(mut self, text: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(text.into(), target.into());
        self
    }

    /// Makes every subsequent call fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed_batch` calls served (including failures).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded successfully.
    pub fn embedded_texts(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    /// Generate a deterministic unit vector for a given text input.
    pub fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let text = self.aliases.get(text).map(String::as_str).unwrap_or(text);

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            // Simple LCG (Linear Congruential Generator) for deterministic values
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            let value = ((state >> 33) as f32) / ((1u64 << 30) as f32) - 1.0; // Range: [-1, 1)
            embedding.push(value);
        }

        let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }

        embedding
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, inputs: &[String]) -> EmbeddingResult<BatchEmbeddingResponse> {
        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Transport(
                "mock provider configured to fail".to_string(),
            ));
        }
        if inputs.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty input batch".to_string()));
        }

        let embeddings: Vec<Vec<f32>> = inputs
            .iter()
            .map(|text| self.generate_embedding(text))
            .collect();
        self.embedded.fetch_add(inputs.len(), Ordering::SeqCst);

        let total_tokens = inputs
            .iter()
            .map(|text| text.split_whitespace().count().max(1))
            .sum();

        Ok(BatchEmbeddingResponse {
            model: self.model.clone(),
            embeddings,
            usage: Usage {
                total_tokens,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn model_info(&self) -> EmbeddingResult<ModelInfo> {
        Ok(ModelInfo {
            model: self.model.clone(),
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_provider_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = texts(&["hello world"]);

        let response1 = provider.embed_batch(&inputs).await.unwrap();
        let response2 = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(response1.embeddings, response2.embeddings);
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.embedded_texts(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_dimension_and_norm() {
        let provider = MockEmbeddingProvider::with_dimension(128);
        let response = provider.embed_batch(&texts(&["test"])).await.unwrap();
        let embedding = &response.embeddings[0];

        assert_eq!(embedding.len(), 128);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_provider_preserves_order() {
        let provider = MockEmbeddingProvider::new();
        let inputs = texts(&["first", "second", "third"]);
        let response = provider.embed_batch(&inputs).await.unwrap();

        for (text, embedding) in inputs.iter().zip(&response.embeddings) {
            assert_eq!(embedding, &provider.generate_embedding(text));
        }
    }

    #[tokio::test]
    async fn test_unrelated_texts_are_dissimilar() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.generate_embedding("can I get a refund");
        let b = provider.generate_embedding("how's the weather today?");
        assert!(cosine(&a, &b).abs() < 0.5);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_alias_shares_vector() {
        let provider =
            MockEmbeddingProvider::new().with_alias("refund please", "can I get a refund");
        assert_eq!(
            provider.generate_embedding("refund please"),
            provider.generate_embedding("can I get a refund")
        );
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let provider = MockEmbeddingProvider::new();
        provider.set_failing(true);
        let err = provider.embed_batch(&texts(&["x"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Transport(_)));

        provider.set_failing(false);
        assert!(provider.embed_batch(&texts(&["x"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let provider = MockEmbeddingProvider::new();
        let err = provider.embed_batch(&[]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_mock_provider_model_info() {
        let provider = MockEmbeddingProvider::with_dimension(64);
        let info = provider.model_info().await.unwrap();
        assert_eq!(info.dimension, 64);
        assert_eq!(info.model, "mock-embed-64");
    }
}
