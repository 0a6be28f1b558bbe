use semroute_core::RouterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Invalid input (empty batch, etc.).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Connection, timeout or other transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credential rejected (401/403) or token acquisition failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Provider answered with a non-success status.
    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body could not be interpreted.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<EmbeddingError> for RouterError {
    fn from(err: EmbeddingError) -> Self {
        RouterError::embedding(err.to_string())
    }
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Response from batch embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEmbeddingResponse {
    /// Deployment that generated the embeddings.
    pub model: String,
    /// Generated embeddings, one per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Usage statistics.
    pub usage: Usage,
}

/// Usage statistics for embedding requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Total number of tokens processed.
    pub total_tokens: usize,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Model information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Deployment or model identifier.
    pub model: String,
    /// Output dimension of embeddings.
    pub dimension: usize,
}
