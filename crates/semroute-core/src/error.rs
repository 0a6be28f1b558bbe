use thiserror::Error;

/// Canonical error type for routing, synchronization and startup.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Missing or invalid configuration, including the absence of any
    /// usable embedding credential.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable description of the offending setting.
        message: String,
    },

    /// Transport, authentication or format failure from the embedding provider.
    #[error("embedding provider error: {message}")]
    EmbeddingProvider {
        /// Provider error rendered as text.
        message: String,
    },

    /// Existing collection was created with a different vector dimension.
    #[error("schema mismatch on collection `{collection}`: expected dimension {expected}, found {actual}")]
    SchemaMismatch {
        /// Collection name.
        collection: String,
        /// Dimension produced by the embedding deployment.
        expected: usize,
        /// Dimension declared by the stored collection schema.
        actual: usize,
    },

    /// Vector index could not be reached (connect/timeout failure or 5xx).
    #[error("vector index unavailable: {message}")]
    IndexUnavailable {
        /// Underlying transport or status details.
        message: String,
    },

    /// Vector index was reachable but rejected the request or returned an
    /// unreadable body.
    #[error("vector index rejected request: {message}")]
    IndexRejected {
        /// Index error message.
        message: String,
    },

    /// Caller supplied invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation violates the health state machine.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid transition.
        message: String,
    },

    /// Listener or socket failure in the HTTP server.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Creates a `Configuration` variant.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an `EmbeddingProvider` variant.
    #[must_use]
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingProvider {
            message: message.into(),
        }
    }

    /// Creates an `IndexUnavailable` variant.
    #[must_use]
    pub fn index_unavailable(message: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            message: message.into(),
        }
    }

    /// Creates an `IndexRejected` variant.
    #[must_use]
    pub fn index_rejected(message: impl Into<String>) -> Self {
        Self::IndexRejected {
            message: message.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error means the index is unreachable, as opposed to a
    /// request it refused.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::IndexUnavailable { .. })
    }
}

impl From<config::ConfigError> for RouterError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        Self::index_rejected(format!("malformed index payload: {err}"))
    }
}

/// Convenient result alias for routing operations.
pub type RouterResult<T> = Result<T, RouterError>;
