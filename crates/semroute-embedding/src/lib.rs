//! Embedding provider infrastructure for semroute.
//!
//! The [`EmbeddingProvider`] trait converts batches of text into
//! fixed-dimension vectors. [`build_provider`] binds the Azure OpenAI
//! implementation to a resolved credential; [`MockEmbeddingProvider`] gives
//! deterministic vectors for tests and local runs.

mod azure;
mod factory;
mod mock;
mod provider;
mod token;
mod types;

pub use azure::{AzureOpenAiProvider, DeploymentTarget};
pub use factory::{build_provider, token_source_for};
pub use mock::MockEmbeddingProvider;
pub use provider::EmbeddingProvider;
pub use token::{AuthHeader, ManagedIdentityCredential, StaticCredential, TokenSource};
pub use types::{BatchEmbeddingResponse, EmbeddingError, EmbeddingResult, ModelInfo, Usage};
