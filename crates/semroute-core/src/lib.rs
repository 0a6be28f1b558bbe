//! Core domain types and traits for the semroute intent-routing service.

pub mod config;
pub mod credential;
pub mod error;
pub mod metrics;
pub mod record;
pub mod route;
pub mod traits;

pub use config::{AzureConfig, RouterConfig, ServerConfig, ServiceConfig, TypesenseConfig};
pub use credential::{resolve_credential, CredentialContext, CredentialMode};
pub use error::{RouterError, RouterResult};
pub use record::{EmbeddingRecord, RecordKey, ScoredRecord, StoredRecord};
pub use route::{Route, RouteSet};
pub use traits::VectorIndex;
