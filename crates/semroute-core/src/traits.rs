use async_trait::async_trait;

use crate::error::RouterResult;
use crate::record::{EmbeddingRecord, RecordKey, ScoredRecord, StoredRecord};

/// Collection-scoped vector store holding one record per route utterance.
///
/// Implementations must be safe for concurrent use by many in-flight
/// requests. Connectivity loss surfaces as
/// [`RouterError::IndexUnavailable`](crate::RouterError::IndexUnavailable).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name (e.g. `"typesense"`).
    fn kind(&self) -> &'static str;

    /// Creates the collection if absent.
    ///
    /// Fails with `SchemaMismatch` when the existing collection was created
    /// with a different dimension.
    async fn ensure_collection(&self, dimension: usize) -> RouterResult<()>;

    /// Inserts or overwrites records keyed by `(route_name, utterance)`.
    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> RouterResult<()>;

    /// Removes every record belonging to `route_name`.
    async fn delete(&self, route_name: &str) -> RouterResult<()>;

    /// Removes individual records. Missing keys are ignored.
    async fn delete_records(&self, keys: &[RecordKey]) -> RouterResult<()>;

    /// Lists the keys and encoder tags of all stored records.
    async fn list(&self) -> RouterResult<Vec<StoredRecord>>;

    /// Returns up to `top_k` nearest records by cosine similarity, highest
    /// score first.
    async fn query(&self, vector: &[f32], top_k: usize) -> RouterResult<Vec<ScoredRecord>>;

    /// Connectivity check used by the readiness probe.
    async fn health(&self) -> RouterResult<()>;

    /// Number of stored records.
    async fn count(&self) -> RouterResult<usize>;
}
