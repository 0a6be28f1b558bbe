use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of one stored utterance: `(route_name, utterance)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub route_name: String,
    pub utterance: String,
}

impl RecordKey {
    pub fn new(route_name: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            route_name: route_name.into(),
            utterance: utterance.into(),
        }
    }

    /// Deterministic document id: first 16 hex chars of `sha256("{route}::{utterance}")`.
    ///
    /// Replicas derive the same id for the same key, which makes upserts
    /// idempotent across processes.
    #[must_use]
    pub fn document_id(&self) -> String {
        let digest = Sha256::digest(format!("{}::{}", self.route_name, self.utterance).as_bytes());
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A route utterance with its embedding, as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub route_name: String,
    pub utterance: String,
    pub vector: Vec<f32>,
    /// Deployment that produced `vector`
    pub encoder: String,
}

impl EmbeddingRecord {
    pub fn new(key: RecordKey, vector: Vec<f32>, encoder: impl Into<String>) -> Self {
        Self {
            route_name: key.route_name,
            utterance: key.utterance,
            vector,
            encoder: encoder.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.route_name.clone(), self.utterance.clone())
    }

    #[must_use]
    pub fn vector_dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Key and encoder tag of a record already in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: RecordKey,
    /// Empty when the record predates encoder tagging.
    pub encoder: String,
}

/// Query hit with cosine similarity in `[0, 1]` (1 = identical direction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub route_name: String,
    pub utterance: String,
    pub score: f32,
}
