//! Brute-force in-process index.
//!
//! Exhaustively compares the query against every stored vector. Suitable for
//! route sets (tens to a few thousand utterances), local development and
//! tests. Contents are lost when the process exits.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use semroute_core::{
    EmbeddingRecord, RecordKey, RouterError, RouterResult, ScoredRecord, StoredRecord, VectorIndex,
};

use crate::typesense::distance_to_similarity;

struct StoredVector {
    vector: Vec<f32>,
    encoder: String,
    /// Write sequence; higher means more recently upserted.
    seq: u64,
}

#[derive(Default)]
struct MemoryState {
    dimension: Option<usize>,
    records: HashMap<RecordKey, StoredVector>,
    next_seq: u64,
}

/// In-memory [`VectorIndex`] with cosine similarity.
///
/// Equal scores are ordered by most recent write, so results are
/// deterministic for a given index state.
pub struct MemoryIndex {
    collection: String,
    state: RwLock<MemoryState>,
    available: AtomicBool,
}

impl MemoryIndex {
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) connectivity to the index.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Collection dimension, once created.
    pub fn dimension(&self) -> Option<usize> {
        self.state.read().dimension
    }

    fn check_available(&self) -> RouterResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RouterError::index_unavailable(format!(
                "in-memory collection '{}' is marked unavailable",
                self.collection
            )))
        }
    }

    fn missing_collection(&self) -> RouterError {
        RouterError::index_rejected(format!("collection '{}' not found", self.collection))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn ensure_collection(&self, dimension: usize) -> RouterResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        match state.dimension {
            None => {
                debug!(collection = %self.collection, dimension, "Created in-memory collection");
                state.dimension = Some(dimension);
                Ok(())
            }
            Some(existing) if existing == dimension => Ok(()),
            Some(existing) => Err(RouterError::SchemaMismatch {
                collection: self.collection.clone(),
                expected: dimension,
                actual: existing,
            }),
        }
    }

    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> RouterResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let dimension = state.dimension.ok_or_else(|| self.missing_collection())?;

        if let Some(bad) = records.iter().find(|r| r.vector_dimension() != dimension) {
            return Err(RouterError::index_rejected(format!(
                "record ({}, {}) has dimension {}, collection expects {}",
                bad.route_name,
                bad.utterance,
                bad.vector_dimension(),
                dimension
            )));
        }

        for record in records {
            let seq = state.next_seq;
            state.next_seq += 1;
            let key = record.key();
            state.records.insert(
                key,
                StoredVector {
                    vector: record.vector,
                    encoder: record.encoder,
                    seq,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, route_name: &str) -> RouterResult<()> {
        self.check_available()?;
        self.state
            .write()
            .records
            .retain(|key, _| key.route_name != route_name);
        Ok(())
    }

    async fn delete_records(&self, keys: &[RecordKey]) -> RouterResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        for key in keys {
            state.records.remove(key);
        }
        Ok(())
    }

    async fn list(&self) -> RouterResult<Vec<StoredRecord>> {
        self.check_available()?;
        let state = self.state.read();
        let mut stored: Vec<StoredRecord> = state
            .records
            .iter()
            .map(|(key, value)| StoredRecord {
                key: key.clone(),
                encoder: value.encoder.clone(),
            })
            .collect();
        stored.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(stored)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> RouterResult<Vec<ScoredRecord>> {
        self.check_available()?;
        let state = self.state.read();
        let dimension = state.dimension.ok_or_else(|| self.missing_collection())?;
        if vector.len() != dimension {
            return Err(RouterError::index_rejected(format!(
                "query dimension mismatch: expected {dimension}, got {}",
                vector.len()
            )));
        }

        let mut scored: Vec<(f32, u64, &RecordKey)> = state
            .records
            .iter()
            .map(|(key, value)| {
                let distance = 1.0 - cosine_similarity(vector, &value.vector);
                (distance_to_similarity(distance), value.seq, key)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| b.1.cmp(&a.1))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, _, key)| ScoredRecord {
                route_name: key.route_name.clone(),
                utterance: key.utterance.clone(),
                score,
            })
            .collect())
    }

    async fn health(&self) -> RouterResult<()> {
        self.check_available()?;
        if self.state.read().dimension.is_none() {
            return Err(self.missing_collection());
        }
        Ok(())
    }

    async fn count(&self) -> RouterResult<usize> {
        self.check_available()?;
        Ok(self.state.read().records.len())
    }
}
