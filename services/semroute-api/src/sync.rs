//! Reconciles the declared routes with the contents of the vector index.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use semroute_core::metrics::SYNC_RECORDS;
use semroute_core::{
    EmbeddingRecord, RecordKey, RouteSet, RouterError, RouterResult, VectorIndex,
};
use semroute_embedding::EmbeddingProvider;
use serde::Serialize;
use tracing::{debug, info};

/// What a synchronization run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Vector dimension of the collection
    pub dimension: usize,
    /// Records embedded and written
    pub upserted: usize,
    /// Routes removed wholesale because they are no longer declared
    pub deleted_routes: Vec<String>,
    /// Records of declared routes whose utterance was removed
    pub deleted_records: usize,
    /// Declared records already present with the current encoder
    pub unchanged: usize,
}

impl SyncReport {
    /// True when the run touched nothing.
    pub fn is_noop(&self) -> bool {
        self.upserted == 0 && self.deleted_routes.is_empty() && self.deleted_records == 0
    }
}

/// Brings the index in line with a [`RouteSet`].
///
/// Safe to run from several replicas at once: writes are keyed upserts, so
/// the index converges to the same contents.
pub struct RouteSynchronizer {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl RouteSynchronizer {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            index,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn sync(&self, routes: &RouteSet) -> RouterResult<SyncReport> {
        let start = Instant::now();
        let model = self.provider.model_info().await?;
        self.index.ensure_collection(model.dimension).await?;

        let stored = self.index.list().await?;
        let declared_names = routes.names();
        let declared_keys = routes.keys();
        let declared: HashSet<&RecordKey> = declared_keys.iter().collect();

        let mut report = SyncReport {
            dimension: model.dimension,
            ..SyncReport::default()
        };

        let stale_routes: BTreeSet<&str> = stored
            .iter()
            .map(|record| record.key.route_name.as_str())
            .filter(|name| !declared_names.contains(name))
            .collect();
        for route in &stale_routes {
            self.index.delete(route).await?;
            debug!(route = %route, "Removed undeclared route");
            report.deleted_routes.push((*route).to_string());
        }

        let stale_records: Vec<RecordKey> = stored
            .iter()
            .filter(|record| declared_names.contains(record.key.route_name.as_str()))
            .filter(|record| !declared.contains(&record.key))
            .map(|record| record.key.clone())
            .collect();
        if !stale_records.is_empty() {
            self.index.delete_records(&stale_records).await?;
            report.deleted_records = stale_records.len();
        }

        let current: HashMap<&RecordKey, &str> = stored
            .iter()
            .map(|record| (&record.key, record.encoder.as_str()))
            .collect();
        let pending: Vec<&RecordKey> = declared_keys
            .iter()
            .filter(|key| current.get(key).copied() != Some(model.model.as_str()))
            .collect();
        report.unchanged = declared_keys.len() - pending.len();

        for chunk in pending.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|key| key.utterance.clone()).collect();
            let response = self.provider.embed_batch(&texts).await?;
            if response.embeddings.len() != chunk.len() {
                return Err(RouterError::embedding(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    response.embeddings.len()
                )));
            }

            let records: Vec<EmbeddingRecord> = chunk
                .iter()
                .zip(response.embeddings)
                .map(|(key, vector)| EmbeddingRecord::new((*key).clone(), vector, model.model.clone()))
                .collect();
            self.index.upsert(records).await?;
            report.upserted += chunk.len();
        }

        SYNC_RECORDS
            .with_label_values(&["upserted"])
            .inc_by(report.upserted as u64);
        SYNC_RECORDS
            .with_label_values(&["deleted"])
            .inc_by(report.deleted_records as u64);
        SYNC_RECORDS
            .with_label_values(&["deleted_routes"])
            .inc_by(report.deleted_routes.len() as u64);

        info!(
            index = self.index.kind(),
            encoder = %model.model,
            dimension = report.dimension,
            upserted = report.upserted,
            deleted_routes = report.deleted_routes.len(),
            deleted_records = report.deleted_records,
            unchanged = report.unchanged,
            duration_ms = start.elapsed().as_millis() as u64,
            "Route synchronization complete"
        );
        Ok(report)
    }
}
