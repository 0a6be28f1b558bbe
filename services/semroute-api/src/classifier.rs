use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt, TryStreamExt};
use semroute_core::metrics::{CLASSIFY_DURATION, ROUTE_QUERIES};
use semroute_core::{RouterError, RouterResult, VectorIndex};
use semroute_embedding::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Classification of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMatch {
    pub query: String,
    pub matched: bool,
    /// Matched route; `None` below the threshold.
    pub route: Option<String>,
    /// Best similarity found, `0.0` when the index returned nothing.
    pub score: f32,
}

/// Index lookups in flight per batch request.
const MAX_CONCURRENT_LOOKUPS: usize = 16;

/// Maps free-text queries to declared routes by nearest-neighbour lookup.
///
/// Read-only over the index; shared by all in-flight requests.
pub struct RouteClassifier {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    threshold: f32,
    routes_loaded: usize,
    embed_batch_size: usize,
}

impl RouteClassifier {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        threshold: f32,
        routes_loaded: usize,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            provider,
            index,
            threshold,
            routes_loaded,
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn routes_loaded(&self) -> usize {
        self.routes_loaded
    }

    pub async fn classify(&self, query: &str) -> RouterResult<RouteMatch> {
        let mut results = self.run(&[query.to_string()], "single").await?;
        results
            .pop()
            .ok_or_else(|| RouterError::embedding("no result for query"))
    }

    /// Classify many queries, embedding them in chunks of at most
    /// `embed_batch_size`; output order matches input order.
    pub async fn classify_batch(&self, queries: &[String]) -> RouterResult<Vec<RouteMatch>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        self.run(queries, "batch").await
    }

    async fn run(&self, queries: &[String], mode: &str) -> RouterResult<Vec<RouteMatch>> {
        if let Some(pos) = queries.iter().position(|q| q.trim().is_empty()) {
            return Err(RouterError::Validation(format!(
                "query at position {pos} is empty"
            )));
        }

        let start = Instant::now();
        let result = self.embed_and_match(queries).await;
        CLASSIFY_DURATION
            .with_label_values(&[mode])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(matches) => {
                let matched = matches.iter().filter(|m| m.matched).count();
                ROUTE_QUERIES
                    .with_label_values(&["matched"])
                    .inc_by(matched as u64);
                ROUTE_QUERIES
                    .with_label_values(&["unmatched"])
                    .inc_by((matches.len() - matched) as u64);
            }
            Err(_) => ROUTE_QUERIES
                .with_label_values(&["error"])
                .inc_by(queries.len() as u64),
        }
        result
    }

    async fn embed_and_match(&self, queries: &[String]) -> RouterResult<Vec<RouteMatch>> {
        let mut vectors = Vec::with_capacity(queries.len());
        for chunk in queries.chunks(self.embed_batch_size) {
            let response = self.provider.embed_batch(chunk).await?;
            if response.embeddings.len() != chunk.len() {
                return Err(RouterError::embedding(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings);
        }

        stream::iter(0..queries.len())
            .map(|i| self.nearest(&queries[i], &vectors[i]))
            .buffered(MAX_CONCURRENT_LOOKUPS)
            .try_collect()
            .await
    }

    async fn nearest(&self, query: &str, vector: &[f32]) -> RouterResult<RouteMatch> {
        let best = self.index.query(vector, 1).await?.into_iter().next();
        let score = best.as_ref().map_or(0.0, |hit| hit.score);
        let route = best
            .filter(|hit| hit.score >= self.threshold)
            .map(|hit| hit.route_name);

        debug!(query, score, route = ?route, "Classified query");
        Ok(RouteMatch {
            query: query.to_string(),
            matched: route.is_some(),
            route,
            score,
        })
    }
}
