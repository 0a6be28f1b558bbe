//! Startup sequencing: credential → clients → route sync → ready.
//!
//! Runs after the listener is bound so probes answer `starting` while the
//! index is being populated. Every failure is terminal and leaves the
//! service `degraded`; nothing is retried.

use std::sync::Arc;

use semroute_core::{
    resolve_credential, AzureConfig, RouteSet, RouterConfig, RouterError, RouterResult,
    ServiceConfig, VectorIndex,
};
use semroute_embedding::{build_provider, DeploymentTarget, EmbeddingProvider};
use semroute_index::{MemoryIndex, TypesenseIndex};
use tracing::{error, info};

use crate::classifier::RouteClassifier;
use crate::state::AppState;
use crate::sync::{RouteSynchronizer, SyncReport};

/// Route declarations from the configured file, or the built-in list.
pub fn load_routes(router: &RouterConfig) -> RouterResult<RouteSet> {
    match router.routes_file.as_deref().filter(|p| !p.is_empty()) {
        Some(path) => {
            let routes = RouteSet::from_file(path)?;
            info!(path, routes = routes.len(), utterances = routes.utterance_count(), "Loaded route file");
            Ok(routes)
        }
        None => {
            let routes = RouteSet::builtin();
            info!(routes = routes.len(), utterances = routes.utterance_count(), "Using built-in routes");
            Ok(routes)
        }
    }
}

pub fn build_index(config: &ServiceConfig) -> RouterResult<Arc<dyn VectorIndex>> {
    if config.router.use_memory_index {
        info!("Using in-memory index (SEMROUTE_USE_MEMORY_INDEX=true)");
        Ok(Arc::new(MemoryIndex::new(config.typesense.collection.clone())))
    } else {
        Ok(Arc::new(TypesenseIndex::new(&config.typesense)?))
    }
}

pub fn build_embedding_provider(azure: &AzureConfig) -> RouterResult<Arc<dyn EmbeddingProvider>> {
    let credential = resolve_credential(azure)?;
    let target = DeploymentTarget::from_config(azure)?;
    Ok(Arc::new(build_provider(&credential, target)?))
}

/// Sync `routes`, publish the classifier and mark the service ready.
///
/// On failure the service is marked degraded and the error returned.
pub async fn start(
    state: &AppState,
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    routes: &RouteSet,
    router: &RouterConfig,
) -> RouterResult<SyncReport> {
    match activate(state, provider, index, routes, router).await {
        Ok(report) => Ok(report),
        Err(e) => {
            fail(state, &e);
            Err(e)
        }
    }
}

async fn activate(
    state: &AppState,
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    routes: &RouteSet,
    router: &RouterConfig,
) -> RouterResult<SyncReport> {
    let threshold = router
        .score_threshold
        .ok_or_else(|| RouterError::configuration("SEMROUTE_SCORE_THRESHOLD is required"))?;

    let synchronizer =
        RouteSynchronizer::new(provider.clone(), index.clone(), router.embed_batch_size);
    let report = synchronizer.sync(routes).await?;

    let classifier = RouteClassifier::new(
        provider,
        index,
        threshold,
        routes.len(),
        router.embed_batch_size,
    );
    state.publish_classifier(Arc::new(classifier))?;
    state.health.mark_ready()?;
    Ok(report)
}

fn fail(state: &AppState, err: &RouterError) {
    error!(error = %err, "Startup failed; service is degraded");
    if let Err(e) = state.health.mark_degraded(err.to_string()) {
        error!(error = %e, "Could not record degraded phase");
    }
}

type Components = (Arc<dyn EmbeddingProvider>, Arc<dyn VectorIndex>, RouteSet);

fn prepare(config: &ServiceConfig) -> RouterResult<Components> {
    let provider = build_embedding_provider(&config.azure)?;
    let index = build_index(config)?;
    let routes = load_routes(&config.router)?;
    Ok((provider, index, routes))
}

/// Full startup from configuration. Intended to run as a spawned task.
pub async fn bootstrap(state: AppState, config: ServiceConfig) {
    let (provider, index, routes) = match prepare(&config) {
        Ok(parts) => parts,
        Err(e) => {
            fail(&state, &e);
            return;
        }
    };

    if start(&state, provider, index, &routes, &config.router)
        .await
        .is_ok()
    {
        info!("Service is ready");
    }
}
