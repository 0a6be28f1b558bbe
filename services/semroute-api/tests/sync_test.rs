//! Route synchronization against the in-memory index

use std::collections::HashSet;
use std::sync::Arc;

use semroute_api::RouteSynchronizer;
use semroute_core::{RecordKey, Route, RouteSet, RouterError, VectorIndex};
use semroute_embedding::MockEmbeddingProvider;
use semroute_index::MemoryIndex;

fn new_index() -> Arc<MemoryIndex> {
    Arc::new(MemoryIndex::new("semantic_routes"))
}

async fn stored_keys(index: &MemoryIndex) -> HashSet<RecordKey> {
    index
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.key)
        .collect()
}

fn declared_keys(routes: &RouteSet) -> HashSet<RecordKey> {
    routes.keys().into_iter().collect()
}

fn small_routes() -> RouteSet {
    RouteSet::new(vec![
        Route::new("greetings", ["hello", "good morning"]),
        Route::new("farewell", ["bye", "see you later"]),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_sync_writes_every_declared_key() {
    let provider = Arc::new(MockEmbeddingProvider::new());
    let index = new_index();
    let routes = RouteSet::builtin();

    let report = RouteSynchronizer::new(provider.clone(), index.clone(), 64)
        .sync(&routes)
        .await
        .unwrap();

    assert_eq!(report.dimension, MockEmbeddingProvider::DEFAULT_DIMENSION);
    assert_eq!(report.upserted, 28);
    assert_eq!(report.unchanged, 0);
    assert_eq!(stored_keys(&index).await, declared_keys(&routes));
}

#[tokio::test]
async fn test_second_sync_changes_nothing() {
    let provider = Arc::new(MockEmbeddingProvider::new());
    let index = new_index();
    let routes = RouteSet::builtin();
    let synchronizer = RouteSynchronizer::new(provider.clone(), index.clone(), 64);

    synchronizer.sync(&routes).await.unwrap();
    let embedded_after_first = provider.embedded_texts();

    let report = synchronizer.sync(&routes).await.unwrap();
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(report.unchanged, 28);
    assert_eq!(provider.embedded_texts(), embedded_after_first);
    assert_eq!(stored_keys(&index).await, declared_keys(&routes));
}

#[tokio::test]
async fn test_undeclared_route_is_removed() {
    let provider = Arc::new(MockEmbeddingProvider::new());
    let index = new_index();
    let synchronizer = RouteSynchronizer::new(provider.clone(), index.clone(), 64);
    synchronizer.sync(&RouteSet::builtin()).await.unwrap();

    let without_politics = RouteSet::new(
        RouteSet::builtin()
            .routes()
            .iter()
            .filter(|route| route.name != "politics")
            .cloned()
            .collect(),
    )
    .unwrap();

    let report = synchronizer.sync(&without_politics).await.unwrap();
    assert_eq!(report.deleted_routes, vec!["politics".to_string()]);
    assert_eq!(report.upserted, 0);

    let stored = stored_keys(&index).await;
    assert!(stored.iter().all(|key| key.route_name != "politics"));
    assert_eq!(stored, declared_keys(&without_politics));
}

#[tokio::test]
async fn test_removed_utterance_is_deleted_and_new_one_written() {
    let provider = Arc::new(MockEmbeddingProvider::new());
    let index = new_index();
    let synchronizer = RouteSynchronizer::new(provider.clone(), index.clone(), 64);
    synchronizer.sync(&small_routes()).await.unwrap();

    let edited = RouteSet::new(vec![
        Route::new("greetings", ["hello", "hi there"]),
        Route::new("farewell", ["bye", "see you later"]),
    ])
    .unwrap();

    let report = synchronizer.sync(&edited).await.unwrap();
    assert_eq!(report.deleted_records, 1);
    assert_eq!(report.upserted, 1);
    assert_eq!(report.unchanged, 3);
    assert!(report.deleted_routes.is_empty());
    assert_eq!(stored_keys(&index).await, declared_keys(&edited));
}

#[tokio::test]
async fn test_encoder_change_reembeds_everything() {
    let index = new_index();
    let routes = small_routes();

    let first = Arc::new(MockEmbeddingProvider::with_model("encoder-a", 64));
    RouteSynchronizer::new(first, index.clone(), 64)
        .sync(&routes)
        .await
        .unwrap();

    let second = Arc::new(MockEmbeddingProvider::with_model("encoder-b", 64));
    let report = RouteSynchronizer::new(second.clone(), index.clone(), 64)
        .sync(&routes)
        .await
        .unwrap();

    assert_eq!(report.upserted, 4);
    assert_eq!(second.embedded_texts(), 4);
    let encoders: HashSet<String> = index
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.encoder)
        .collect();
    assert_eq!(encoders, HashSet::from(["encoder-b".to_string()]));
}

#[tokio::test]
async fn test_dimension_change_is_schema_mismatch() {
    let index = new_index();
    let routes = small_routes();
    RouteSynchronizer::new(Arc::new(MockEmbeddingProvider::with_dimension(64)), index.clone(), 64)
        .sync(&routes)
        .await
        .unwrap();

    let err = RouteSynchronizer::new(
        Arc::new(MockEmbeddingProvider::with_dimension(32)),
        index.clone(),
        64,
    )
    .sync(&routes)
    .await
    .unwrap_err();

    assert!(
        matches!(
            err,
            RouterError::SchemaMismatch {
                expected: 32,
                actual: 64,
                ..
            }
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_embedding_requests_are_batched() {
    let provider = Arc::new(MockEmbeddingProvider::new());
    let index = new_index();

    RouteSynchronizer::new(provider.clone(), index.clone(), 5)
        .sync(&RouteSet::builtin())
        .await
        .unwrap();

    // 28 utterances in batches of 5
    assert_eq!(provider.calls(), 6);
    assert_eq!(provider.embedded_texts(), 28);
}

#[tokio::test]
async fn test_provider_failure_aborts_sync() {
    let provider = Arc::new(MockEmbeddingProvider::new());
    provider.set_failing(true);
    let index = new_index();

    let err = RouteSynchronizer::new(provider, index.clone(), 64)
        .sync(&small_routes())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::EmbeddingProvider { .. }), "{err:?}");
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreachable_index_aborts_sync() {
    let index = new_index();
    index.set_available(false);

    let err = RouteSynchronizer::new(Arc::new(MockEmbeddingProvider::new()), index, 64)
        .sync(&small_routes())
        .await
        .unwrap_err();
    assert!(err.is_connectivity(), "{err:?}");
}

#[tokio::test]
async fn test_concurrent_replicas_converge() {
    let index = new_index();
    let routes = RouteSet::builtin();
    let replica_a = RouteSynchronizer::new(Arc::new(MockEmbeddingProvider::new()), index.clone(), 7);
    let replica_b = RouteSynchronizer::new(Arc::new(MockEmbeddingProvider::new()), index.clone(), 3);

    let (a, b) = tokio::join!(replica_a.sync(&routes), replica_b.sync(&routes));
    a.unwrap();
    b.unwrap();

    assert_eq!(stored_keys(&index).await, declared_keys(&routes));
    assert_eq!(index.count().await.unwrap(), 28);
}
