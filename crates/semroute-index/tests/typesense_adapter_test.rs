//! Typesense adapter tests against an in-process fake Typesense node

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use semroute_core::{
    EmbeddingRecord, RecordKey, RouterError, StoredRecord, TypesenseConfig, VectorIndex,
};
use semroute_index::TypesenseIndex;
use serde_json::{json, Value};

const API_KEY: &str = "test-key";

#[derive(Default)]
struct FakeState {
    collection: Option<(String, usize)>,
    /// Documents in arrival order.
    documents: Vec<(String, Value)>,
    down: bool,
    /// Report the collection as missing on the next read only.
    hide_once: bool,
    search_bodies: Vec<Value>,
}

#[derive(Clone, Default)]
struct FakeTypesense(Arc<Mutex<FakeState>>);

impl FakeTypesense {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

fn guard(fake: &FakeTypesense, headers: &HeaderMap) -> Option<Response> {
    if fake.with(|s| s.down) {
        return Some((StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response());
    }
    if headers.get("x-typesense-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"message": "Forbidden - a valid `x-typesense-api-key` header must be sent."})),
            )
                .into_response(),
        );
    }
    None
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response()
}

fn without_vector(document: &Value) -> Value {
    let mut document = document.clone();
    if let Some(map) = document.as_object_mut() {
        map.remove("vec");
    }
    document
}

async fn get_collection(
    State(fake): State<FakeTypesense>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    fake.with(|s| {
        if s.hide_once {
            s.hide_once = false;
            return not_found();
        }
        match &s.collection {
            Some((existing, dim)) if *existing == name => Json(json!({
                "name": existing,
                "num_documents": s.documents.len(),
                "fields": [
                    {"name": "sr_id", "type": "string"},
                    {"name": "sr_route", "type": "string", "facet": true},
                    {"name": "sr_utterance", "type": "string"},
                    {"name": "vec", "type": "float[]", "num_dim": dim}
                ]
            }))
            .into_response(),
            _ => not_found(),
        }
    })
}

async fn create_collection(
    State(fake): State<FakeTypesense>,
    headers: HeaderMap,
    Json(schema): Json<Value>,
) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    fake.with(|s| {
        if s.collection.is_some() {
            return (StatusCode::CONFLICT, Json(json!({"message": "already exists"}))).into_response();
        }
        let name = schema["name"].as_str().unwrap().to_string();
        let dim = schema["fields"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["name"] == "vec")
            .and_then(|f| f["num_dim"].as_u64())
            .unwrap() as usize;
        s.collection = Some((name, dim));
        (StatusCode::CREATED, Json(schema.clone())).into_response()
    })
}

async fn import_documents(
    State(fake): State<FakeTypesense>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    assert_eq!(query.get("action").map(String::as_str), Some("upsert"));
    fake.with(|s| {
        let Some((_, dim)) = s.collection.clone() else {
            return not_found();
        };
        let mut lines = Vec::new();
        for line in body.lines() {
            let document: Value = serde_json::from_str(line).unwrap();
            let len = document["vec"].as_array().map(Vec::len).unwrap_or(0);
            if len != dim {
                lines.push(json!({"success": false, "error": "Field `vec` must have 2 dimensions."}).to_string());
                continue;
            }
            let id = document["id"].as_str().unwrap().to_string();
            match s.documents.iter_mut().find(|(existing, _)| *existing == id) {
                Some(slot) => slot.1 = document,
                None => s.documents.push((id, document)),
            }
            lines.push(json!({"success": true}).to_string());
        }
        lines.join("\n").into_response()
    })
}

async fn delete_by_filter(
    State(fake): State<FakeTypesense>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    let filter = query.get("filter_by").cloned().unwrap_or_default();
    let route = filter
        .strip_prefix("sr_route:=`")
        .and_then(|r| r.strip_suffix('`'))
        .unwrap()
        .to_string();
    fake.with(|s| {
        let before = s.documents.len();
        s.documents.retain(|(_, d)| d["sr_route"] != route.as_str());
        Json(json!({"num_deleted": before - s.documents.len()})).into_response()
    })
}

async fn delete_document(
    State(fake): State<FakeTypesense>,
    Path((_, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    fake.with(|s| match s.documents.iter().position(|(existing, _)| *existing == id) {
        Some(pos) => {
            let (_, document) = s.documents.remove(pos);
            Json(without_vector(&document)).into_response()
        }
        None => not_found(),
    })
}

async fn export_documents(State(fake): State<FakeTypesense>, headers: HeaderMap) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    fake.with(|s| {
        if s.collection.is_none() {
            return not_found();
        }
        s.documents
            .iter()
            .map(|(_, d)| without_vector(d).to_string())
            .collect::<Vec<_>>()
            .join("\n")
            .into_response()
    })
}

fn parse_vector_query(query: &str) -> (Vec<f32>, usize) {
    let inner = query.strip_prefix("vec:([").unwrap();
    let (values, rest) = inner.split_once("], k:").unwrap();
    let k = rest.trim_end_matches(')').parse().unwrap();
    let vector = values.split(',').map(|v| v.parse().unwrap()).collect();
    (vector, k)
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    1.0 - dot / (na * nb)
}

async fn multi_search(
    State(fake): State<FakeTypesense>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(rejection) = guard(&fake, &headers) {
        return rejection;
    }
    fake.with(|s| {
        s.search_bodies.push(body.clone());
        let search = &body["searches"][0];
        if s.collection.as_ref().map(|(n, _)| n.as_str()) != search["collection"].as_str() {
            return Json(json!({"results": [{"code": 404, "error": "Not found."}]})).into_response();
        }
        let (vector, k) = parse_vector_query(search["vector_query"].as_str().unwrap());
        let mut hits: Vec<(f32, Value)> = s
            .documents
            .iter()
            .map(|(_, d)| {
                let stored: Vec<f32> = d["vec"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_f64().unwrap() as f32)
                    .collect();
                (cosine_distance(&vector, &stored), without_vector(d))
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        hits.truncate(k);
        let hits: Vec<Value> = hits
            .into_iter()
            .map(|(distance, document)| json!({"document": document, "vector_distance": distance}))
            .collect();
        Json(json!({"results": [{"found": hits.len(), "hits": hits}]})).into_response()
    })
}

async fn spawn_fake() -> (SocketAddr, FakeTypesense) {
    let fake = FakeTypesense::default();
    let app = Router::new()
        .route("/collections", post(create_collection))
        .route("/collections/:name", get(get_collection))
        .route("/collections/:name/documents", delete(delete_by_filter))
        .route("/collections/:name/documents/import", post(import_documents))
        .route("/collections/:name/documents/export", get(export_documents))
        .route("/collections/:name/documents/:id", delete(delete_document))
        .route("/multi_search", post(multi_search))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, fake)
}

fn config_for(addr: SocketAddr, api_key: &str) -> TypesenseConfig {
    TypesenseConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        protocol: "http".to_string(),
        api_key: api_key.to_string(),
        collection: "semantic_routes".to_string(),
        connection_timeout_secs: 2,
    }
}

fn record(route: &str, utterance: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord::new(RecordKey::new(route, utterance), vector, "ada")
}

async fn synced_index() -> (TypesenseIndex, FakeTypesense) {
    let (addr, fake) = spawn_fake().await;
    let index = TypesenseIndex::new(&config_for(addr, API_KEY)).unwrap();
    index.ensure_collection(2).await.unwrap();
    index
        .upsert(vec![
            record("billing", "refund", vec![1.0, 0.0]),
            record("billing", "invoice", vec![0.9, 0.1]),
            record("chitchat", "hello", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    (index, fake)
}

#[tokio::test]
async fn test_ensure_collection_creates_once() {
    let (addr, fake) = spawn_fake().await;
    let index = TypesenseIndex::new(&config_for(addr, API_KEY)).unwrap();

    index.ensure_collection(2).await.unwrap();
    index.ensure_collection(2).await.unwrap();

    assert_eq!(
        fake.with(|s| s.collection.clone()),
        Some(("semantic_routes".to_string(), 2))
    );
    assert!(index.health().await.is_ok());
}

#[tokio::test]
async fn test_dimension_mismatch_is_schema_error() {
    let (addr, _fake) = spawn_fake().await;
    let index = TypesenseIndex::new(&config_for(addr, API_KEY)).unwrap();
    index.ensure_collection(2).await.unwrap();

    let err = index.ensure_collection(1536).await.unwrap_err();
    match err {
        RouterError::SchemaMismatch {
            collection,
            expected,
            actual,
        } => {
            assert_eq!(collection, "semantic_routes");
            assert_eq!(expected, 1536);
            assert_eq!(actual, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_create_is_resolved_by_reread() {
    let (addr, fake) = spawn_fake().await;
    fake.with(|s| {
        s.collection = Some(("semantic_routes".to_string(), 2));
        s.hide_once = true;
    });
    let index = TypesenseIndex::new(&config_for(addr, API_KEY)).unwrap();

    index.ensure_collection(2).await.unwrap();
}

#[tokio::test]
async fn test_upsert_then_list_and_count() {
    let (index, _fake) = synced_index().await;

    assert_eq!(index.count().await.unwrap(), 3);

    let mut stored = index.list().await.unwrap();
    stored.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(
        stored,
        vec![
            StoredRecord {
                key: RecordKey::new("billing", "invoice"),
                encoder: "ada".to_string()
            },
            StoredRecord {
                key: RecordKey::new("billing", "refund"),
                encoder: "ada".to_string()
            },
            StoredRecord {
                key: RecordKey::new("chitchat", "hello"),
                encoder: "ada".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_upsert_is_keyed_by_route_and_utterance() {
    let (index, fake) = synced_index().await;
    index
        .upsert(vec![record("billing", "refund", vec![0.5, 0.5])])
        .await
        .unwrap();

    assert_eq!(index.count().await.unwrap(), 3);
    let id = RecordKey::new("billing", "refund").document_id();
    let stored = fake.with(|s| {
        s.documents
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, d)| d.clone())
            .unwrap()
    });
    assert_eq!(stored["sr_id"], id.as_str());
    assert_eq!(stored["vec"], json!([0.5, 0.5]));
}

#[tokio::test]
async fn test_rejected_import_lines_fail_upsert() {
    let (index, _fake) = synced_index().await;
    let err = index
        .upsert(vec![record("billing", "bad", vec![1.0, 0.0, 0.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::IndexRejected { .. }), "{err:?}");
}

#[tokio::test]
async fn test_delete_route_and_individual_records() {
    let (index, _fake) = synced_index().await;

    index.delete("billing").await.unwrap();
    let stored = index.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key, RecordKey::new("chitchat", "hello"));

    index
        .delete_records(&[
            RecordKey::new("chitchat", "hello"),
            RecordKey::new("chitchat", "never stored"),
        ])
        .await
        .unwrap();
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_query_maps_distance_to_similarity() {
    let (index, fake) = synced_index().await;

    let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].route_name, "billing");
    assert_eq!(hits[0].utterance, "refund");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[0].score >= hits[1].score);

    let orthogonal = index.query(&[0.0, 1.0], 1).await.unwrap();
    assert_eq!(orthogonal[0].route_name, "chitchat");

    let bodies = fake.with(|s| s.search_bodies.clone());
    let search = &bodies[0]["searches"][0];
    assert_eq!(search["collection"], "semantic_routes");
    assert_eq!(search["vector_query"], "vec:([1,0], k:2)");
    assert_eq!(search["exclude_fields"], "vec");
}

#[tokio::test]
async fn test_query_against_missing_collection_is_rejected() {
    let (addr, _fake) = spawn_fake().await;
    let index = TypesenseIndex::new(&config_for(addr, API_KEY)).unwrap();
    let err = index.query(&[1.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, RouterError::IndexRejected { .. }), "{err:?}");

    assert!(index.list().await.unwrap().is_empty());
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_wrong_api_key_is_rejected() {
    let (addr, _fake) = spawn_fake().await;
    let index = TypesenseIndex::new(&config_for(addr, "wrong")).unwrap();
    let err = index.ensure_collection(2).await.unwrap_err();
    assert!(matches!(err, RouterError::IndexRejected { .. }), "{err:?}");
    assert!(!err.is_connectivity());
}

#[tokio::test]
async fn test_server_errors_are_connectivity_failures() {
    let (index, fake) = synced_index().await;
    fake.with(|s| s.down = true);

    let err = index.health().await.unwrap_err();
    assert!(err.is_connectivity(), "{err:?}");
    assert!(index.query(&[1.0, 0.0], 1).await.unwrap_err().is_connectivity());

    fake.with(|s| s.down = false);
    assert!(index.health().await.is_ok());
}

#[tokio::test]
async fn test_unreachable_node_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let index = TypesenseIndex::new(&config_for(addr, API_KEY)).unwrap();
    let err = index.health().await.unwrap_err();
    assert!(matches!(err, RouterError::IndexUnavailable { .. }), "{err:?}");
}
