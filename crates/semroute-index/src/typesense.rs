//! Typesense-backed [`VectorIndex`].
//!
//! Every operation is scoped to one collection. Records are stored as
//! documents with the fields `sr_id`, `sr_route`, `sr_utterance`,
//! `sr_encoder` and `vec`, keyed by [`RecordKey::document_id`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use semroute_core::metrics::record_index_operation;
use semroute_core::{
    EmbeddingRecord, RecordKey, RouterError, RouterResult, ScoredRecord, StoredRecord,
    TypesenseConfig, VectorIndex,
};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";
const VECTOR_FIELD: &str = "vec";
/// Documents per import request.
const IMPORT_CHUNK: usize = 100;

/// Map a Typesense cosine distance (`0..=2`) onto a similarity in `0..=1`.
#[must_use]
pub fn distance_to_similarity(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    num_documents: usize,
    #[serde(default)]
    fields: Vec<FieldInfo>,
}

#[derive(Debug, Deserialize)]
struct FieldInfo {
    name: String,
    #[serde(default)]
    num_dim: Option<usize>,
}

impl CollectionInfo {
    fn vector_dimension(&self) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.name == VECTOR_FIELD)
            .and_then(|f| f.num_dim)
    }
}

#[derive(Debug, Serialize)]
struct RouteDocument<'a> {
    id: String,
    sr_id: String,
    sr_route: &'a str,
    sr_utterance: &'a str,
    sr_encoder: &'a str,
    vec: &'a [f32],
}

#[derive(Debug, Deserialize)]
struct ImportResult {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportedDocument {
    #[serde(default)]
    sr_route: Option<String>,
    #[serde(default)]
    sr_utterance: Option<String>,
    #[serde(default)]
    sr_encoder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MultiSearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<SearchHit>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    document: ExportedDocument,
    #[serde(default)]
    vector_distance: Option<f32>,
}

/// Collection-scoped Typesense client.
pub struct TypesenseIndex {
    client: Client,
    base_url: String,
    api_key: String,
    collection: String,
}

impl TypesenseIndex {
    pub fn new(config: &TypesenseConfig) -> RouterResult<Self> {
        let client = Client::builder()
            .timeout(config.connection_timeout())
            .build()
            .map_err(|e| RouterError::configuration(format!("failed to build Typesense client: {e}")))?;

        info!(
            url = %config.base_url(),
            collection = %config.collection,
            "Configured Typesense index"
        );

        Ok(Self {
            client,
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
    }

    fn collection_path(&self) -> String {
        format!("/collections/{}", self.collection)
    }

    fn documents_path(&self) -> String {
        format!("/collections/{}/documents", self.collection)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> RouterResult<Response> {
        request
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))
    }

    /// Fetch the collection schema, `None` when it does not exist.
    async fn retrieve(&self) -> RouterResult<Option<CollectionInfo>> {
        let response = self
            .send("retrieve", self.request(Method::GET, &self.collection_path()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status("retrieve", response).await?;
        Ok(Some(response.json().await.map_err(|e| transport_error("retrieve", &e))?))
    }

    fn check_dimension(&self, info: &CollectionInfo, expected: usize) -> RouterResult<()> {
        let actual = info.vector_dimension().unwrap_or(0);
        if actual == expected {
            Ok(())
        } else {
            Err(RouterError::SchemaMismatch {
                collection: self.collection.clone(),
                expected,
                actual,
            })
        }
    }

    fn schema(&self, dimension: usize) -> Value {
        json!({
            "name": self.collection,
            "fields": [
                {"name": "sr_id", "type": "string"},
                {"name": "sr_route", "type": "string", "facet": true},
                {"name": "sr_utterance", "type": "string"},
                {"name": "sr_encoder", "type": "string", "optional": true},
                {"name": VECTOR_FIELD, "type": "float[]", "num_dim": dimension},
            ]
        })
    }

    async fn create_or_verify(&self, dimension: usize) -> RouterResult<()> {
        if let Some(info) = self.retrieve().await? {
            return self.check_dimension(&info, dimension);
        }

        let response = self
            .send(
                "create_collection",
                self.request(Method::POST, "/collections").json(&self.schema(dimension)),
            )
            .await?;

        if response.status() == StatusCode::CONFLICT {
            // Another replica created it between our read and write.
            let info = self.retrieve().await?.ok_or_else(|| {
                RouterError::index_rejected(format!(
                    "collection '{}' reported as existing but cannot be read",
                    self.collection
                ))
            })?;
            return self.check_dimension(&info, dimension);
        }

        check_status("create_collection", response).await?;
        info!(collection = %self.collection, dimension, "Created Typesense collection");
        Ok(())
    }

    async fn import_chunk(&self, records: &[EmbeddingRecord]) -> RouterResult<()> {
        let mut body = String::new();
        for record in records {
            let id = record.key().document_id();
            let document = RouteDocument {
                id: id.clone(),
                sr_id: id,
                sr_route: &record.route_name,
                sr_utterance: &record.utterance,
                sr_encoder: &record.encoder,
                vec: &record.vector,
            };
            body.push_str(&serde_json::to_string(&document)?);
            body.push('\n');
        }

        let request = self
            .request(Method::POST, &format!("{}/import", self.documents_path()))
            .query(&[("action", "upsert")])
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);
        let response = check_status("upsert", self.send("upsert", request).await?).await?;
        let text = response.text().await.map_err(|e| transport_error("upsert", &e))?;

        let mut failures = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let result: ImportResult = serde_json::from_str(line)?;
            if !result.success {
                failures.push(result.error.unwrap_or_else(|| "unknown error".to_string()));
            }
        }
        if let Some(first) = failures.first() {
            return Err(RouterError::index_rejected(format!(
                "{} of {} documents failed to import: {first}",
                failures.len(),
                records.len()
            )));
        }
        Ok(())
    }

    async fn delete_route(&self, route_name: &str) -> RouterResult<()> {
        let filter = format!("sr_route:=`{route_name}`");
        let request = self
            .request(Method::DELETE, &self.documents_path())
            .query(&[("filter_by", filter.as_str())]);
        let response = self.send("delete", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let response = check_status("delete", response).await?;
        let body: Value = response.json().await.map_err(|e| transport_error("delete", &e))?;
        debug!(
            route = route_name,
            num_deleted = body.get("num_deleted").and_then(serde_json::Value::as_u64).unwrap_or(0),
            "Deleted route documents"
        );
        Ok(())
    }

    async fn delete_keys(&self, keys: &[RecordKey]) -> RouterResult<()> {
        for key in keys {
            let path = format!("{}/{}", self.documents_path(), key.document_id());
            let response = self
                .send("delete_records", self.request(Method::DELETE, &path))
                .await?;
            if response.status() != StatusCode::NOT_FOUND {
                check_status("delete_records", response).await?;
            }
        }
        Ok(())
    }

    async fn export(&self) -> RouterResult<Vec<StoredRecord>> {
        let request = self
            .request(Method::GET, &format!("{}/export", self.documents_path()))
            .query(&[("include_fields", "sr_route,sr_utterance,sr_encoder")]);
        let response = self.send("list", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status("list", response).await?;
        let text = response.text().await.map_err(|e| transport_error("list", &e))?;

        let mut stored = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let document: ExportedDocument = serde_json::from_str(line)?;
            match (document.sr_route, document.sr_utterance) {
                (Some(route), Some(utterance)) => stored.push(StoredRecord {
                    key: RecordKey::new(route, utterance),
                    encoder: document.sr_encoder.unwrap_or_default(),
                }),
                _ => warn!(collection = %self.collection, "Skipping document without route fields"),
            }
        }
        Ok(stored)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> RouterResult<Vec<ScoredRecord>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let values: Vec<String> = vector.iter().map(f32::to_string).collect();
        let vector_query = format!("{VECTOR_FIELD}:([{}], k:{top_k})", values.join(","));
        let body = json!({
            "searches": [{
                "collection": self.collection,
                "q": "*",
                "vector_query": vector_query,
                "per_page": top_k,
                "exclude_fields": VECTOR_FIELD,
            }]
        });

        let response = self
            .send("query", self.request(Method::POST, "/multi_search").json(&body))
            .await?;
        let response = check_status("query", response).await?;
        let parsed: MultiSearchResponse =
            response.json().await.map_err(|e| transport_error("query", &e))?;

        let result = parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| RouterError::index_rejected("multi_search returned no results"))?;
        if let Some(error) = result.error {
            let code = result.code.unwrap_or(400);
            let message = format!("search failed ({code}): {error}");
            return Err(if code >= 500 {
                RouterError::index_unavailable(message)
            } else {
                RouterError::index_rejected(message)
            });
        }

        let mut scored: Vec<ScoredRecord> = result
            .hits
            .into_iter()
            .filter_map(|hit| {
                let route_name = hit.document.sr_route?;
                let utterance = hit.document.sr_utterance?;
                Some(ScoredRecord {
                    route_name,
                    utterance,
                    score: distance_to_similarity(hit.vector_distance.unwrap_or(2.0)),
                })
            })
            .collect();
        // Stable sort keeps Typesense's order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn transport_error(operation: &str, err: &reqwest::Error) -> RouterError {
    if err.is_decode() {
        RouterError::index_rejected(format!("{operation}: unreadable response: {err}"))
    } else {
        RouterError::index_unavailable(format!("{operation}: {err}"))
    }
}

async fn check_status(operation: &str, response: Response) -> RouterResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{operation}: {status}: {body}");
    if status.is_server_error() {
        Err(RouterError::index_unavailable(message))
    } else {
        Err(RouterError::index_rejected(message))
    }
}

#[async_trait]
impl VectorIndex for TypesenseIndex {
    fn kind(&self) -> &'static str {
        "typesense"
    }

    async fn ensure_collection(&self, dimension: usize) -> RouterResult<()> {
        let result = self.create_or_verify(dimension).await;
        record_index_operation("ensure_collection", &result);
        result
    }

    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> RouterResult<()> {
        let mut result = Ok(());
        for chunk in records.chunks(IMPORT_CHUNK) {
            result = self.import_chunk(chunk).await;
            if result.is_err() {
                break;
            }
        }
        record_index_operation("upsert", &result);
        result
    }

    async fn delete(&self, route_name: &str) -> RouterResult<()> {
        let result = self.delete_route(route_name).await;
        record_index_operation("delete", &result);
        result
    }

    async fn delete_records(&self, keys: &[RecordKey]) -> RouterResult<()> {
        let result = self.delete_keys(keys).await;
        record_index_operation("delete_records", &result);
        result
    }

    async fn list(&self) -> RouterResult<Vec<StoredRecord>> {
        let result = self.export().await;
        record_index_operation("list", &result);
        result
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> RouterResult<Vec<ScoredRecord>> {
        let result = self.search(vector, top_k).await;
        record_index_operation("query", &result);
        result
    }

    async fn health(&self) -> RouterResult<()> {
        let result = match self.retrieve().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(RouterError::index_rejected(format!(
                "collection '{}' not found",
                self.collection
            ))),
            Err(e) => Err(e),
        };
        record_index_operation("health", &result);
        result
    }

    async fn count(&self) -> RouterResult<usize> {
        let result = self
            .retrieve()
            .await
            .map(|info| info.map(|i| i.num_documents).unwrap_or(0));
        record_index_operation("count", &result);
        result
    }
}
