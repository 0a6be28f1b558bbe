//! Routing endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Query, State},
    Json,
};
use semroute_core::RouterError;
use serde::Deserialize;
use tracing::info;

use crate::classifier::{RouteClassifier, RouteMatch};
use crate::handlers::ApiError;
use crate::state::AppState;

/// `Json` whose rejections answer with an [`ApiError`] body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections answer with an [`ApiError`] body.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub query: Option<String>,
}

fn ready_classifier(state: &AppState) -> Result<Arc<RouteClassifier>, ApiError> {
    state.classifier().ok_or_else(|| {
        ApiError::NotReady(format!(
            "service is not ready (phase: {})",
            state.health.phase().as_str()
        ))
    })
}

/// `GET /route?query=...`
pub async fn route_query(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RouteQuery>,
) -> Result<Json<RouteMatch>, ApiError> {
    let query = params
        .query
        .ok_or_else(|| RouterError::Validation("missing `query` parameter".to_string()))?;
    let classifier = ready_classifier(&state)?;

    let result = classifier.classify(&query).await?;
    info!(
        matched = result.matched,
        route = ?result.route,
        score = result.score,
        "Routed query"
    );
    Ok(Json(result))
}

/// `POST /route` with a JSON array of queries; answers in the same order.
pub async fn route_batch(
    State(state): State<AppState>,
    ApiJson(queries): ApiJson<Vec<String>>,
) -> Result<Json<Vec<RouteMatch>>, ApiError> {
    let classifier = ready_classifier(&state)?;
    let results = classifier.classify_batch(&queries).await?;
    info!(
        queries = results.len(),
        matched = results.iter().filter(|r| r.matched).count(),
        "Routed query batch"
    );
    Ok(Json(results))
}
