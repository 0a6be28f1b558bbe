//! Orchestrator probes
//!
//! - `/healthz` - liveness, 200 while the process serves requests
//! - `/readyz` - readiness, 200 only when `ready` and the index answers
//! - `/startupz` - startup, 200 once startup concluded (ready or degraded)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lifecycle::{HealthPhase, Readiness};
use crate::state::AppState;

/// Probe body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes_loaded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_vectors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthResponse {
    fn new(status: impl Into<String>, state: &AppState) -> Self {
        Self {
            status: status.into(),
            timestamp: Utc::now(),
            uptime_seconds: state.health.uptime().as_secs(),
            routes_loaded: None,
            index_type: None,
            index_vectors: None,
            detail: None,
        }
    }
}

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn liveness_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new("alive", &state))
}

pub async fn readiness_handler(State(state): State<AppState>) -> Response {
    let classifier = state.classifier();
    let readiness = match &classifier {
        Some(classifier) => {
            state
                .health
                .check_readiness(classifier.index().as_ref())
                .await
        }
        None => match state.health.phase() {
            HealthPhase::Degraded => {
                Readiness::Degraded(state.health.degraded_reason().unwrap_or_default())
            }
            _ => Readiness::Starting,
        },
    };

    let mut body = HealthResponse::new(readiness.status(), &state);
    body.detail = readiness.detail();
    if let Some(classifier) = &classifier {
        body.routes_loaded = Some(classifier.routes_loaded());
        body.index_type = Some(classifier.index().kind().to_string());
        if readiness.is_ready() {
            body.index_vectors = state.health.last_check().and_then(|check| check.vectors);
        }
    }

    debug!(status = %body.status, "Readiness probe");
    (status_code(readiness.is_ready()), Json(body)).into_response()
}

pub async fn startup_handler(State(state): State<AppState>) -> Response {
    let phase = state.health.phase();
    let mut body = HealthResponse::new(phase.as_str(), &state);
    body.detail = state.health.degraded_reason();
    (status_code(state.health.is_startup_complete()), Json(body)).into_response()
}
