use crate::{
    handlers::{
        liveness_handler, metrics_handler, readiness_handler, route_batch, route_query,
        startup_handler,
    },
    state::AppState,
};
use axum::{extract::Request, response::Response, routing::get, Router};
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};
use tracing::{info_span, Span};
use uuid::Uuid;

/// Builds the Axum router serving the routing endpoint and probes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Probes and metrics
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/startupz", get(startup_handler))
        .route("/metrics", get(metrics_handler))
        // Routing
        .route("/route", get(route_query).post(route_batch))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = Uuid::new_v4();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                })
                .on_request(|_request: &Request, _span: &Span| {
                    tracing::debug!("started processing request");
                })
                .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
                    let status = response.status();
                    let latency_ms = latency.as_millis();

                    if status.is_server_error() {
                        tracing::error!(status = %status, latency_ms = latency_ms, "request failed with server error");
                    } else if status.is_client_error() {
                        tracing::warn!(status = %status, latency_ms = latency_ms, "request failed with client error");
                    } else {
                        tracing::debug!(status = %status, latency_ms = latency_ms, "request completed");
                    }
                })
                .on_failure(|failure_class: ServerErrorsFailureClass, latency: std::time::Duration, _span: &Span| {
                    tracing::error!(failure_class = ?failure_class, latency_ms = latency.as_millis(), "request failed");
                }),
        )
}
