//! HTTP handlers for REST API endpoints

pub mod error;
pub mod health;
pub mod metrics;
pub mod route;

pub use error::{ApiError, ErrorResponse};
pub use health::{liveness_handler, readiness_handler, startup_handler, HealthResponse};
pub use metrics::metrics_handler;
pub use route::{route_batch, route_query, RouteQuery};
