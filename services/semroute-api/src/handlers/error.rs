use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use semroute_core::RouterError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Startup has not (or will never) complete
    NotReady(String),
    /// Request body or query string could not be extracted
    Rejected { status: StatusCode, message: String },
    Router(RouterError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        Self::Router(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Router(err) => match err {
                RouterError::Validation(_) => StatusCode::BAD_REQUEST,
                RouterError::IndexUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RouterError::EmbeddingProvider { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotReady(msg) => msg,
            ApiError::Rejected { message, .. } => {
                warn!(status = %status, error = %message, "Rejected malformed request");
                message
            }
            ApiError::Router(err) => {
                if status.is_server_error() {
                    error!(status = %status, error = %err, "Routing request failed");
                } else {
                    warn!(error = %err, "Rejected routing request");
                }
                err.to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RouterError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (RouterError::index_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE),
            (RouterError::embedding("401"), StatusCode::BAD_GATEWAY),
            (RouterError::index_rejected("bad"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
        assert_eq!(
            ApiError::NotReady("starting".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let rejected = ApiError::Rejected {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "expected a sequence".into(),
        };
        assert_eq!(
            rejected.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
