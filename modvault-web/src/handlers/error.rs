//! JSON error responses.
//!
//! Every failure leaves the server as `{"error": "<message>"}` with a status
//! chosen from the error kind. Operator detail stays in the logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use modvault_core::{ErrorKind, GatewayError};
use serde_json::json;

/// Error returned by any handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }

    /// Caller could not be identified.
    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Not signed in")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &'static str {
        self.message
    }
}

/// HTTP status for an error kind.
///
/// Download failures never carry `BackendUnavailable`; record store outages
/// are absorbed by the resolver into an empty library. The arm exists so
/// any [`ErrorKind`], e.g. from `ModvaultError::kind`, has a status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::new(status_for(err.kind()), err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_map_to_statuses() {
        let cases = [
            (GatewayError::MissingKey, StatusCode::BAD_REQUEST),
            (
                GatewayError::UnknownKey { key: "k".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::UpstreamStatus {
                    key: "k".into(),
                    status: 503,
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::UpstreamRequest {
                    key: "k".into(),
                    reason: "connection refused".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_backend_outage_kind_is_service_unavailable() {
        let outage = modvault_core::ModvaultError::from(
            modvault_core::RecordStoreError::Unavailable {
                reason: "timeout".into(),
            },
        );

        assert_eq!(status_for(outage.kind()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_message_is_fixed_text() {
        let err = ApiError::from(GatewayError::UpstreamRequest {
            key: "k".into(),
            reason: "dns error for files.internal".into(),
        });
        assert_eq!(err.message(), "Server error");
    }
}
