//! Opaque-key download endpoint.

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use modvault_core::gateway::DownloadStream;
use serde::Deserialize;
use tracing::{debug, error};

use super::error::ApiError;
use crate::server::AppState;

/// Query parameters for download requests
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Opaque download key
    pub file: Option<String>,
}

/// Streams the file registered under `?file=<key>` as an attachment.
pub async fn download(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Response {
    // A malformed query string is treated like a missing key
    let key = match query {
        Ok(Query(query)) => query.file.unwrap_or_default(),
        Err(_) => String::new(),
    };

    match state.gateway.serve_download(&key).await {
        Ok(stream) => attachment_response(stream),
        Err(e) => {
            debug!(key = key.as_str(), kind = ?e.kind(), "Download refused");
            ApiError::from(e).into_response()
        }
    }
}

/// Wraps a relay in a streaming attachment response.
///
/// The upstream content type is never forwarded.
fn attachment_response(stream: DownloadStream) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, stream.content_disposition())
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");

    if let Some(length) = stream.content_length() {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    let key = stream.key().to_string();
    match builder.body(Body::from_stream(stream)) {
        Ok(response) => response,
        Err(e) => {
            error!(key = key.as_str(), error = %e, "Failed to build download response");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
        }
    }
}
