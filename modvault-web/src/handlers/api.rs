//! JSON API handlers for the caller's library and server health

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use modvault_core::EntitlementView;
use serde::Serialize;
use tracing::debug;

use super::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    /// Number of registered download keys
    pub downloads: usize,
}

/// Returns the signed-in caller's products grouped by game.
///
/// A record store outage yields an empty library, not an error.
///
/// # Errors
/// - `401` - No user identity on the request
pub async fn api_library(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EntitlementView>, ApiError> {
    let user_id = state
        .identity
        .identify(&headers)
        .ok_or_else(ApiError::unauthenticated)?;

    let view = state.resolver.resolve_entitlements(&user_id).await;
    debug!(
        user_id = %user_id,
        products = view.product_count(),
        groups = view.groups().len(),
        "Library resolved"
    );
    Ok(Json(view))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        downloads: state.gateway.descriptors().len(),
    })
}
