//! HTTP server wiring for the download gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use modvault_core::{CatalogResolver, DownloadGateway};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{api_library, download, health};
use crate::identity::IdentityProvider;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<DownloadGateway>,
    pub resolver: Arc<CatalogResolver>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        gateway: DownloadGateway,
        resolver: CatalogResolver,
        identity: impl IdentityProvider + 'static,
    ) -> Self {
        Self {
            gateway: Arc::new(gateway),
            resolver: Arc::new(resolver),
            identity: Arc::new(identity),
        }
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/download", get(download))
        .route("/api/download", get(download))
        .route("/api/library", get(api_library))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the gateway on `bind_addr` until Ctrl-C.
///
/// # Errors
/// - Binding the listener fails
/// - The server loop fails
pub async fn run_server(
    bind_addr: SocketAddr,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    let downloads = state.gateway.descriptors().len();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        downloads,
        "ModVault download gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, draining in-flight requests");
}
