//! ModVault Web - HTTP surface of the download gateway

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Exposes the opaque-key download endpoint, the caller's library as JSON and
//! a health probe. Upstream locations never cross this boundary.

pub mod handlers;
pub mod identity;
pub mod server;

// Re-export main types
pub use identity::{IdentityProvider, TrustedHeaderIdentity};
pub use server::{AppState, build_router, run_server};
