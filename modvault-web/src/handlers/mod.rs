//! HTTP request handlers organized by functionality

pub mod api;
pub mod download;
pub mod error;

// Re-export handler functions
pub use api::{HealthStatus, api_library, health};
pub use download::{DownloadQuery, download};
pub use error::ApiError;
