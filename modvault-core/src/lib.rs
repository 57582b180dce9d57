//! ModVault Core - Entitlement resolution and download relay
//!
//! This crate provides the two halves of the download gateway: resolving which
//! products a user owns from the purchase ledger and product catalog, and
//! relaying the bytes of an owned product from its upstream location without
//! ever exposing that location to the caller.

pub mod catalog;
pub mod config;
pub mod gateway;
pub mod store;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use catalog::{CatalogResolver, EntitlementView, ProductId, UserId};
pub use config::ModvaultConfig;
pub use gateway::{DescriptorError, DescriptorTable, DownloadGateway, ErrorKind, GatewayError};
pub use store::{InMemoryRecordStore, RecordStore, RecordStoreError};

/// Errors raised while assembling a gateway from its data files.
#[derive(Debug, thiserror::Error)]
pub enum ModvaultError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Record store error: {0}")]
    RecordStore(#[from] RecordStoreError),

    #[error("Descriptor table error: {0}")]
    Descriptors(#[from] DescriptorError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl ModvaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModvaultError::Gateway(e) => e.kind(),
            ModvaultError::RecordStore(_) => ErrorKind::BackendUnavailable,
            ModvaultError::Descriptors(_) | ModvaultError::Configuration { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns a user-friendly error message suitable for display.
    ///
    /// Never includes upstream locations or backend internals.
    pub fn user_message(&self) -> String {
        match self {
            ModvaultError::Gateway(e) => e.user_message().to_string(),
            ModvaultError::RecordStore(_) => "Purchase records are unavailable".to_string(),
            ModvaultError::Descriptors(e) => format!("Invalid download table: {e}"),
            ModvaultError::Configuration { reason } => format!("Configuration error: {reason}"),
        }
    }

    /// Checks if this error was caused by caller input.
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, ModvaultError>;
