//! Record store abstraction over the purchase ledger and product catalog.

use async_trait::async_trait;

use crate::catalog::{Product, ProductId, Purchase, UserId};
use crate::config::DEFAULT_BATCH_SIZE;

pub mod memory;

pub use memory::{InMemoryRecordStore, RecordSnapshot};

/// Errors raised by record store backends.
#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Batch of {requested} ids exceeds the store limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },

    #[error("Failed to read records file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse records: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only access to purchases and catalog entries.
///
/// How records come to exist is outside this crate; implementations only
/// need the two query primitives below.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every purchase recorded for `user_id`.
    ///
    /// # Errors
    /// - `RecordStoreError::Unavailable` - Backend could not be queried
    async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, RecordStoreError>;

    /// Returns the catalog entries whose id is in `ids`.
    ///
    /// Unknown ids are silently absent from the result.
    ///
    /// # Errors
    /// - `RecordStoreError::BatchTooLarge` - More than `max_batch_size` ids requested
    /// - `RecordStoreError::Unavailable` - Backend could not be queried
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RecordStoreError>;

    /// Largest id list accepted by `products_by_ids`.
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}
