//! In-memory record store, optionally seeded from a JSON records file.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RecordStore, RecordStoreError};
use crate::catalog::{Product, ProductId, Purchase, UserId};
use crate::config::DEFAULT_BATCH_SIZE;

/// Serialized form of a records file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSnapshot {
    #[serde(default)]
    pub purchases: Vec<Purchase>,
    #[serde(default)]
    pub products: Vec<Product>,
}

/// Record store holding purchases and products in process memory.
///
/// Enforces the same per-call batch limit as a remote document store so
/// callers exercise their chunking logic against it.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    purchases: RwLock<Vec<Purchase>>,
    products: RwLock<HashMap<ProductId, Product>>,
    max_batch: usize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::from_snapshot(RecordSnapshot::default())
    }

    pub fn from_snapshot(snapshot: RecordSnapshot) -> Self {
        let products = snapshot
            .products
            .into_iter()
            .map(|p| (p.product_id.clone(), p))
            .collect();

        Self {
            purchases: RwLock::new(snapshot.purchases),
            products: RwLock::new(products),
            max_batch: DEFAULT_BATCH_SIZE,
        }
    }

    /// Loads a store from a JSON records file.
    ///
    /// # Errors
    /// - `RecordStoreError::Io` - File could not be read
    /// - `RecordStoreError::Parse` - File is not a valid records document
    pub fn load(path: &Path) -> Result<Self, RecordStoreError> {
        let raw = std::fs::read_to_string(path)?;
        let snapshot: RecordSnapshot = serde_json::from_str(&raw)?;
        debug!(
            purchases = snapshot.purchases.len(),
            products = snapshot.products.len(),
            "Loaded records from {}",
            path.display()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Overrides the per-call batch limit.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn add_purchase(&self, purchase: Purchase) {
        self.purchases.write().push(purchase);
    }

    /// Inserts or replaces a catalog entry.
    pub fn upsert_product(&self, product: Product) {
        self.products
            .write()
            .insert(product.product_id.clone(), product);
    }

    /// All catalog entries, sorted by product id.
    pub fn products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.products.read().values().cloned().collect();
        products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        products
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, RecordStoreError> {
        Ok(self
            .purchases
            .read()
            .iter()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RecordStoreError> {
        if ids.len() > self.max_batch {
            return Err(RecordStoreError::BatchTooLarge {
                requested: ids.len(),
                limit: self.max_batch,
            });
        }

        let products = self.products.read();
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn product(id: &str) -> Product {
        Product {
            product_id: ProductId::new(id),
            name: id.to_string(),
            author: "KimDog Studios".to_string(),
            image: String::new(),
            game: None,
            download_key: id.to_string(),
            description: None,
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_purchases_filtered_by_user() {
        let store = InMemoryRecordStore::new();
        store.add_purchase(Purchase::new(UserId::new("alice"), "a".into()));
        store.add_purchase(Purchase::new(UserId::new("bob"), "b".into()));
        store.add_purchase(Purchase::new(UserId::new("alice"), "c".into()));

        let purchases = store.purchases_for_user(&UserId::new("alice")).await.unwrap();
        let ids: Vec<&str> = purchases.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let store = InMemoryRecordStore::new();
        let ids: Vec<ProductId> = (0..11).map(|i| ProductId::new(format!("p{i}"))).collect();

        let err = store.products_by_ids(&ids).await.unwrap_err();
        assert!(matches!(
            err,
            RecordStoreError::BatchTooLarge {
                requested: 11,
                limit: 10
            }
        ));
        assert!(store.products_by_ids(&ids[..10]).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_ids_absent_from_result() {
        let store = InMemoryRecordStore::new();
        store.upsert_product(product("known"));

        let found = store
            .products_by_ids(&["known".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(found, vec![product("known")]);
    }

    #[tokio::test]
    async fn test_load_records_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "purchases": [{{"userId": "u1", "productId": "kimdog-preset"}}],
                "products": [{{
                    "productId": "kimdog-preset",
                    "name": "KimDog's Reshade Preset",
                    "author": "KimDog Studios",
                    "image": "/reshade.png",
                    "game": "Reshade",
                    "downloadKey": "kimdog-preset",
                    "lastUpdated": "2025-07-12"
                }}]
            }}"#
        )
        .unwrap();

        let store = InMemoryRecordStore::load(file.path()).unwrap();

        assert_eq!(store.products().len(), 1);
        let purchases = store.purchases_for_user(&UserId::new("u1")).await.unwrap();
        assert_eq!(purchases.len(), 1);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            InMemoryRecordStore::load(file.path()),
            Err(RecordStoreError::Parse(_))
        ));
    }
}
