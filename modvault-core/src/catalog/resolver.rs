//! Entitlement resolution: purchases joined against the product catalog.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::batch::{BatchStats, BatchedResolver};
use super::cache::{InMemoryResolutionCache, ResolutionCache};
use super::merge::MergePolicy;
use super::types::{EntitlementView, OwnedProduct, Product, ProductId, Purchase, UserId};
use crate::config::CatalogConfig;
use crate::store::{RecordStore, RecordStoreError};

/// Cache of resolved catalog entries shared by every request.
pub type ProductCache = dyn ResolutionCache<ProductId, Product>;

/// Resolves the set of products a user is entitled to download.
///
/// Backend failures never escape: they are logged and the user simply
/// appears to own nothing. An error can therefore deny access but never
/// grant it.
pub struct CatalogResolver {
    store: Arc<dyn RecordStore>,
    cache: Arc<ProductCache>,
    batcher: BatchedResolver,
    policy: MergePolicy,
}

impl CatalogResolver {
    /// Creates a resolver with a fresh process-lifetime cache.
    pub fn new(store: Arc<dyn RecordStore>, config: &CatalogConfig) -> Self {
        Self::with_cache(store, Arc::new(InMemoryResolutionCache::new()), config)
    }

    /// Creates a resolver sharing an existing cache.
    pub fn with_cache(
        store: Arc<dyn RecordStore>,
        cache: Arc<ProductCache>,
        config: &CatalogConfig,
    ) -> Self {
        let batch_size = config.batch_size.min(store.max_batch_size());
        Self {
            store,
            cache,
            batcher: BatchedResolver::new(batch_size),
            policy: MergePolicy::from_config(config),
        }
    }

    pub fn cache(&self) -> &Arc<ProductCache> {
        &self.cache
    }

    /// Returns the products `user_id` owns, grouped by game.
    ///
    /// A blank user id yields an empty view without touching the store.
    pub async fn resolve_entitlements(&self, user_id: &UserId) -> EntitlementView {
        if user_id.is_blank() {
            debug!("Entitlement lookup without a user id, returning empty view");
            return EntitlementView::empty();
        }

        match self.try_resolve(user_id).await {
            Ok(view) => view,
            Err(e) => {
                warn!(%user_id, error = %e, "Record store failed during entitlement resolution");
                EntitlementView::empty()
            }
        }
    }

    async fn try_resolve(&self, user_id: &UserId) -> Result<EntitlementView, RecordStoreError> {
        let purchases = self.store.purchases_for_user(user_id).await?;
        if purchases.is_empty() {
            debug!(%user_id, "No purchases on record");
            return Ok(EntitlementView::empty());
        }

        let purchases: Vec<Purchase> = purchases
            .into_iter()
            .filter(|p| {
                if p.product_id.is_blank() {
                    warn!(%user_id, "Skipping purchase without a product id");
                    return false;
                }
                true
            })
            .collect();

        let product_ids = distinct_product_ids(&purchases);
        let stats = self.fetch_products(&product_ids).await?;

        let owned = self.merge_purchases(&purchases);
        let view = EntitlementView::from_products(owned);

        debug!(
            %user_id,
            purchases = purchases.len(),
            owned = view.product_count(),
            lookups = stats.lookups_issued,
            cached = stats.served_from_cache,
            "Resolved entitlements"
        );

        Ok(view)
    }

    async fn fetch_products(&self, ids: &[ProductId]) -> Result<BatchStats, RecordStoreError> {
        let store = &self.store;
        self.batcher
            .resolve(ids, self.cache.as_ref(), |chunk: Vec<ProductId>| async move {
                store.products_by_ids(&chunk).await
            })
            .await
    }

    /// Merges purchases with cached catalog entries, first occurrence wins.
    fn merge_purchases(&self, purchases: &[Purchase]) -> Vec<OwnedProduct> {
        let mut seen = HashSet::new();
        purchases
            .iter()
            .filter(|p| seen.insert(p.product_id.clone()))
            .map(|purchase| {
                let product = self.cache.get(&purchase.product_id);
                if product.is_none() {
                    debug!(product_id = %purchase.product_id, "Purchased product missing from catalog");
                }
                self.policy.merge(purchase, product.as_ref())
            })
            .collect()
    }
}

fn distinct_product_ids(purchases: &[Purchase]) -> Vec<ProductId> {
    let mut seen = HashSet::new();
    purchases
        .iter()
        .filter(|p| seen.insert(&p.product_id))
        .map(|p| p.product_id.clone())
        .collect()
}
