//! Library resolution through the HTTP surface and the resolver directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use modvault_core::catalog::{Product, Purchase};
use modvault_core::{
    CatalogResolver, DescriptorTable, DownloadGateway, InMemoryRecordStore, ModvaultConfig,
    ProductId, RecordStore, RecordStoreError, UserId,
};
use modvault_web::{AppState, TrustedHeaderIdentity, build_router};
use serde_json::Value;
use tower::ServiceExt;

/// Store whose backend is down.
struct OfflineStore;

#[async_trait]
impl RecordStore for OfflineStore {
    async fn purchases_for_user(&self, _user_id: &UserId) -> Result<Vec<Purchase>, RecordStoreError> {
        Err(RecordStoreError::Unavailable {
            reason: "connection reset".to_string(),
        })
    }

    async fn products_by_ids(&self, _ids: &[ProductId]) -> Result<Vec<Product>, RecordStoreError> {
        Err(RecordStoreError::Unavailable {
            reason: "connection reset".to_string(),
        })
    }
}

/// Wraps the in-memory store and counts catalog lookups.
struct CountingStore {
    inner: Arc<InMemoryRecordStore>,
    lookups: AtomicUsize,
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn purchases_for_user(&self, user_id: &UserId) -> Result<Vec<Purchase>, RecordStoreError> {
        self.inner.purchases_for_user(user_id).await
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RecordStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.products_by_ids(ids).await
    }
}

fn product(id: &str, game: Option<&str>) -> Product {
    Product {
        product_id: ProductId::new(id),
        name: format!("Mod {id}"),
        author: "KimDog Studios".to_string(),
        image: "/kimdog.png".to_string(),
        game: game.map(str::to_string),
        download_key: format!("{id}-download"),
        description: None,
        last_updated: None,
    }
}

fn app_with(store: Arc<dyn RecordStore>) -> axum::Router {
    let config = ModvaultConfig::for_testing();
    let gateway =
        DownloadGateway::new(Arc::new(DescriptorTable::builtin()), &config.upstream).unwrap();
    let resolver = CatalogResolver::new(store, &config.catalog);
    build_router(AppState::new(
        gateway,
        resolver,
        TrustedHeaderIdentity::new(config.server.identity_header),
    ))
}

async fn library(app: axum::Router, user: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri("/api/library")
        .header("x-modvault-user", user)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_large_library_is_fetched_in_chunks_and_grouped() {
    let inner = Arc::new(InMemoryRecordStore::new());
    for i in 0..23 {
        let game = match i % 3 {
            0 => Some("Reshade"),
            1 => Some("Assetto Corsa"),
            _ => None,
        };
        let id = format!("mod-{i:02}");
        inner.upsert_product(product(&id, game));
        inner.add_purchase(Purchase::new(UserId::new("collector"), ProductId::new(id.as_str())));
    }
    // Re-purchases must not duplicate entries
    inner.add_purchase(Purchase::new(UserId::new("collector"), ProductId::new("mod-00")));
    inner.add_purchase(Purchase::new(UserId::new("collector"), ProductId::new("mod-22")));

    let store = Arc::new(CountingStore {
        inner,
        lookups: AtomicUsize::new(0),
    });
    let app = app_with(store.clone());

    let (status, body) = library(app, "collector").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.lookups.load(Ordering::SeqCst), 3);

    let groups = body["groups"].as_array().unwrap();
    let labels: Vec<&str> = groups.iter().map(|g| g["game"].as_str().unwrap()).collect();
    assert_eq!(labels, vec!["Assetto Corsa", "Reshade", "Unknown Game"]);

    let mut ids: Vec<&str> = groups
        .iter()
        .flat_map(|g| g["products"].as_array().unwrap())
        .map(|p| p["productId"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 23);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 23);
}

#[tokio::test]
async fn test_user_without_purchases_gets_empty_library() {
    let inner = Arc::new(InMemoryRecordStore::new());
    inner.upsert_product(product("mod-01", Some("Reshade")));
    let store = Arc::new(CountingStore {
        inner,
        lookups: AtomicUsize::new(0),
    });

    let (status, body) = library(app_with(store.clone()), "newcomer").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["groups"].as_array().unwrap().is_empty());
    assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_outage_degrades_to_empty_library() {
    let (status, body) = library(app_with(Arc::new(OfflineStore)), "collector").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["groups"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cached_products_survive_catalog_changes() {
    let store = Arc::new(InMemoryRecordStore::new());
    store.upsert_product(product("mod-01", Some("Reshade")));
    store.add_purchase(Purchase::new(UserId::new("u1"), ProductId::new("mod-01")));
    let resolver = CatalogResolver::new(store.clone(), &ModvaultConfig::for_testing().catalog);

    let before = resolver.resolve_entitlements(&UserId::new("u1")).await;

    let mut renamed = product("mod-01", Some("Assetto Corsa"));
    renamed.name = "Renamed".to_string();
    store.upsert_product(renamed);

    let after = resolver.resolve_entitlements(&UserId::new("u1")).await;

    assert_eq!(before, after);
    assert_eq!(after.groups()[0].game, "Reshade");
    assert_eq!(after.groups()[0].products[0].name, "Mod mod-01");
}
