//! Download gateway over real sockets against a stub upstream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use modvault_core::{
    CatalogResolver, DescriptorTable, DownloadGateway, InMemoryRecordStore, ModvaultConfig,
    RecordStore,
};
use modvault_web::{AppState, TrustedHeaderIdentity, build_router};
use tokio::net::TcpListener;

const PRESET_BODY: &str = "[Preset]\nTechniques=SMAA,Clarity,Vibrance\n";

/// Flips its flag when the upstream body is dropped by the stub server.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Harness {
    gateway_addr: SocketAddr,
    upstream_addr: SocketAddr,
    endless_released: Arc<AtomicBool>,
}

fn endless_body(released: Arc<AtomicBool>) -> Response {
    let guard = ReleaseGuard(released);
    let chunks = futures::stream::unfold(guard, |guard| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Some((Ok::<_, std::io::Error>(Bytes::from_static(&[7u8; 1024])), guard))
    });
    Body::from_stream(chunks).into_response()
}

async fn spawn_upstream() -> (SocketAddr, Arc<AtomicBool>) {
    let released = Arc::new(AtomicBool::new(false));
    let endless_flag = released.clone();

    let app = Router::new()
        .route(
            "/files/preset.ini",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], PRESET_BODY) }),
        )
        .route(
            "/files/broken",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage node 7 exploded",
                )
            }),
        )
        .route("/files/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route(
            "/files/empty-stream",
            get(|| async {
                Body::from_stream(futures::stream::empty::<Result<Bytes, std::io::Error>>())
            }),
        )
        .route(
            "/files/endless",
            get(move || {
                let flag = endless_flag.clone();
                async move { endless_body(flag) }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, released)
}

async fn spawn_harness() -> Harness {
    let (upstream_addr, endless_released) = spawn_upstream().await;

    // A port nobody listens on
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let mut table = DescriptorTable::new();
    for (key, upstream, filename) in [
        (
            "kimdog-preset",
            format!("http://{upstream_addr}/files/preset.ini"),
            "KimDog_Personal.ini",
        ),
        (
            "drift-pack",
            format!("http://{upstream_addr}/files/preset.ini"),
            "KimDog's Drift Pack – Straße.rar",
        ),
        (
            "broken",
            format!("http://{upstream_addr}/files/broken"),
            "broken.bin",
        ),
        (
            "empty",
            format!("http://{upstream_addr}/files/empty"),
            "empty.bin",
        ),
        (
            "empty-stream",
            format!("http://{upstream_addr}/files/empty-stream"),
            "empty.bin",
        ),
        (
            "endless",
            format!("http://{upstream_addr}/files/endless"),
            "endless.bin",
        ),
        (
            "offline",
            format!("http://127.0.0.1:{closed_port}/files/offline"),
            "offline.bin",
        ),
    ] {
        table.insert(key, &upstream, filename).unwrap();
    }

    let config = ModvaultConfig::for_testing();
    let gateway = DownloadGateway::new(Arc::new(table), &config.upstream).unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let resolver = CatalogResolver::new(store, &config.catalog);
    let state = AppState::new(
        gateway,
        resolver,
        TrustedHeaderIdentity::new(config.server.identity_header),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        gateway_addr,
        upstream_addr,
        endless_released,
    }
}

impl Harness {
    async fn download(&self, path_and_query: &str) -> reqwest::Response {
        reqwest::get(format!("http://{}{path_and_query}", self.gateway_addr))
            .await
            .unwrap()
    }
}

fn header_text(response: &reqwest::Response, name: header::HeaderName) -> String {
    let value = response
        .headers()
        .get(name.as_str())
        .unwrap_or_else(|| panic!("missing {name} header"));
    String::from_utf8(value.as_bytes().to_vec()).unwrap()
}

#[tokio::test]
async fn test_download_streams_file_as_attachment() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=kimdog-preset").await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        header_text(&response, header::CONTENT_TYPE),
        "application/octet-stream"
    );
    assert!(
        header_text(&response, header::CONTENT_DISPOSITION)
            .starts_with("attachment; filename=\"KimDog_Personal.ini\"")
    );
    assert_eq!(header_text(&response, header::CACHE_CONTROL), "no-store");
    assert_eq!(
        header_text(&response, header::X_CONTENT_TYPE_OPTIONS),
        "nosniff"
    );
    assert_eq!(
        header_text(&response, header::CONTENT_LENGTH),
        PRESET_BODY.len().to_string()
    );
    assert_eq!(response.text().await.unwrap(), PRESET_BODY);
}

#[tokio::test]
async fn test_api_download_alias_serves_same_file() {
    let harness = spawn_harness().await;

    let response = harness.download("/api/download?file=kimdog-preset").await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), PRESET_BODY);
}

#[tokio::test]
async fn test_filename_is_sent_verbatim() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=drift-pack").await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let disposition = header_text(&response, header::CONTENT_DISPOSITION);
    assert!(disposition.contains("filename=\"KimDog's Drift Pack – Straße.rar\""));
    assert!(disposition.contains("filename*=UTF-8''"));
}

#[tokio::test]
async fn test_missing_and_unknown_keys() {
    let harness = spawn_harness().await;

    let missing = harness.download("/download").await;
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Missing file parameter" }));

    let unknown = harness.download("/download?file=no-such-key").await;
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = unknown.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "File not found" }));
}

#[tokio::test]
async fn test_raw_upstream_location_is_not_a_key() {
    let harness = spawn_harness().await;
    let location = format!("http://{}/files/preset.ini", harness.upstream_addr);

    let url = reqwest::Url::parse_with_params(
        &format!("http://{}/download", harness.gateway_addr),
        &[("file", location.as_str())],
    )
    .unwrap();
    let response = reqwest::get(url).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upstream_error_is_bad_gateway_without_details() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=broken").await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let headers = format!("{:?}", response.headers());
    let body = response.text().await.unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({ "error": "Failed to fetch file" })
    );
    for leaked in [
        harness.upstream_addr.to_string(),
        "/files/broken".to_string(),
        "storage node".to_string(),
    ] {
        assert!(!body.contains(&leaked), "body leaks {leaked}");
        assert!(!headers.contains(&leaked), "headers leak {leaked}");
    }
}

#[tokio::test]
async fn test_empty_upstream_is_bad_gateway() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=empty").await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_successful_status_without_bytes_is_bad_gateway() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=empty-stream").await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_padded_key_is_not_found() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=%20kimdog-preset%20").await;

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_upstream_is_server_error() {
    let harness = spawn_harness().await;

    let response = harness.download("/download?file=offline").await;

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.text().await.unwrap();
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({ "error": "Server error" })
    );
    assert!(!body.contains("offline"));
}

#[tokio::test]
async fn test_repeated_downloads_are_independent() {
    let harness = spawn_harness().await;

    for _ in 0..3 {
        let response = harness.download("/download?file=kimdog-preset").await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), PRESET_BODY);
    }
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream() {
    let harness = spawn_harness().await;

    let mut response = harness.download("/download?file=endless").await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.content_length().is_none());

    let first = response.chunk().await.unwrap().unwrap();
    assert!(!first.is_empty());
    assert!(!harness.endless_released.load(Ordering::SeqCst));

    // Hang up mid-body
    drop(response);

    let released = tokio::time::timeout(Duration::from_secs(10), async {
        while !harness.endless_released.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(
        released.is_ok(),
        "upstream body should be dropped after the client disconnects"
    );
}
