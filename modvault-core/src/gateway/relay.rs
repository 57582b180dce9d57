//! Upstream relay: opens the upstream resource for a key and streams it.
//!
//! The relay never buffers the body. Each chunk is handed to the caller as it
//! arrives, so memory use is bounded by the transport's own buffers. The
//! upstream connection is owned by [`DownloadStream`] and released when the
//! stream finishes, fails, is aborted, or is dropped by a disconnecting client.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, AbortHandle, Abortable, BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::descriptor::{DescriptorTable, DownloadDescriptor};
use super::error::GatewayError;
use crate::config::UpstreamConfig;

/// Error yielded by a relay whose upstream failed mid-body.
#[derive(Debug, thiserror::Error)]
#[error("Upstream relay interrupted: {reason}")]
pub struct RelayInterrupted {
    reason: String,
}

/// Where a relay currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Streaming,
    Completed,
    Failed,
    Aborted,
}

/// Resolves download keys and opens upstream relays.
pub struct DownloadGateway {
    descriptors: Arc<DescriptorTable>,
    client: reqwest::Client,
}

impl DownloadGateway {
    /// Creates a gateway over a fixed descriptor table.
    ///
    /// # Errors
    /// - `GatewayError::ClientSetup` - HTTP client could not be built
    pub fn new(
        descriptors: Arc<DescriptorTable>,
        config: &UpstreamConfig,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| GatewayError::ClientSetup {
                reason: e.without_url().to_string(),
            })?;

        Ok(Self {
            descriptors,
            client,
        })
    }

    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    /// Opens the upstream resource registered under `key`.
    ///
    /// Key lookup is a pure table lookup; only a known key touches the
    /// network. Each call performs an independent fetch.
    ///
    /// # Errors
    /// - `GatewayError::MissingKey` - `key` is empty
    /// - `GatewayError::UnknownKey` - `key` is not in the descriptor table
    /// - `GatewayError::UpstreamStatus` - Upstream answered with a non-success status
    /// - `GatewayError::UpstreamEmpty` - Upstream answered successfully without a body
    /// - `GatewayError::UpstreamRequest` - Upstream could not be reached
    pub async fn serve_download(&self, key: &str) -> Result<DownloadStream, GatewayError> {
        // Blank means absent; any other key is looked up exactly as given
        if key.trim().is_empty() {
            return Err(GatewayError::MissingKey);
        }

        let descriptor = self
            .descriptors
            .get(key)
            .ok_or_else(|| GatewayError::UnknownKey {
                key: key.to_string(),
            })?;

        let relay_id = Uuid::new_v4();
        debug!(%relay_id, key, filename = descriptor.filename(), "Opening upstream");

        let response = self
            .client
            .get(descriptor.upstream_url())
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                warn!(%relay_id, key, error = %e, "Upstream request failed");
                GatewayError::UpstreamRequest {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%relay_id, key, status = status.as_u16(), "Upstream refused download");
            return Err(GatewayError::UpstreamStatus {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
            || response.content_length() == Some(0)
        {
            warn!(%relay_id, key, status = status.as_u16(), "Upstream returned an empty body");
            return Err(GatewayError::UpstreamEmpty {
                key: key.to_string(),
            });
        }

        // Commit to a download only once the upstream has produced a byte
        let content_length = response.content_length();
        let mut body = response.bytes_stream().boxed();
        let first = loop {
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(e)) => {
                    let e = e.without_url();
                    warn!(%relay_id, key, error = %e, "Upstream body failed before the first byte");
                    return Err(GatewayError::UpstreamRequest {
                        key: key.to_string(),
                        reason: e.to_string(),
                    });
                }
                None => {
                    warn!(%relay_id, key, "Upstream returned an empty body");
                    return Err(GatewayError::UpstreamEmpty {
                        key: key.to_string(),
                    });
                }
            }
        };
        let body = stream::iter([Ok(first)]).chain(body).boxed();

        Ok(DownloadStream::open(relay_id, descriptor, content_length, body))
    }
}

/// Streaming body of one download, owning the upstream connection.
///
/// Dropping the stream before the upstream body is exhausted tears the
/// upstream connection down instead of draining it.
pub struct DownloadStream {
    relay_id: Uuid,
    key: String,
    filename: String,
    content_disposition: String,
    content_length: Option<u64>,
    inner: Abortable<BoxStream<'static, reqwest::Result<Bytes>>>,
    abort: AbortHandle,
    bytes_relayed: u64,
    outcome: RelayOutcome,
}

impl DownloadStream {
    fn open(
        relay_id: Uuid,
        descriptor: &DownloadDescriptor,
        content_length: Option<u64>,
        body: BoxStream<'static, reqwest::Result<Bytes>>,
    ) -> Self {
        let (abort, registration) = AbortHandle::new_pair();

        info!(
            %relay_id,
            key = descriptor.key(),
            filename = descriptor.filename(),
            content_length,
            "Relay started"
        );

        Self {
            relay_id,
            key: descriptor.key().to_string(),
            filename: descriptor.filename().to_string(),
            content_disposition: descriptor.content_disposition(),
            content_length,
            inner: Abortable::new(body, registration),
            abort,
            bytes_relayed: 0,
            outcome: RelayOutcome::Streaming,
        }
    }

    pub fn relay_id(&self) -> Uuid {
        self.relay_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Ready-made `Content-Disposition` header value.
    pub fn content_disposition(&self) -> &str {
        &self.content_disposition
    }

    /// Body length announced by the upstream, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }

    pub fn outcome(&self) -> RelayOutcome {
        self.outcome
    }

    /// Handle that ends the relay early from outside the stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

impl Stream for DownloadStream {
    type Item = Result<Bytes, RelayInterrupted>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.outcome != RelayOutcome::Streaming {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_relayed += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                let e = e.without_url();
                this.outcome = RelayOutcome::Failed;
                warn!(
                    relay_id = %this.relay_id,
                    key = this.key,
                    bytes_relayed = this.bytes_relayed,
                    error = %e,
                    "Upstream failed mid-relay"
                );
                Poll::Ready(Some(Err(RelayInterrupted {
                    reason: e.to_string(),
                })))
            }
            Poll::Ready(None) => {
                if this.abort.is_aborted() {
                    this.outcome = RelayOutcome::Aborted;
                    info!(
                        relay_id = %this.relay_id,
                        key = this.key,
                        bytes_relayed = this.bytes_relayed,
                        "Relay aborted"
                    );
                } else {
                    this.outcome = RelayOutcome::Completed;
                    info!(
                        relay_id = %this.relay_id,
                        key = this.key,
                        filename = this.filename,
                        bytes_relayed = this.bytes_relayed,
                        "Relay complete"
                    );
                }
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for DownloadStream {
    fn drop(&mut self) {
        if self.outcome == RelayOutcome::Streaming {
            self.abort.abort();
            info!(
                relay_id = %self.relay_id,
                key = self.key,
                bytes_relayed = self.bytes_relayed,
                "Client went away, upstream connection released"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::ModvaultConfig;

    fn gateway_with(key: &str, upstream: &str, filename: &str) -> DownloadGateway {
        let mut table = DescriptorTable::new();
        table.insert(key, upstream, filename).unwrap();
        DownloadGateway::new(Arc::new(table), &ModvaultConfig::for_testing().upstream).unwrap()
    }

    /// Serves one connection with a fixed raw HTTP response.
    async fn spawn_fixed_upstream(response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response).await.unwrap();
            let _ = socket.shutdown().await;
        });
        addr
    }

    /// Serves one connection with an endless chunked body; signals once the
    /// client has hung up.
    async fn spawn_trickle_upstream() -> (SocketAddr, oneshot::Receiver<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (closed_tx, closed_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let head = b"HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ntransfer-encoding: chunked\r\n\r\n";
            if socket.write_all(head).await.is_ok() {
                while socket.write_all(b"5\r\nhello\r\n").await.is_ok() {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
            let _ = closed_tx.send(());
        });
        (addr, closed_rx)
    }

    #[tokio::test]
    async fn test_missing_and_unknown_keys_rejected_without_network() {
        let gateway = gateway_with("preset", "http://127.0.0.1:9/never", "a.ini");

        let missing = gateway.serve_download("   ").await.err().unwrap();
        assert!(matches!(missing, GatewayError::MissingKey));

        let unknown = gateway.serve_download("no-such-key").await.err().unwrap();
        assert!(matches!(unknown, GatewayError::UnknownKey { ref key } if key == "no-such-key"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_internal_and_hides_url() {
        // Reserve a port, then free it so the connect is refused
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let upstream = format!("http://127.0.0.1:{port}/secret-path/file.ini");
        let gateway = gateway_with("preset", &upstream, "file.ini");

        let err = gateway.serve_download("preset").await.err().unwrap();

        assert!(matches!(err, GatewayError::UpstreamRequest { .. }));
        assert_eq!(err.kind(), crate::gateway::ErrorKind::Internal);
        assert!(!err.to_string().contains("secret-path"));
    }

    #[tokio::test]
    async fn test_upstream_error_status_maps_to_upstream_error() {
        let addr = spawn_fixed_upstream(
            b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 4\r\nconnection: close\r\n\r\noops",
        )
        .await;
        let gateway = gateway_with("preset", &format!("http://{addr}/f"), "a.ini");

        let err = gateway.serve_download("preset").await.err().unwrap();

        assert!(matches!(err, GatewayError::UpstreamStatus { status: 500, .. }));
        assert_eq!(err.user_message(), "Failed to fetch file");
    }

    #[tokio::test]
    async fn test_empty_upstream_body_rejected() {
        let addr = spawn_fixed_upstream(
            b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n",
        )
        .await;
        let gateway = gateway_with("preset", &format!("http://{addr}/f"), "a.ini");

        let err = gateway.serve_download("preset").await.err().unwrap();
        assert!(matches!(err, GatewayError::UpstreamEmpty { .. }));
    }

    #[tokio::test]
    async fn test_empty_chunked_body_rejected() {
        let addr = spawn_fixed_upstream(
            b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n0\r\n\r\n",
        )
        .await;
        let gateway = gateway_with("preset", &format!("http://{addr}/f"), "a.ini");

        let err = gateway.serve_download("preset").await.err().unwrap();

        assert!(matches!(err, GatewayError::UpstreamEmpty { .. }));
        assert_eq!(err.user_message(), "Failed to fetch file");
    }

    #[tokio::test]
    async fn test_padded_key_is_not_trimmed_into_a_match() {
        let gateway = gateway_with("preset", "http://127.0.0.1:9/never", "a.ini");

        let err = gateway.serve_download(" preset ").await.err().unwrap();

        assert!(matches!(err, GatewayError::UnknownKey { ref key } if key == " preset "));
    }

    #[tokio::test]
    async fn test_stream_relays_full_body() {
        let addr = spawn_fixed_upstream(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 11\r\nconnection: close\r\n\r\nhello world",
        )
        .await;
        let gateway = gateway_with("preset", &format!("http://{addr}/f"), "KimDog_Personal.ini");

        let mut stream = gateway.serve_download("preset").await.unwrap();
        assert_eq!(stream.content_length(), Some(11));
        assert!(
            stream
                .content_disposition()
                .contains("filename=\"KimDog_Personal.ini\"")
        );

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(body, b"hello world");
        assert_eq!(stream.bytes_relayed(), 11);
        assert_eq!(stream.outcome(), RelayOutcome::Completed);
    }

    #[tokio::test]
    async fn test_abort_ends_relay_and_releases_upstream() {
        let (addr, closed) = spawn_trickle_upstream().await;
        let gateway = gateway_with("trickle", &format!("http://{addr}/f"), "a.bin");

        let mut stream = gateway.serve_download("trickle").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"hello"));

        stream.abort_handle().abort();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.outcome(), RelayOutcome::Aborted);

        drop(stream);
        tokio::time::timeout(Duration::from_secs(5), closed)
            .await
            .expect("upstream connection should be closed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_upstream() {
        let (addr, closed) = spawn_trickle_upstream().await;
        let gateway = gateway_with("trickle", &format!("http://{addr}/f"), "a.bin");

        let mut stream = gateway.serve_download("trickle").await.unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        tokio::time::timeout(Duration::from_secs(5), closed)
            .await
            .expect("upstream connection should be closed")
            .unwrap();
    }
}
