//! Download gateway error taxonomy.

/// Classification of a failure, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input (caller's fault)
    Validation,
    /// Well-formed but unrecognized key
    NotFound,
    /// The upstream resource could not be retrieved
    Upstream,
    /// Anything unanticipated
    Internal,
    /// Record store failure while resolving entitlements; recovered
    /// locally and never surfaced to callers
    BackendUnavailable,
}

/// Errors raised while serving a download.
///
/// Display output is for operators and may name the key and filename. It
/// never contains the upstream location. Callers get [`GatewayError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Download key is missing")]
    MissingKey,

    #[error("Download key '{key}' is not recognized")]
    UnknownKey { key: String },

    #[error("Upstream for '{key}' answered with status {status}")]
    UpstreamStatus { key: String, status: u16 },

    #[error("Upstream for '{key}' returned no usable body")]
    UpstreamEmpty { key: String },

    #[error("Upstream request for '{key}' failed: {reason}")]
    UpstreamRequest { key: String, reason: String },

    #[error("HTTP client setup failed: {reason}")]
    ClientSetup { reason: String },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::MissingKey => ErrorKind::Validation,
            GatewayError::UnknownKey { .. } => ErrorKind::NotFound,
            GatewayError::UpstreamStatus { .. } | GatewayError::UpstreamEmpty { .. } => {
                ErrorKind::Upstream
            }
            GatewayError::UpstreamRequest { .. } | GatewayError::ClientSetup { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Fixed, detail-free message safe to return to clients.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "Missing file parameter",
            ErrorKind::NotFound => "File not found",
            ErrorKind::Upstream => "Failed to fetch file",
            ErrorKind::Internal | ErrorKind::BackendUnavailable => "Server error",
        }
    }

    /// Safe to retry: the request itself was fine, the fetch was not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Upstream | ErrorKind::Internal)
    }
}
