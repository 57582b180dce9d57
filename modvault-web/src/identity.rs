//! Caller identity.
//!
//! Authentication happens in front of this server. Handlers only ask an
//! [`IdentityProvider`] which user, if any, the request belongs to.

use axum::http::HeaderMap;
use modvault_core::UserId;

/// Resolves the authenticated user behind a request.
pub trait IdentityProvider: Send + Sync {
    /// Returns the user id, or `None` for an anonymous request.
    fn identify(&self, headers: &HeaderMap) -> Option<UserId>;
}

/// Reads the user id from a header set by the fronting auth proxy.
///
/// Only safe when every request passes through that proxy, which must strip
/// the header from client input.
#[derive(Debug, Clone)]
pub struct TrustedHeaderIdentity {
    header: String,
}

impl TrustedHeaderIdentity {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn identify(&self, headers: &HeaderMap) -> Option<UserId> {
        let value = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(UserId::new(value))
    }
}
