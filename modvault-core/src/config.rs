//! Centralized configuration for ModVault.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Maximum number of ids the record store accepts in one catalog lookup.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Central configuration for all ModVault components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ModvaultConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub catalog: CatalogConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Request header carrying the already-authenticated user id
    pub identity_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            identity_header: "x-modvault-user".to_string(),
        }
    }
}

/// Upstream fetch configuration for the download relay.
///
/// Only the connect phase is bounded; a relay runs as long as the body flows.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// TCP/TLS connect timeout for upstream fetches
    pub connect_timeout: Duration,
    /// User agent sent to upstream hosts
    pub user_agent: &'static str,
    /// Maximum redirects followed before giving up
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: "modvault/0.1.0",
            max_redirects: 5,
        }
    }
}

/// Entitlement resolution and presentation defaults.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Ids per catalog lookup (clamped to the record store's own limit)
    pub batch_size: usize,
    /// Group label for products without a game
    pub unknown_game_label: String,
    /// Image shown when a product image is missing or untrusted
    pub default_image: String,
    /// Hosts whose https images are passed through unchanged
    pub trusted_image_hosts: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            unknown_game_label: "Unknown Game".to_string(),
            default_image: "/default-mod-icon.png".to_string(),
            trusted_image_hosts: vec![
                "firebasestorage.googleapis.com".to_string(),
                "upload.wikimedia.org".to_string(),
                "raw.githubusercontent.com".to_string(),
                "lh3.googleusercontent.com".to_string(),
            ],
        }
    }
}

impl ModvaultConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server configuration overrides
        if let Ok(addr) = std::env::var("MODVAULT_BIND_ADDR")
            && let Ok(addr) = addr.parse::<SocketAddr>()
        {
            config.server.bind_addr = addr;
        }

        if let Ok(header) = std::env::var("MODVAULT_IDENTITY_HEADER")
            && !header.trim().is_empty()
        {
            config.server.identity_header = header.trim().to_ascii_lowercase();
        }

        // Upstream configuration overrides
        if let Ok(timeout) = std::env::var("MODVAULT_CONNECT_TIMEOUT_SECS")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.upstream.connect_timeout = Duration::from_secs(seconds);
        }

        if let Ok(redirects) = std::env::var("MODVAULT_MAX_REDIRECTS")
            && let Ok(count) = redirects.parse::<usize>()
        {
            config.upstream.max_redirects = count;
        }

        // Catalog configuration overrides
        if let Ok(batch) = std::env::var("MODVAULT_BATCH_SIZE")
            && let Ok(size) = batch.parse::<usize>()
            && size > 0
        {
            config.catalog.batch_size = size;
        }

        if let Ok(label) = std::env::var("MODVAULT_UNKNOWN_GAME")
            && !label.is_empty()
        {
            config.catalog.unknown_game_label = label;
        }

        config
    }

    /// Creates a configuration for tests: ephemeral port, short connect timeout.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
                ..Default::default()
            },
            upstream: UpstreamConfig {
                connect_timeout: Duration::from_secs(2),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
