//! CLI command implementations

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use modvault_core::{
    CatalogResolver, DescriptorTable, DownloadGateway, InMemoryRecordStore, ModvaultConfig,
    ModvaultError, RecordStore, UserId,
};
use modvault_web::{AppState, TrustedHeaderIdentity, run_server};
use tracing::{info, warn};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the download gateway
    Serve {
        /// Address to bind to (defaults to MODVAULT_BIND_ADDR or 127.0.0.1:3000)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// JSON records file with purchases and products
        #[arg(long)]
        records: Option<PathBuf>,
        /// TOML download table (built-in table when omitted)
        #[arg(long)]
        downloads: Option<PathBuf>,
    },
    /// Validate the download table and audit the catalog against it
    Check {
        /// JSON records file with purchases and products
        #[arg(long)]
        records: Option<PathBuf>,
        /// TOML download table (built-in table when omitted)
        #[arg(long)]
        downloads: Option<PathBuf>,
    },
    /// Print a user's library as JSON
    Resolve {
        /// User id to resolve
        #[arg(long)]
        user: String,
        /// JSON records file with purchases and products
        #[arg(long)]
        records: Option<PathBuf>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever command fails
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve {
            bind,
            records,
            downloads,
        } => serve(bind, records.as_deref(), downloads.as_deref()).await,
        Commands::Check { records, downloads } => {
            check(records.as_deref(), downloads.as_deref()).map(|_| ())
        }
        Commands::Resolve { user, records } => {
            let view = resolve(&user, records.as_deref()).await?;
            println!("{view}");
            Ok(())
        }
    }
}

/// Start the download gateway
///
/// # Errors
/// - Data files cannot be loaded
/// - The server fails to bind or crashes
pub async fn serve(
    bind: Option<SocketAddr>,
    records: Option<&Path>,
    downloads: Option<&Path>,
) -> Result<()> {
    let mut config = ModvaultConfig::from_env();
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }

    let store = load_records(records)?;
    let descriptors = load_descriptors(downloads)?;

    let undownloadable = descriptors.audit(&store.products());
    for product in &undownloadable {
        warn!(
            product_id = %product.product_id,
            download_key = product.download_key.as_str(),
            "Product has no download entry"
        );
    }

    let gateway = DownloadGateway::new(Arc::new(descriptors), &config.upstream)
        .map_err(ModvaultError::from)?;
    let store: Arc<dyn RecordStore> = Arc::new(store);
    let resolver = CatalogResolver::new(store, &config.catalog);
    let identity = TrustedHeaderIdentity::new(config.server.identity_header.clone());

    let state = AppState::new(gateway, resolver, identity);
    run_server(config.server.bind_addr, state)
        .await
        .map_err(|e| anyhow::anyhow!("Server failed: {e}"))
}

/// Validate the download table and audit the catalog against it
///
/// Returns the number of products checked.
///
/// # Errors
/// - Data files cannot be loaded or the download table is invalid
/// - Any product names a download key without a download entry
pub fn check(records: Option<&Path>, downloads: Option<&Path>) -> Result<usize> {
    let store = load_records(records)?;
    let descriptors = load_descriptors(downloads)?;
    descriptors.validate().map_err(ModvaultError::from)?;

    let products = store.products();
    println!("Download keys: {}", descriptors.keys().join(", "));
    println!("Products: {}", products.len());

    let undownloadable = descriptors.audit(&products);
    if undownloadable.is_empty() {
        println!("Every product has a download entry.");
        return Ok(products.len());
    }

    println!("{:-<60}", "");
    for product in &undownloadable {
        println!(
            "{} -> '{}' has no download entry",
            product.product_id, product.download_key
        );
    }
    Err(ModvaultError::Configuration {
        reason: format!(
            "{} of {} products cannot be downloaded",
            undownloadable.len(),
            products.len()
        ),
    }
    .into())
}

/// Resolve a user's library and render it as pretty JSON
///
/// # Errors
/// - Records file cannot be loaded
pub async fn resolve(user: &str, records: Option<&Path>) -> Result<String> {
    let config = ModvaultConfig::from_env();
    let store: Arc<dyn RecordStore> = Arc::new(load_records(records)?);
    let resolver = CatalogResolver::new(store, &config.catalog);

    let view = resolver.resolve_entitlements(&UserId::new(user)).await;
    Ok(serde_json::to_string_pretty(&view)?)
}

fn load_records(path: Option<&Path>) -> modvault_core::Result<InMemoryRecordStore> {
    match path {
        Some(path) => {
            let store = InMemoryRecordStore::load(path)?;
            info!(records = %path.display(), "Loaded records");
            Ok(store)
        }
        None => {
            warn!("No records file given, starting with an empty catalog");
            Ok(InMemoryRecordStore::new())
        }
    }
}

fn load_descriptors(path: Option<&Path>) -> modvault_core::Result<DescriptorTable> {
    match path {
        Some(path) => {
            let table = DescriptorTable::load(path)?;
            if table.is_empty() {
                return Err(ModvaultError::Configuration {
                    reason: format!("download table {} has no entries", path.display()),
                });
            }
            info!(downloads = table.len(), "Loaded download table");
            Ok(table)
        }
        None => {
            info!("Using built-in download table");
            Ok(DescriptorTable::builtin())
        }
    }
}
