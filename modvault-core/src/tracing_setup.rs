//! Tracing setup for ModVault
//!
//! Two sinks: the console at the operator's level and a trace-level file
//! holding the last run. HTTP client internals are capped at `info` in both,
//! since their debug and trace events name upstream hosts and URLs.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the full trace, overwritten on every run.
pub const LOG_FILE_NAME: &str = "modvault-last-run.log";

/// Targets whose verbose events carry upstream locations.
const UPSTREAM_CLIENT_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls"];

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("Failed to prepare log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Where the full trace is written for a given logs directory.
pub fn log_file_path(logs_dir: Option<&Path>) -> PathBuf {
    logs_dir
        .unwrap_or_else(|| Path::new("logs"))
        .join(LOG_FILE_NAME)
}

/// Console filter: `RUST_LOG` when set, else `level`, with HTTP clients capped.
///
/// # Errors
/// - `ParseError` - A capping directive failed to parse
pub fn console_filter(level: Level) -> Result<EnvFilter, ParseError> {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    cap_upstream_clients(base)
}

/// File filter: everything at trace, with HTTP clients capped.
///
/// # Errors
/// - `ParseError` - A capping directive failed to parse
pub fn file_filter() -> Result<EnvFilter, ParseError> {
    cap_upstream_clients(EnvFilter::new("trace"))
}

fn cap_upstream_clients(mut filter: EnvFilter) -> Result<EnvFilter, ParseError> {
    for target in UPSTREAM_CLIENT_TARGETS {
        filter = filter.add_directive(format!("{target}=info").parse::<Directive>()?);
    }
    Ok(filter)
}

/// Installs the global subscriber and returns the path of the trace file.
///
/// # Errors
/// - `TracingSetupError::Io` - Logs directory or file could not be created
/// - `TracingSetupError::AlreadyInitialized` - A global subscriber is already set
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, TracingSetupError> {
    let log_file_path = log_file_path(logs_dir);
    if let Some(dir) = log_file_path.parent() {
        create_dir_all(dir)?;
    }
    let log_file = File::create(&log_file_path)?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter(console_level)?);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(file_filter()?);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        console = %console_level,
        log_file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
