//! Capwatch CLI support
//!
//! Tracing setup, catalog selection, AWS wiring and report rendering used by
//! the `capwatch` binary.

pub mod output;
pub mod wiring;

use anyhow::{Context, Result};
use capwatch_core::config::LogFormat;
use capwatch_core::{MonitorConfig, QuotaCatalog};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Amazon Connect quotas monitored when no catalog file is configured.
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/connect_quotas.json");

const DEFAULT_LOG_FILTER: &str = "capwatch=info";

/// Initialize tracing for the CLI. `RUST_LOG` overrides the default filter.
///
/// Logs go to stderr so stdout stays parseable.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// The configured catalog, or the built-in one, with applied-limit service
/// codes filled in.
pub fn load_catalog(config: &MonitorConfig) -> Result<QuotaCatalog> {
    let catalog = match &config.quota_catalog_path {
        Some(path) => QuotaCatalog::load(path)
            .with_context(|| format!("Failed to load quota catalog {}", path.display()))?,
        None => QuotaCatalog::from_json_str(BUILTIN_CATALOG)
            .context("Built-in quota catalog is invalid")?,
    };
    Ok(catalog.with_default_service_code(&config.quota_service_code))
}

/// Validate a catalog file (or the built-in catalog) and collect every problem.
pub fn validate_catalog(path: Option<&Path>) -> Result<QuotaCatalog, Vec<String>> {
    let parsed = match path {
        Some(path) => QuotaCatalog::load(path),
        None => QuotaCatalog::from_json_str(BUILTIN_CATALOG),
    };
    parsed.map_err(|e| e.messages())
}
