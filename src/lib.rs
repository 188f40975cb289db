//! Catalog-Mirror: a storefront catalog mirroring pipeline
//!
//! This crate periodically scrapes a storefront's public HTML pages and
//! maintains a locally persisted catalog snapshot (categories, products,
//! product images). The pipeline is fetch -> parse -> reconcile -> download
//! assets -> persist, driven by a timer and by manual triggers, with the
//! persisted catalog only ever replaced atomically after a fully completed
//! sync.

pub mod assets;
pub mod catalog;
pub mod config;
pub mod scrape;
pub mod sync;

use thiserror::Error;

/// Main error type for fatal sync failures
///
/// Non-fatal conditions (a single invalid product record, a single failed
/// image download) are not errors; they are accumulated as warnings on the
/// sync run summary. Anything that surfaces as a `MirrorError` aborts the
/// sync attempt and leaves the persisted catalog untouched.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] scrape::FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] scrape::ParseError),

    #[error("Catalog store error: {0}")]
    Store(#[from] catalog::StoreError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {name}: {message}")]
    InvalidEnv { name: &'static str, message: String },
}

/// Result type alias for catalog-mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{Catalog, Category, Product, SyncCounts, SyncOutcome, SyncRun};
pub use config::Config;
pub use sync::{SyncAttempt, SyncService};
