//! Configuration module for the catalog mirror
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the environment overrides used in containerized deployments
//! (`MIRROR_SHOP_URL`, `MIRROR_SYNC_INTERVAL_HOURS`, `PORT`).
//!
//! # Example
//!
//! ```no_run
//! use catalog_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Some(Path::new("mirror.toml"))).unwrap();
//! println!("Mirroring {}", config.storefront.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetchConfig, OutputConfig, ServerConfig, StorefrontConfig, SyncConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, ENV_PORT, ENV_SHOP_URL,
    ENV_SYNC_INTERVAL,
};
