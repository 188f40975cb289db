use crate::config::types::{Config, FetchConfig, OutputConfig, StorefrontConfig, SyncConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storefront_config(&config.storefront)?;
    validate_fetch_config(&config.fetch)?;
    validate_sync_config(&config.sync)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the storefront section
fn validate_storefront_config(config: &StorefrontConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must be http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(
            "base-url must include a host".to_string(),
        ));
    }

    if !config.shop_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "shop-path must start with '/', got '{}'",
            config.shop_path
        )));
    }

    Ok(())
}

/// Validates the fetch section
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.request_delay_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request-delay-ms must be >= 100ms, got {}ms",
            config.request_delay_ms
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    Ok(())
}

/// Validates the sync section
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.interval_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "interval-hours must be >= 1, got {}",
            config.interval_hours
        )));
    }

    if config.max_listing_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-listing-pages must be >= 1, got {}",
            config.max_listing_pages
        )));
    }

    if config.image_concurrency < 1 || config.image_concurrency > 16 {
        return Err(ConfigError::Validation(format!(
            "image-concurrency must be between 1 and 16, got {}",
            config.image_concurrency
        )));
    }

    Ok(())
}

/// Validates the output section
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.catalog_path.is_empty() {
        return Err(ConfigError::Validation(
            "catalog-path cannot be empty".to_string(),
        ));
    }

    if config.images_dir.is_empty() {
        return Err(ConfigError::Validation(
            "images-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
