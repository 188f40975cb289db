use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable naming the storefront base URL
pub const ENV_SHOP_URL: &str = "MIRROR_SHOP_URL";

/// Environment variable naming the sync interval in hours
pub const ENV_SYNC_INTERVAL: &str = "MIRROR_SYNC_INTERVAL_HOURS";

/// Environment variable naming the serving port
pub const ENV_PORT: &str = "PORT";

/// Loads the effective configuration
///
/// Reads the TOML file when a path is given, otherwise starts from built-in
/// defaults. Environment overrides are applied on top, then the result is
/// validated.
///
/// # Arguments
///
/// * `path` - Optional path to a TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to detect whether the configuration changed between runs.
/// Returns the literal `"builtin"` when running without a config file.
pub fn compute_config_hash(path: Option<&Path>) -> Result<String, ConfigError> {
    let Some(path) = path else {
        return Ok("builtin".to_string());
    };

    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: Option<&Path>) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Applies environment variable overrides to a configuration
///
/// The lookup is injected so tests can exercise overrides without mutating
/// process-wide environment state.
fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_SHOP_URL) {
        if !value.trim().is_empty() {
            config.storefront.base_url = value.trim().to_string();
        }
    }

    if let Some(value) = lookup(ENV_SYNC_INTERVAL) {
        config.sync.interval_hours =
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: ENV_SYNC_INTERVAL,
                    message: format!("expected a whole number of hours, got '{}'", value),
                })?;
    }

    if let Some(value) = lookup(ENV_PORT) {
        config.server.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: ENV_PORT,
            message: format!("expected a TCP port number, got '{}'", value),
        })?;
    }

    Ok(())
}
