use serde::Deserialize;

/// Main configuration structure for the catalog mirror
///
/// Every section and field has a default, so a deployment can run with no
/// config file at all and supply only the environment overrides
/// (`MIRROR_SHOP_URL`, `MIRROR_SYNC_INTERVAL_HOURS`, `PORT`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storefront: StorefrontConfig,
    pub fetch: FetchConfig,
    pub sync: SyncConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

/// Identity of the storefront being mirrored
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    /// Base URL of the storefront (scheme + host)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the shop landing page, relative to the base URL
    #[serde(rename = "shop-path")]
    pub shop_path: String,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            base_url: "https://shop.example.com".to_string(),
            shop_path: "/shop".to_string(),
        }
    }
}

/// HTTP fetching behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Minimum delay between consecutive page requests (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Maximum retries for transient failures (timeouts, 5xx)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Initial backoff before a retry, doubled per attempt (milliseconds)
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 2000,
            max_retries: 3,
            retry_backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// Sync cycle behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Hours between scheduled syncs
    #[serde(rename = "interval-hours")]
    pub interval_hours: u64,

    /// Safety cap on listing pages followed per category
    #[serde(rename = "max-listing-pages")]
    pub max_listing_pages: u32,

    /// Concurrent image downloads
    #[serde(rename = "image-concurrency")]
    pub image_concurrency: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            max_listing_pages: 100,
            image_concurrency: 4,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path of the persisted catalog JSON document
    #[serde(rename = "catalog-path")]
    pub catalog_path: String,

    /// Directory where product images are materialized
    #[serde(rename = "images-dir")]
    pub images_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            catalog_path: "./data/catalog.json".to_string(),
            images_dir: "./data/images".to_string(),
        }
    }
}

/// Settings consumed by the read-only serving layer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port the serving layer listens on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}
