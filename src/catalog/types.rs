//! Catalog data model
//!
//! These are the shapes persisted in the catalog JSON document and consumed
//! read-only by the serving layer.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A storefront category
///
/// Categories form a forest: `parent` is None for root categories, and
/// `children` lists direct subcategory ids in discovery order. Both sides of
/// the relation are rebuilt from scratch on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier, taken from the storefront URL when it carries a
    /// numeric id, otherwise the URL slug
    pub id: String,

    /// Display name
    pub name: String,

    /// Absolute URL of the category page on the source storefront
    pub url: String,

    /// Parent category id, None for root categories
    #[serde(default)]
    pub parent: Option<String>,

    /// Ordered ids of direct subcategories
    #[serde(default)]
    pub children: Vec<String>,
}

/// A mirrored product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Stable identifier derived from the product URL
    pub id: String,

    /// Display name
    pub name: String,

    /// Long description, only available once the detail page was fetched
    #[serde(default)]
    pub description: Option<String>,

    /// Visible product reference / SKU code, when the storefront shows one
    #[serde(default)]
    pub reference_code: Option<String>,

    /// Price as shown on the storefront, currency-agnostic
    pub price: BigDecimal,

    /// Id of the category this product was found under
    pub category_id: String,

    /// Remote image URL, as extracted from the listing
    #[serde(default)]
    pub image_url: Option<String>,

    /// File name of the locally materialized image, relative to the images
    /// directory; None until downloaded
    #[serde(default)]
    pub image_path: Option<String>,

    /// Absolute URL of the product page on the source storefront
    pub source_url: String,

    /// When this product was last observed in a crawl
    pub last_seen: DateTime<Utc>,
}

impl Product {
    /// Whether this freshly listed record differs from a previously stored
    /// product in any listing-visible way
    ///
    /// Used to decide if a product changed on the source and therefore needs
    /// its detail page re-fetched. Local-only state (`image_path`,
    /// `last_seen`) and detail-only fields (`description`) never count.
    /// Fields a listing may simply omit (image, reference code) only count
    /// when this record actually carries a value, since the stored product
    /// may have obtained them from its detail page.
    pub fn differs_on_listing(&self, prev: &Product) -> bool {
        if self.name != prev.name || self.price != prev.price || self.source_url != prev.source_url
        {
            return true;
        }
        if self.image_url.is_some() && self.image_url != prev.image_url {
            return true;
        }
        if self.reference_code.is_some() && self.reference_code != prev.reference_code {
            return true;
        }
        false
    }
}

/// The full mirrored catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub categories: Vec<Category>,

    #[serde(default)]
    pub products: Vec<Product>,

    #[serde(default)]
    pub metadata: CatalogMetadata,
}

impl Catalog {
    /// Builds an id -> product lookup over this catalog
    pub fn products_by_id(&self) -> HashMap<&str, &Product> {
        self.products.iter().map(|p| (p.id.as_str(), p)).collect()
    }

    /// Builds an id -> category lookup over this catalog
    pub fn categories_by_id(&self) -> HashMap<&str, &Category> {
        self.categories.iter().map(|c| (c.id.as_str(), c)).collect()
    }

    /// Recomputes the count fields in the metadata
    pub fn refresh_counts(&mut self) {
        self.metadata.product_count = self.products.len() as u64;
        self.metadata.category_count = self.categories.len() as u64;
    }
}

/// Catalog metadata, kept alongside the data for the stats surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogMetadata {
    /// Number of products in the catalog
    #[serde(default)]
    pub product_count: u64,

    /// Number of categories in the catalog
    #[serde(default)]
    pub category_count: u64,

    /// Summary of the sync that produced this catalog
    #[serde(default)]
    pub last_run: Option<SyncRun>,
}

impl CatalogMetadata {
    /// Start time of the last persisted sync, if any
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_run.as_ref().map(|run| run.started_at)
    }

    /// Outcome of the last persisted sync, if any
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.last_run.as_ref().map(|run| run.outcome)
    }
}

/// Record of one sync attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    pub outcome: SyncOutcome,

    #[serde(default)]
    pub counts: SyncCounts,

    /// Non-fatal conditions observed during the sync (dropped records,
    /// failed image downloads, duplicate id collisions)
    #[serde(default)]
    pub warnings: Vec<String>,

    /// The fatal error, when the outcome is Failed
    #[serde(default)]
    pub error: Option<String>,
}

/// Final outcome of a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    /// Crawl completed, catalog persisted, no warnings
    Success,

    /// Crawl completed and catalog persisted, but some records were dropped
    /// or some images failed to download
    Partial,

    /// Fatal error; the previously persisted catalog was left untouched
    Failed,
}

impl SyncOutcome {
    /// Whether a catalog was persisted for this outcome
    pub fn persisted(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product and category deltas computed by reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub unchanged: u64,
    pub categories: u64,
}

impl SyncCounts {
    /// Whether the sync observed no product-level changes at all
    pub fn is_no_op(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}
