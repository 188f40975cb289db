//! Sync orchestration
//!
//! Drives the end-to-end cycle: crawl the storefront, reconcile the records
//! into the existing catalog, materialize images, persist atomically. One
//! sync runs at a time; a trigger arriving while a sync is running is
//! rejected, not queued.
//!
//! Failure policy: any exhausted transport error or missing structural
//! anchor on a category, listing, or detail page abandons the whole sync.
//! A catalog built from a partial crawl is never persisted, so the file on
//! disk always reflects the last fully completed sync. Dropped records and
//! failed image downloads are warnings, not failures; they downgrade the
//! outcome to Partial but the catalog is still persisted.

use crate::assets;
use crate::catalog::{
    self, reconcile, Catalog, Category, FreshCatalog, Product, SyncCounts, SyncOutcome, SyncRun,
};
use crate::config::Config;
use crate::scrape::{
    build_http_client, parse_category_index, parse_product_detail, parse_product_listing,
    CategoryRecord, FetchError, Fetcher, ProductRecord,
};
use crate::MirrorError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

/// Result of asking the service to run a sync
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAttempt {
    /// The sync ran to a terminal outcome (which may be Failed)
    Completed(SyncRun),

    /// A sync was already in progress; nothing was started
    AlreadyRunning,
}

/// Owns the catalog and serializes sync attempts against it
///
/// Both the interval scheduler and manual triggers go through
/// [`SyncService::sync_once`], so they share the same mutual exclusion.
pub struct SyncService {
    config: Config,
    base_url: Url,
    catalog_path: PathBuf,
    images_dir: PathBuf,
    running: AtomicBool,
    last_run: Mutex<Option<SyncRun>>,
}

impl SyncService {
    pub fn new(config: Config) -> Result<Self, MirrorError> {
        let base_url = Url::parse(&config.storefront.base_url)?;
        let catalog_path = PathBuf::from(&config.output.catalog_path);
        let images_dir = PathBuf::from(&config.output.images_dir);

        Ok(Self {
            config,
            base_url,
            catalog_path,
            images_dir,
            running: AtomicBool::new(false),
            last_run: Mutex::new(None),
        })
    }

    /// Path of the persisted catalog document
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// Summary of the most recent sync attempt in this process
    pub fn last_run(&self) -> Option<SyncRun> {
        self.last_run.lock().unwrap().clone()
    }

    /// Whether a sync is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs one sync, unless one is already in progress
    pub async fn sync_once(&self) -> SyncAttempt {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::info!("Sync trigger rejected: a sync is already in progress");
            return SyncAttempt::AlreadyRunning;
        };

        let run = self.execute().await;
        *self.last_run.lock().unwrap() = Some(run.clone());
        SyncAttempt::Completed(run)
    }

    async fn execute(&self) -> SyncRun {
        let started_at = Utc::now();
        tracing::info!("Sync started against {}", self.base_url);

        let existing = catalog::store::load_or_default(&self.catalog_path);
        let mut warnings = Vec::new();

        // One client serves the whole cycle; page fetches go through the
        // pacer, image downloads do not.
        let client = match build_http_client(&self.config.fetch) {
            Ok(client) => client,
            Err(e) => {
                return SyncRun {
                    started_at,
                    finished_at: Some(Utc::now()),
                    outcome: SyncOutcome::Failed,
                    counts: SyncCounts::default(),
                    warnings,
                    error: Some(format!("failed to build HTTP client: {}", e)),
                };
            }
        };

        let fresh = match self.crawl(client.clone(), &existing, &mut warnings).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::error!("Sync failed, catalog left untouched: {}", e);
                return SyncRun {
                    started_at,
                    finished_at: Some(Utc::now()),
                    outcome: SyncOutcome::Failed,
                    counts: SyncCounts::default(),
                    warnings,
                    error: Some(e.to_string()),
                };
            }
        };

        let outcome = reconcile(&existing, fresh, Utc::now());
        let mut catalog = outcome.catalog;
        let counts = outcome.counts;
        warnings.extend(outcome.warnings);

        let download_warnings = assets::download_all(
            &client,
            &self.images_dir,
            &mut catalog.products,
            self.config.sync.image_concurrency as usize,
        )
        .await;
        warnings.extend(download_warnings);

        let outcome = if warnings.is_empty() {
            SyncOutcome::Success
        } else {
            SyncOutcome::Partial
        };

        let run = SyncRun {
            started_at,
            finished_at: Some(Utc::now()),
            outcome,
            counts,
            warnings,
            error: None,
        };

        catalog.metadata.last_run = Some(run.clone());
        catalog.refresh_counts();

        if let Err(e) = catalog::store::persist(&self.catalog_path, &catalog) {
            tracing::error!("Failed to persist catalog, previous file untouched: {}", e);
            return SyncRun {
                outcome: SyncOutcome::Failed,
                error: Some(format!("catalog persistence failed: {}", e)),
                finished_at: Some(Utc::now()),
                ..run
            };
        }

        tracing::info!(
            "Sync {}: {} products ({} added, {} updated, {} removed), {} categories, {} warnings",
            run.outcome,
            catalog.metadata.product_count,
            counts.added,
            counts.updated,
            counts.removed,
            counts.categories,
            run.warnings.len()
        );

        run
    }

    /// Crawls the storefront into a fresh record set
    ///
    /// Fetch order: shop index, then each category's listing pages
    /// (following pagination), then detail pages for products that are new
    /// or changed. Any error returned here aborts the sync.
    async fn crawl(
        &self,
        client: reqwest::Client,
        existing: &Catalog,
        warnings: &mut Vec<String>,
    ) -> Result<FreshCatalog, MirrorError> {
        let mut fetcher = Fetcher::with_client(client, &self.config.fetch);

        let shop_url = self.base_url.join(&self.config.storefront.shop_path)?;
        let body = fetcher.fetch_page(shop_url.as_str()).await?;
        let category_records = parse_category_index(&body, &self.base_url)?;
        tracing::info!("Discovered {} categories", category_records.len());

        let existing_products = existing.products_by_id();

        let mut categories: Vec<Category> = Vec::new();
        let mut products: Vec<Product> = Vec::new();
        let mut product_index: HashMap<String, usize> = HashMap::new();

        for record in &category_records {
            let parent = self
                .crawl_category(
                    record,
                    &mut fetcher,
                    &existing_products,
                    &mut products,
                    &mut product_index,
                    warnings,
                )
                .await?;

            categories.push(Category {
                id: record.id.clone(),
                name: record.name.clone(),
                url: record.url.clone(),
                parent,
                children: Vec::new(),
            });
        }

        tracing::info!(
            "Crawl complete: {} products across {} categories",
            products.len(),
            categories.len()
        );

        Ok(FreshCatalog {
            categories,
            products,
        })
    }

    /// Crawls one category's listing pages; returns its breadcrumb parent
    async fn crawl_category(
        &self,
        record: &CategoryRecord,
        fetcher: &mut Fetcher,
        existing_products: &HashMap<&str, &Product>,
        products: &mut Vec<Product>,
        product_index: &mut HashMap<String, usize>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<String>, MirrorError> {
        tracing::debug!("Crawling category {} ({})", record.name, record.id);

        let mut parent: Option<String> = None;
        let mut page_url = record.url.clone();
        let mut visited: HashSet<String> = HashSet::new();
        let mut page_count = 0u32;

        loop {
            // A next-page link pointing at a page we already fetched means
            // the pagination markup is lying; stop here.
            if !visited.insert(page_url.clone()) {
                warnings.push(format!(
                    "pagination loop at {} in category {}",
                    page_url, record.id
                ));
                break;
            }

            page_count += 1;
            if page_count > self.config.sync.max_listing_pages {
                warnings.push(format!(
                    "category {} exceeded {} listing pages, truncating",
                    record.id, self.config.sync.max_listing_pages
                ));
                break;
            }

            let body = fetcher.fetch_page(&page_url).await?;
            let listing = parse_product_listing(&body, &self.base_url)?;
            warnings.extend(listing.warnings);

            if parent.is_none() {
                parent = listing
                    .breadcrumb_trail
                    .iter()
                    .rev()
                    .find(|id| **id != record.id)
                    .cloned();
            }

            // An empty page signals the end of pagination.
            if listing.products.is_empty() {
                break;
            }

            for product_record in listing.products {
                self.ingest_product(
                    product_record,
                    &record.id,
                    fetcher,
                    existing_products,
                    products,
                    product_index,
                    warnings,
                )
                .await?;
            }

            match listing.next_page {
                Some(next) => page_url = next,
                None => break,
            }
        }

        Ok(parent)
    }

    /// Turns one listing record into a catalog product, fetching its detail
    /// page when the product is new or changed
    #[allow(clippy::too_many_arguments)]
    async fn ingest_product(
        &self,
        record: ProductRecord,
        category_id: &str,
        fetcher: &mut Fetcher,
        existing_products: &HashMap<&str, &Product>,
        products: &mut Vec<Product>,
        product_index: &mut HashMap<String, usize>,
        warnings: &mut Vec<String>,
    ) -> Result<(), MirrorError> {
        let mut product = Product {
            id: record.id,
            name: record.name,
            description: None,
            reference_code: record.reference_code,
            price: record.price,
            category_id: category_id.to_string(),
            image_url: record.image_url,
            image_path: None,
            source_url: record.source_url,
            last_seen: Utc::now(),
        };

        // The same product shows up under both a category and its parent.
        // Keep the first occurrence; only a conflicting duplicate goes
        // through to reconciliation, which records the collision.
        if let Some(&index) = product_index.get(&product.id) {
            if !product.differs_on_listing(&products[index]) {
                tracing::debug!(
                    "Product {} already seen under category {}",
                    product.id,
                    products[index].category_id
                );
                return Ok(());
            }
        }

        match existing_products.get(product.id.as_str()) {
            Some(prev) if !product.differs_on_listing(prev) => {
                // Unchanged on the listing: reuse what the detail page gave
                // us last time instead of re-fetching it.
                if product.image_url.is_none() {
                    product.image_url = prev.image_url.clone();
                }
                if product.reference_code.is_none() {
                    product.reference_code = prev.reference_code.clone();
                }
            }
            _ => {
                self.enrich_from_detail(&mut product, fetcher, warnings)
                    .await?;
            }
        }

        if !product_index.contains_key(&product.id) {
            product_index.insert(product.id.clone(), products.len());
        }
        products.push(product);

        Ok(())
    }

    /// Fetches and applies the product detail page
    ///
    /// A 404 (the product vanished between listing and detail) and an
    /// unusable detail layout degrade to warnings; the listing record
    /// stands on its own. Transport failures remain fatal.
    async fn enrich_from_detail(
        &self,
        product: &mut Product,
        fetcher: &mut Fetcher,
        warnings: &mut Vec<String>,
    ) -> Result<(), MirrorError> {
        let body = match fetcher.fetch_page(&product.source_url).await {
            Ok(body) => body,
            Err(FetchError::Status { status: 404, url }) => {
                warnings.push(format!("detail page for product {} returned 404 ({})", product.id, url));
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match parse_product_detail(&body, &self.base_url) {
            Ok(detail) => {
                product.description = detail.description;
                if product.image_url.is_none() {
                    product.image_url = detail.image_url;
                }
                if product.reference_code.is_none() {
                    product.reference_code = detail.reference_code;
                }
            }
            Err(e) => {
                warnings.push(format!("detail page for product {} unusable: {}", product.id, e));
            }
        }

        Ok(())
    }
}

/// RAII guard for the single-writer flag
///
/// Dropping the guard releases the flag, so the service returns to Idle on
/// every exit path, panics included.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
