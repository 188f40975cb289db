//! End-to-end sync tests
//!
//! These tests run the full pipeline against a wiremock storefront:
//! category discovery, paginated listings, detail enrichment, image
//! materialization, reconciliation, and atomic persistence.

use catalog_mirror::assets::ensure_image;
use catalog_mirror::catalog::store;
use catalog_mirror::config::Config;
use catalog_mirror::scrape::{build_http_client, Fetcher};
use catalog_mirror::sync::{SyncAttempt, SyncService};
use catalog_mirror::{SyncOutcome, SyncRun};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.storefront.base_url = base_url.to_string();
    config.storefront.shop_path = "/shop".to_string();
    config.fetch.request_delay_ms = 10;
    config.fetch.max_retries = 1;
    config.fetch.retry_backoff_ms = 10;
    config.fetch.timeout_secs = 5;
    config.sync.max_listing_pages = 10;
    config.sync.image_concurrency = 2;
    config.output.catalog_path = dir.join("catalog.json").to_string_lossy().into_owned();
    config.output.images_dir = dir.join("images").to_string_lossy().into_owned();
    config
}

fn html_response(body: String) -> ResponseTemplate {
    // `set_body_string` would pin the mime to text/plain (applied after any
    // inserted header), which the fetcher rejects as non-HTML. `set_body_raw`
    // sets the body and the text/html mime together.
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

fn shop_index() -> String {
    r#"<html><body>
    <aside class="o_wsale_categories">
        <a href="/shop/category/tools-2">Tools</a>
        <a href="/shop/category/hand-tools-3">Hand Tools</a>
    </aside>
    <div id="products_grid"></div>
    </body></html>"#
        .to_string()
}

fn product_card(slug: &str, name: &str, price: &str, image_id: &str) -> String {
    format!(
        r#"<div class="oe_product">
            <a href="/shop/{slug}"><h6>{name}</h6></a>
            <span class="oe_currency_value">{price}</span>
            <img src="/web/image/{image_id}" alt="{name}">
        </div>"#
    )
}

fn listing_page(breadcrumb: &[(&str, &str)], cards: &str, next: Option<&str>) -> String {
    let breadcrumb_links: String = breadcrumb
        .iter()
        .map(|(href, label)| format!(r#"<a href="{}">{}</a>"#, href, label))
        .collect();
    let next_link = next
        .map(|href| format!(r#"<a class="page-link" rel="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();

    format!(
        r#"<html><body>
        <nav aria-label="breadcrumb">{breadcrumb_links}</nav>
        <div id="products_grid">{cards}</div>
        {next_link}
        </body></html>"#
    )
}

fn detail_page(name: &str, description: &str) -> String {
    format!(
        r#"<html><body>
        <div id="product_detail">
            <h1>{name}</h1>
            <div id="product_full_description">{description}</div>
        </div>
        </body></html>"#
    )
}

async fn mount_listing(
    server: &MockServer,
    url_path: &str,
    breadcrumb: &[(&str, &str)],
    cards: &str,
) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(html_response(listing_page(breadcrumb, cards, None)))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, url_path: &str, name: &str, description: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(html_response(detail_page(name, description)))
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, image_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/web/image/{}", image_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"fake jpeg bytes".to_vec())
                .insert_header("content-type", "image/jpeg"),
        )
        .mount(server)
        .await;
}

/// Mounts the standard three-product storefront
///
/// Tools (id 2) holds a hammer and a wrench; Hand Tools (id 3, child of 2)
/// holds pliers.
async fn mount_standard_shop(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(shop_index()))
        .mount(server)
        .await;

    let tools_cards = format!(
        "{}{}",
        product_card("claw-hammer-101", "Claw Hammer", "12.50", "101"),
        product_card("pipe-wrench-102", "Pipe Wrench", "24.00", "102"),
    );
    mount_listing(
        server,
        "/shop/category/tools-2",
        &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
        &tools_cards,
    )
    .await;

    let hand_tools_cards = product_card("pliers-103", "Pliers", "8.75", "103");
    mount_listing(
        server,
        "/shop/category/hand-tools-3",
        &[
            ("/", "Home"),
            ("/shop/category/tools-2", "Tools"),
            ("/shop/category/hand-tools-3", "Hand Tools"),
        ],
        &hand_tools_cards,
    )
    .await;

    mount_detail(server, "/shop/claw-hammer-101", "Claw Hammer", "Forged steel head.").await;
    mount_detail(server, "/shop/pipe-wrench-102", "Pipe Wrench", "Adjustable jaw.").await;
    mount_detail(server, "/shop/pliers-103", "Pliers", "Insulated grip.").await;

    mount_image(server, "101").await;
    mount_image(server, "102").await;
    mount_image(server, "103").await;
}

fn completed(attempt: SyncAttempt) -> SyncRun {
    match attempt {
        SyncAttempt::Completed(run) => run,
        SyncAttempt::AlreadyRunning => panic!("sync was unexpectedly rejected"),
    }
}

#[tokio::test]
async fn test_full_sync_builds_catalog() {
    let server = MockServer::start().await;
    mount_standard_shop(&server).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let run = completed(service.sync_once().await);

    assert_eq!(run.outcome, SyncOutcome::Success, "warnings: {:?}", run.warnings);
    assert_eq!(run.counts.added, 3);
    assert_eq!(run.counts.removed, 0);
    assert_eq!(run.counts.categories, 2);

    let catalog = store::load_or_default(&dir.path().join("catalog.json"));
    assert_eq!(catalog.metadata.product_count, 3);
    assert_eq!(catalog.metadata.category_count, 2);
    assert_eq!(catalog.metadata.last_outcome(), Some(SyncOutcome::Success));

    // Category forest: Hand Tools hangs off Tools.
    let categories = catalog.categories_by_id();
    assert_eq!(categories["2"].parent, None);
    assert_eq!(categories["2"].children, vec!["3".to_string()]);
    assert_eq!(categories["3"].parent.as_deref(), Some("2"));

    // Referential integrity: every product resolves to a known category.
    for product in &catalog.products {
        assert!(
            categories.contains_key(product.category_id.as_str()),
            "product {} references unknown category {}",
            product.id,
            product.category_id
        );
    }

    // Detail enrichment and image materialization happened.
    let products = catalog.products_by_id();
    assert_eq!(
        products["101"].description.as_deref(),
        Some("Forged steel head.")
    );
    let image_file = products["101"].image_path.as_ref().unwrap();
    assert!(dir.path().join("images").join(image_file).exists());
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let server = MockServer::start().await;

    // Detail pages and images must be hit exactly once across both syncs:
    // nothing changed, so the second sync reuses stored detail fields and
    // cached image files.
    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(shop_index()))
        .expect(2)
        .mount(&server)
        .await;

    let tools_cards = product_card("claw-hammer-101", "Claw Hammer", "12.50", "101");
    Mock::given(method("GET"))
        .and(path("/shop/category/tools-2"))
        .respond_with(html_response(listing_page(
            &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
            &tools_cards,
            None,
        )))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/shop/category/hand-tools-3"))
        .respond_with(html_response(listing_page(
            &[
                ("/", "Home"),
                ("/shop/category/tools-2", "Tools"),
                ("/shop/category/hand-tools-3", "Hand Tools"),
            ],
            "",
            None,
        )))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/shop/claw-hammer-101"))
        .respond_with(html_response(detail_page("Claw Hammer", "Forged steel head.")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/web/image/101"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"fake jpeg bytes".to_vec())
                .insert_header("content-type", "image/jpeg"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let first = completed(service.sync_once().await);
    assert_eq!(first.outcome, SyncOutcome::Success, "warnings: {:?}", first.warnings);
    assert_eq!(first.counts.added, 1);

    let second = completed(service.sync_once().await);
    assert_eq!(second.outcome, SyncOutcome::Success, "warnings: {:?}", second.warnings);
    assert_eq!(second.counts.added, 0);
    assert_eq!(second.counts.updated, 0);
    assert_eq!(second.counts.removed, 0);
    assert_eq!(second.counts.unchanged, 1);

    // Detail fields survived the no-op sync.
    let catalog = store::load_or_default(&dir.path().join("catalog.json"));
    assert_eq!(
        catalog.products_by_id()["101"].description.as_deref(),
        Some("Forged steel head.")
    );
}

#[tokio::test]
async fn test_changed_storefront_reconciled() {
    let server = MockServer::start().await;
    mount_standard_shop(&server).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let first = completed(service.sync_once().await);
    assert_eq!(first.counts.added, 3);

    // The storefront changes: hammer price goes up, the wrench disappears,
    // a drill shows up.
    server.reset().await;

    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(shop_index()))
        .mount(&server)
        .await;

    let tools_cards = format!(
        "{}{}",
        product_card("claw-hammer-101", "Claw Hammer", "14.00", "101"),
        product_card("drill-104", "Power Drill", "89.00", "104"),
    );
    mount_listing(
        &server,
        "/shop/category/tools-2",
        &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
        &tools_cards,
    )
    .await;

    let hand_tools_cards = product_card("pliers-103", "Pliers", "8.75", "103");
    mount_listing(
        &server,
        "/shop/category/hand-tools-3",
        &[
            ("/", "Home"),
            ("/shop/category/tools-2", "Tools"),
            ("/shop/category/hand-tools-3", "Hand Tools"),
        ],
        &hand_tools_cards,
    )
    .await;

    mount_detail(&server, "/shop/claw-hammer-101", "Claw Hammer", "Forged steel head.").await;
    mount_detail(&server, "/shop/drill-104", "Power Drill", "Brushless motor.").await;
    mount_image(&server, "104").await;

    let second = completed(service.sync_once().await);

    assert_eq!(second.outcome, SyncOutcome::Success, "warnings: {:?}", second.warnings);
    assert_eq!(second.counts.added, 1);
    assert_eq!(second.counts.updated, 1);
    assert_eq!(second.counts.removed, 1);
    assert_eq!(second.counts.unchanged, 1);

    let catalog = store::load_or_default(&dir.path().join("catalog.json"));
    let products = catalog.products_by_id();
    assert!(products.contains_key("104"));
    assert!(!products.contains_key("102"));
    assert_eq!(products["101"].price.to_string(), "14.00");
}

#[tokio::test]
async fn test_interrupted_crawl_leaves_catalog_untouched() {
    let server = MockServer::start().await;
    mount_standard_shop(&server).await;

    let dir = TempDir::new().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let first = completed(service.sync_once().await);
    assert!(first.outcome.persisted());
    let bytes_before = std::fs::read(&catalog_path).unwrap();

    // Second crawl dies on the second category: the index and the first
    // category still respond, then the server starts failing hard.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(shop_index()))
        .mount(&server)
        .await;
    let tools_cards = format!(
        "{}{}",
        product_card("claw-hammer-101", "Claw Hammer", "12.50", "101"),
        product_card("pipe-wrench-102", "Pipe Wrench", "24.00", "102"),
    );
    mount_listing(
        &server,
        "/shop/category/tools-2",
        &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
        &tools_cards,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/shop/category/hand-tools-3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let second = completed(service.sync_once().await);

    assert_eq!(second.outcome, SyncOutcome::Failed);
    assert!(second.error.as_ref().unwrap().contains("giving up"));

    let bytes_after = std::fs::read(&catalog_path).unwrap();
    assert_eq!(bytes_before, bytes_after);
}

#[tokio::test]
async fn test_first_sync_failure_persists_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(shop_index()))
        .mount(&server)
        .await;

    // Category pages 404: a non-transient failure, no retries.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let run = completed(service.sync_once().await);

    assert_eq!(run.outcome, SyncOutcome::Failed);
    assert!(run.error.as_ref().unwrap().contains("404"));
    assert!(!dir.path().join("catalog.json").exists());
}

#[tokio::test]
async fn test_concurrent_trigger_rejected() {
    let server = MockServer::start().await;

    // Slow index page keeps the first sync busy long enough to race it.
    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(shop_index()).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let tools_cards = product_card("claw-hammer-101", "Claw Hammer", "12.50", "101");
    mount_listing(
        &server,
        "/shop/category/tools-2",
        &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
        &tools_cards,
    )
    .await;
    mount_listing(
        &server,
        "/shop/category/hand-tools-3",
        &[
            ("/", "Home"),
            ("/shop/category/tools-2", "Tools"),
            ("/shop/category/hand-tools-3", "Hand Tools"),
        ],
        "",
    )
    .await;
    mount_detail(&server, "/shop/claw-hammer-101", "Claw Hammer", "Forged steel head.").await;
    mount_image(&server, "101").await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = Arc::new(SyncService::new(config).unwrap());

    let background = {
        let service = service.clone();
        tokio::spawn(async move { service.sync_once().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.is_running());

    let rejected = service.sync_once().await;
    assert_eq!(rejected, SyncAttempt::AlreadyRunning);

    let first = completed(background.await.unwrap());
    assert!(first.outcome.persisted(), "error: {:?}", first.error);

    // The rejected trigger started nothing and recorded nothing.
    assert_eq!(service.last_run(), Some(first));
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_pagination_followed_to_the_end() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(
            r#"<html><body>
            <aside><a href="/shop/category/tools-2">Tools</a></aside>
            <div id="products_grid"></div>
            </body></html>"#
                .to_string(),
        ))
        .mount(&server)
        .await;

    // Page 2 is mounted first: it carries the more specific matcher.
    Mock::given(method("GET"))
        .and(path("/shop/category/tools-2"))
        .and(query_param("page", "2"))
        .respond_with(html_response(listing_page(
            &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
            &product_card("pipe-wrench-102", "Pipe Wrench", "24.00", "102"),
            None,
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/shop/category/tools-2"))
        .respond_with(html_response(listing_page(
            &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
            &product_card("claw-hammer-101", "Claw Hammer", "12.50", "101"),
            Some("/shop/category/tools-2?page=2"),
        )))
        .mount(&server)
        .await;

    mount_detail(&server, "/shop/claw-hammer-101", "Claw Hammer", "Forged steel head.").await;
    mount_detail(&server, "/shop/pipe-wrench-102", "Pipe Wrench", "Adjustable jaw.").await;
    mount_image(&server, "101").await;
    mount_image(&server, "102").await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let run = completed(service.sync_once().await);

    assert_eq!(run.outcome, SyncOutcome::Success, "warnings: {:?}", run.warnings);
    assert_eq!(run.counts.added, 2);
}

#[tokio::test]
async fn test_missing_detail_page_downgrades_to_partial() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response(
            r#"<html><body>
            <aside><a href="/shop/category/tools-2">Tools</a></aside>
            <div id="products_grid"></div>
            </body></html>"#
                .to_string(),
        ))
        .mount(&server)
        .await;

    mount_listing(
        &server,
        "/shop/category/tools-2",
        &[("/", "Home"), ("/shop/category/tools-2", "Tools")],
        &product_card("claw-hammer-101", "Claw Hammer", "12.50", "101"),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/shop/claw-hammer-101"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_image(&server, "101").await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let service = SyncService::new(config).unwrap();

    let run = completed(service.sync_once().await);

    // The product vanished between listing and detail; the listing record
    // still makes it into the catalog.
    assert_eq!(run.outcome, SyncOutcome::Partial);
    assert!(run.warnings.iter().any(|w| w.contains("404")));

    let catalog = store::load_or_default(&dir.path().join("catalog.json"));
    let products = catalog.products_by_id();
    assert_eq!(products["101"].description, None);
    assert_eq!(products["101"].name, "Claw Hammer");
}

#[tokio::test]
async fn test_fetcher_enforces_request_delay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shop"))
        .respond_with(html_response("<html><body>ok</body></html>".to_string()))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.fetch.request_delay_ms = 150;
    config.fetch.max_retries = 0;

    let mut fetcher = Fetcher::new(&config.fetch).unwrap();
    let url = format!("{}/shop", server.uri());

    let start = Instant::now();
    for _ in 0..3 {
        fetcher.fetch_page(&url).await.unwrap();
    }

    // Three consecutive requests require at least two full delays.
    assert!(
        start.elapsed() >= Duration::from_millis(300),
        "elapsed: {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_transient_failures_retried_then_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.fetch.request_delay_ms = 100;
    config.fetch.max_retries = 2;
    config.fetch.retry_backoff_ms = 10;

    let mut fetcher = Fetcher::new(&config.fetch).unwrap();
    let result = fetcher.fetch_page(&format!("{}/flaky", server.uri())).await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("giving up"));
    assert!(error.to_string().contains("503"));
}

#[tokio::test]
async fn test_image_download_is_idempotent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/web/image/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"fake png bytes".to_vec())
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = build_http_client(&Config::default().fetch).unwrap();
    let url = format!("{}/web/image/42", server.uri());

    let first = ensure_image(&client, dir.path(), &url).await.unwrap();
    assert!(first.ends_with(".png"));
    assert!(dir.path().join(&first).exists());

    // Second call must not hit the network; the expect(1) above verifies
    // that when the mock server shuts down.
    let second = ensure_image(&client, dir.path(), &url).await.unwrap();
    assert_eq!(first, second);
}
