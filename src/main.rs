//! Catalog-mirror main entry point
//!
//! This is the command-line interface for the storefront catalog mirror.

use anyhow::Context;
use catalog_mirror::catalog::store;
use catalog_mirror::config::{load_config_with_hash, Config};
use catalog_mirror::sync::{run_scheduler, SyncAttempt, SyncService};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Catalog-Mirror: a read-only storefront mirror
///
/// Periodically scrapes a storefront's public pages and maintains a local
/// catalog snapshot (categories, products, images) for the serving layer.
#[derive(Parser, Debug)]
#[command(name = "catalog-mirror")]
#[command(version = "1.0.0")]
#[command(about = "Mirrors a storefront catalog by scraping its public pages", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; environment overrides
    /// (MIRROR_SHOP_URL, MIRROR_SYNC_INTERVAL_HOURS, PORT) apply on top
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run a single sync and exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    once: bool,

    /// Show statistics from the persisted catalog and exit
    #[arg(long, conflicts_with_all = ["once", "dry_run"])]
    stats: bool,

    /// Validate config and show what would be synced without syncing
    #[arg(long, conflicts_with_all = ["once", "stats"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = load_config_with_hash(cli.config.as_deref())
        .context("Failed to load configuration")?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        Ok(())
    } else if cli.stats {
        handle_stats(&config);
        Ok(())
    } else if cli.once {
        handle_once(config).await
    } else {
        handle_daemon(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_mirror=info,warn"),
            1 => EnvFilter::new("catalog_mirror=debug,info"),
            2 => EnvFilter::new("catalog_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the sync plan
fn handle_dry_run(config: &Config) {
    println!("=== Catalog-Mirror Dry Run ===\n");

    println!("Storefront:");
    println!("  Base URL: {}", config.storefront.base_url);
    println!("  Shop path: {}", config.storefront.shop_path);

    println!("\nFetching:");
    println!("  Request delay: {}ms", config.fetch.request_delay_ms);
    println!("  Max retries: {}", config.fetch.max_retries);
    println!("  Timeout: {}s", config.fetch.timeout_secs);

    println!("\nSync:");
    println!("  Interval: every {} hours", config.sync.interval_hours);
    println!("  Listing page cap: {}", config.sync.max_listing_pages);
    println!("  Image concurrency: {}", config.sync.image_concurrency);

    println!("\nOutput:");
    println!("  Catalog: {}", config.output.catalog_path);
    println!("  Images: {}", config.output.images_dir);

    println!("\nServing layer:");
    println!("  Port: {}", config.server.port);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the persisted catalog
fn handle_stats(config: &Config) {
    let path = Path::new(&config.output.catalog_path);
    println!("Catalog: {}\n", path.display());

    let catalog = store::load_or_default(path);

    println!("Products:   {}", catalog.metadata.product_count);
    println!("Categories: {}", catalog.metadata.category_count);

    match &catalog.metadata.last_run {
        Some(run) => {
            println!("Last sync:  {} ({})", run.started_at.to_rfc3339(), run.outcome);
            println!(
                "            {} added, {} updated, {} removed",
                run.counts.added, run.counts.updated, run.counts.removed
            );
            if !run.warnings.is_empty() {
                println!("Warnings:   {}", run.warnings.len());
                for warning in &run.warnings {
                    println!("  - {}", warning);
                }
            }
        }
        None => println!("Last sync:  never"),
    }
}

/// Handles the --once mode: one sync, exit status reflects the outcome
async fn handle_once(config: Config) -> anyhow::Result<()> {
    let service = SyncService::new(config).context("Failed to initialize sync service")?;

    match service.sync_once().await {
        SyncAttempt::Completed(run) => {
            if run.outcome.persisted() {
                println!(
                    "Sync {}: {} added, {} updated, {} removed ({} warnings)",
                    run.outcome,
                    run.counts.added,
                    run.counts.updated,
                    run.counts.removed,
                    run.warnings.len()
                );
                Ok(())
            } else {
                anyhow::bail!(
                    "sync failed: {}",
                    run.error.unwrap_or_else(|| "unknown error".to_string())
                )
            }
        }
        SyncAttempt::AlreadyRunning => anyhow::bail!("a sync is already in progress"),
    }
}

/// Handles the default daemon mode: startup sync, then timer-driven syncs
async fn handle_daemon(config: Config) -> anyhow::Result<()> {
    let interval = Duration::from_secs(config.sync.interval_hours * 3600);
    let service =
        Arc::new(SyncService::new(config).context("Failed to initialize sync service")?);

    tokio::select! {
        _ = run_scheduler(service.clone(), interval) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown requested, last persisted catalog remains intact");
        }
    }

    Ok(())
}
