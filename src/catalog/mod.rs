//! Catalog model, reconciliation, and persistence
//!
//! The catalog is the locally persisted snapshot of the storefront:
//! categories, products, and metadata about the sync that produced it.

pub mod reconcile;
pub mod store;
mod types;

pub use reconcile::{reconcile, FreshCatalog, ReconcileOutcome};
pub use store::StoreError;
pub use types::{
    Catalog, CatalogMetadata, Category, Product, SyncCounts, SyncOutcome, SyncRun,
};
