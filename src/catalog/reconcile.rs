//! Catalog reconciliation
//!
//! Merges the records of one fully completed crawl into the existing
//! catalog, classifying every product as added, updated, unchanged, or
//! removed. The category forest is rebuilt from scratch on every call so a
//! restructuring on the source site never leaves stale parent/child links.
//!
//! Reconciliation is pure: it never touches the network or the filesystem,
//! and removal decisions are only valid because callers hand it complete
//! crawls (a partial crawl is abandoned before reconciliation).

use crate::catalog::types::{Catalog, Category, Product, SyncCounts};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Records produced by one fully completed crawl
#[derive(Debug, Clone, Default)]
pub struct FreshCatalog {
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
}

/// Result of merging a fresh crawl into an existing catalog
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub catalog: Catalog,
    pub counts: SyncCounts,
    pub warnings: Vec<String>,
}

/// Merges fresh crawl records into the existing catalog
///
/// # Arguments
///
/// * `existing` - The catalog from the previous successful sync
/// * `fresh` - Records from a fully completed crawl, in fetch order
/// * `now` - Timestamp stamped onto every retained product's `last_seen`
///
/// # Returns
///
/// The reconciled catalog, the add/update/remove counts, and any warnings
/// (duplicate id collisions, dropped records).
pub fn reconcile(existing: &Catalog, fresh: FreshCatalog, now: DateTime<Utc>) -> ReconcileOutcome {
    let mut warnings = Vec::new();

    let categories = rebuild_category_forest(fresh.categories, &mut warnings);
    let category_ids: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();

    let fresh_products = dedupe_products(fresh.products, &mut warnings);

    let existing_products = existing.products_by_id();
    let mut counts = SyncCounts {
        categories: categories.len() as u64,
        ..SyncCounts::default()
    };

    let mut products = Vec::with_capacity(fresh_products.len());
    for mut product in fresh_products {
        // A product whose category vanished from the crawl cannot be reached
        // from any category view; drop it rather than persist a dangling
        // reference.
        if !category_ids.contains(product.category_id.as_str()) {
            warnings.push(format!(
                "product {} references unknown category {}, dropped",
                product.id, product.category_id
            ));
            continue;
        }

        product.last_seen = now;

        match existing_products.get(product.id.as_str()) {
            None => {
                counts.added += 1;
            }
            Some(prev) => {
                carry_local_state(&mut product, prev);
                if record_fields_match(&product, prev) {
                    counts.unchanged += 1;
                } else {
                    counts.updated += 1;
                }
            }
        }

        products.push(product);
    }

    let fresh_ids: HashSet<&str> = products.iter().map(|p| p.id.as_str()).collect();
    counts.removed = existing
        .products
        .iter()
        .filter(|p| !fresh_ids.contains(p.id.as_str()))
        .count() as u64;

    let mut catalog = Catalog {
        categories,
        products,
        metadata: existing.metadata.clone(),
    };
    catalog.refresh_counts();

    ReconcileOutcome {
        catalog,
        counts,
        warnings,
    }
}

/// Deduplicates categories, rebuilds parent/child links, and breaks cycles
///
/// Parent references to categories missing from this crawl are cleared, and
/// any parent chain that loops back on itself is cut at the entry point.
/// Children lists are rebuilt in fetch order.
fn rebuild_category_forest(
    fresh: Vec<Category>,
    warnings: &mut Vec<String>,
) -> Vec<Category> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Category> = HashMap::new();

    for category in fresh {
        if let Some(prev) = by_id.get(&category.id) {
            if *prev != category {
                warnings.push(format!(
                    "duplicate category id {}, keeping the later record",
                    category.id
                ));
            }
            by_id.insert(category.id.clone(), category);
        } else {
            order.push(category.id.clone());
            by_id.insert(category.id.clone(), category);
        }
    }

    // Clear parents that do not resolve within this crawl.
    let known: HashSet<String> = order.iter().cloned().collect();
    for category in by_id.values_mut() {
        category.children.clear();
        if let Some(parent) = &category.parent {
            if !known.contains(parent) {
                warnings.push(format!(
                    "category {} references unknown parent {}, treating as root",
                    category.id, parent
                ));
                category.parent = None;
            } else if *parent == category.id {
                warnings.push(format!(
                    "category {} lists itself as parent, treating as root",
                    category.id
                ));
                category.parent = None;
            }
        }
    }

    // Cut any remaining parent cycle at the category where it was entered.
    for id in &order {
        let mut seen = HashSet::new();
        let mut current = id.clone();
        while let Some(parent) = by_id.get(&current).and_then(|c| c.parent.clone()) {
            if !seen.insert(current.clone()) {
                warnings.push(format!(
                    "category parent cycle involving {}, treating as root",
                    id
                ));
                if let Some(category) = by_id.get_mut(id) {
                    category.parent = None;
                }
                break;
            }
            current = parent;
        }
    }

    // Rebuild children lists in fetch order.
    for id in &order {
        if let Some(parent) = by_id.get(id).and_then(|c| c.parent.clone()) {
            if let Some(parent_category) = by_id.get_mut(&parent) {
                parent_category.children.push(id.clone());
            }
        }
    }

    order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect()
}

/// Deduplicates products by id; the later record in fetch order wins
fn dedupe_products(fresh: Vec<Product>, warnings: &mut Vec<String>) -> Vec<Product> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Product> = HashMap::new();

    for product in fresh {
        if by_id.contains_key(&product.id) {
            warnings.push(format!(
                "duplicate product id {}, keeping the later record",
                product.id
            ));
        } else {
            order.push(product.id.clone());
        }
        by_id.insert(product.id.clone(), product);
    }

    order
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect()
}

/// Carries local-only and detail-only state from the previous record
///
/// The crawl does not re-fetch detail pages for unchanged products, so a
/// fresh record may lack a description the catalog already has. The local
/// image path survives as long as the remote image URL did not change.
fn carry_local_state(product: &mut Product, prev: &Product) {
    if product.description.is_none() {
        product.description = prev.description.clone();
    }
    if product.image_url == prev.image_url {
        if product.image_path.is_none() {
            product.image_path = prev.image_path.clone();
        }
    } else {
        product.image_path = None;
    }
}

/// Field comparison used to classify updated vs unchanged
///
/// `last_seen` and `image_path` are local bookkeeping and never count as a
/// source change.
fn record_fields_match(a: &Product, b: &Product) -> bool {
    a.name == b.name
        && a.description == b.description
        && a.reference_code == b.reference_code
        && a.price == b.price
        && a.category_id == b.category_id
        && a.image_url == b.image_url
        && a.source_url == b.source_url
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn category(id: &str, parent: Option<&str>) -> Category {
        Category {
            id: id.to_string(),
            name: format!("Category {}", id),
            url: format!("https://shop.test/shop/category/c-{}", id),
            parent: parent.map(|p| p.to_string()),
            children: Vec::new(),
        }
    }

    fn product(id: &str, category_id: &str, price: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            description: None,
            reference_code: None,
            price: BigDecimal::from_str(price).unwrap(),
            category_id: category_id.to_string(),
            image_url: Some(format!("https://shop.test/web/image/{}", id)),
            image_path: None,
            source_url: format!("https://shop.test/shop/p-{}", id),
            last_seen: Utc::now(),
        }
    }

    fn catalog_with(products: Vec<Product>, categories: Vec<Category>) -> Catalog {
        let mut catalog = Catalog {
            categories,
            products,
            metadata: Default::default(),
        };
        catalog.refresh_counts();
        catalog
    }

    #[test]
    fn test_add_update_remove_counts() {
        // Existing {A, B, C}; fresh crawl yields {A with new price, C, D}.
        let existing = catalog_with(
            vec![
                product("a", "1", "10.00"),
                product("b", "1", "20.00"),
                product("c", "1", "30.00"),
            ],
            vec![category("1", None)],
        );

        let fresh = FreshCatalog {
            categories: vec![category("1", None)],
            products: vec![
                product("a", "1", "12.50"),
                product("c", "1", "30.00"),
                product("d", "1", "40.00"),
            ],
        };

        let outcome = reconcile(&existing, fresh, Utc::now());

        assert_eq!(outcome.counts.added, 1);
        assert_eq!(outcome.counts.updated, 1);
        assert_eq!(outcome.counts.removed, 1);
        assert_eq!(outcome.counts.unchanged, 1);

        let ids: Vec<&str> = outcome.catalog.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_second_pass_is_no_op() {
        let existing = catalog_with(
            vec![product("a", "1", "10.00")],
            vec![category("1", None)],
        );

        let fresh = FreshCatalog {
            categories: vec![category("1", None)],
            products: vec![product("a", "1", "10.00")],
        };

        let first = reconcile(&existing, fresh.clone(), Utc::now());
        let second = reconcile(&first.catalog, fresh, Utc::now());

        assert!(second.counts.is_no_op());
        assert_eq!(second.counts.unchanged, 1);
    }

    #[test]
    fn test_duplicate_product_id_later_wins_with_warning() {
        let existing = Catalog::default();
        let fresh = FreshCatalog {
            categories: vec![category("1", None)],
            products: vec![product("a", "1", "10.00"), product("a", "1", "99.00")],
        };

        let outcome = reconcile(&existing, fresh, Utc::now());

        assert_eq!(outcome.catalog.products.len(), 1);
        assert_eq!(
            outcome.catalog.products[0].price,
            BigDecimal::from_str("99.00").unwrap()
        );
        assert!(outcome.warnings.iter().any(|w| w.contains("duplicate product id a")));
    }

    #[test]
    fn test_product_with_unknown_category_dropped() {
        let existing = Catalog::default();
        let fresh = FreshCatalog {
            categories: vec![category("1", None)],
            products: vec![product("a", "1", "10.00"), product("b", "404", "20.00")],
        };

        let outcome = reconcile(&existing, fresh, Utc::now());

        assert_eq!(outcome.catalog.products.len(), 1);
        assert!(outcome.warnings.iter().any(|w| w.contains("unknown category 404")));

        // Referential integrity holds for everything that was kept.
        let categories = outcome.catalog.categories_by_id();
        for p in &outcome.catalog.products {
            assert!(categories.contains_key(p.category_id.as_str()));
        }
    }

    #[test]
    fn test_category_forest_rebuilt() {
        let existing = catalog_with(
            Vec::new(),
            vec![category("1", None), category("2", Some("1"))],
        );

        // The source restructured: 2 became a root, 3 is a new child of 2.
        let fresh = FreshCatalog {
            categories: vec![
                category("2", None),
                category("3", Some("2")),
            ],
            products: Vec::new(),
        };

        let outcome = reconcile(&existing, fresh, Utc::now());
        let by_id = outcome.catalog.categories_by_id();

        assert_eq!(by_id["2"].parent, None);
        assert_eq!(by_id["2"].children, vec!["3".to_string()]);
        assert_eq!(by_id["3"].parent.as_deref(), Some("2"));
        assert!(!by_id.contains_key("1"));
    }

    #[test]
    fn test_unknown_parent_cleared() {
        let fresh = FreshCatalog {
            categories: vec![category("5", Some("999"))],
            products: Vec::new(),
        };

        let outcome = reconcile(&Catalog::default(), fresh, Utc::now());

        assert_eq!(outcome.catalog.categories[0].parent, None);
        assert!(outcome.warnings.iter().any(|w| w.contains("unknown parent 999")));
    }

    #[test]
    fn test_parent_cycle_broken() {
        let fresh = FreshCatalog {
            categories: vec![category("1", Some("2")), category("2", Some("1"))],
            products: Vec::new(),
        };

        let outcome = reconcile(&Catalog::default(), fresh, Utc::now());

        let roots = outcome
            .catalog
            .categories
            .iter()
            .filter(|c| c.parent.is_none())
            .count();
        assert!(roots >= 1);
        assert!(outcome.warnings.iter().any(|w| w.contains("cycle")));
    }

    #[test]
    fn test_image_path_carried_when_url_unchanged() {
        let mut prev = product("a", "1", "10.00");
        prev.image_path = Some("abc123.jpg".to_string());
        prev.description = Some("kept".to_string());
        let existing = catalog_with(vec![prev], vec![category("1", None)]);

        let fresh = FreshCatalog {
            categories: vec![category("1", None)],
            products: vec![product("a", "1", "10.00")],
        };

        let outcome = reconcile(&existing, fresh, Utc::now());
        let merged = &outcome.catalog.products[0];

        assert_eq!(merged.image_path.as_deref(), Some("abc123.jpg"));
        assert_eq!(merged.description.as_deref(), Some("kept"));
        assert_eq!(outcome.counts.unchanged, 1);
    }

    #[test]
    fn test_image_path_reset_when_url_changed() {
        let mut prev = product("a", "1", "10.00");
        prev.image_path = Some("abc123.jpg".to_string());
        let existing = catalog_with(vec![prev], vec![category("1", None)]);

        let mut changed = product("a", "1", "10.00");
        changed.image_url = Some("https://shop.test/web/image/new".to_string());
        let fresh = FreshCatalog {
            categories: vec![category("1", None)],
            products: vec![changed],
        };

        let outcome = reconcile(&existing, fresh, Utc::now());
        let merged = &outcome.catalog.products[0];

        assert_eq!(merged.image_path, None);
        assert_eq!(outcome.counts.updated, 1);
    }

    #[test]
    fn test_empty_crawl_removes_everything() {
        let existing = catalog_with(
            vec![product("a", "1", "10.00")],
            vec![category("1", None)],
        );

        let outcome = reconcile(&existing, FreshCatalog::default(), Utc::now());

        assert_eq!(outcome.counts.removed, 1);
        assert!(outcome.catalog.products.is_empty());
        assert_eq!(outcome.catalog.metadata.product_count, 0);
    }
}
