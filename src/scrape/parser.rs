//! Storefront page parsing
//!
//! Extracts structured records from the storefront's HTML using structural
//! CSS selectors. Every selector that is specific to the source site lives
//! in this module; a site redesign is absorbed here and nowhere else.
//!
//! Extraction is deliberately tolerant: the markup varies between themes,
//! so each lookup tries a chain of selectors in order. A page is only
//! rejected outright when a required structural anchor (category
//! navigation, product grid, product container) is entirely absent. A
//! single malformed product card drops that one record with a warning and
//! the rest of the page is kept.

use bigdecimal::BigDecimal;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// The kinds of pages the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    CategoryIndex,
    ProductListing,
    ProductDetail,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CategoryIndex => "category index",
            Self::ProductListing => "product listing",
            Self::ProductDetail => "product detail",
        };
        f.write_str(name)
    }
}

/// Structural parse failures; fatal for the page
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{kind} page is missing its {anchor} anchor")]
    MissingAnchor {
        kind: PageKind,
        anchor: &'static str,
    },
}

/// A category discovered on the category index
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A product extracted from a listing card
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub price: BigDecimal,
    pub reference_code: Option<String>,
    pub image_url: Option<String>,
    pub source_url: String,
}

/// Everything extracted from one product listing page
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub products: Vec<ProductRecord>,

    /// Absolute URL of the next listing page, when pagination continues
    pub next_page: Option<String>,

    /// Category ids found in the breadcrumb, outermost first, excluding the
    /// home link
    pub breadcrumb_trail: Vec<String>,

    /// Reasons individual records were dropped
    pub warnings: Vec<String>,
}

/// Detail-page enrichment for a product already seen on a listing
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub reference_code: Option<String>,
}

const CATEGORY_HREF: &str = "/shop/category/";

// Selector chains, most specific theme first.
const CATEGORY_LINK_TIERS: &[&[&str]] = &[
    &[
        r#"aside a[href*="/shop/category/"]"#,
        r#".o_wsale_categories a[href*="/shop/category/"]"#,
    ],
    &[
        r#"nav a[href*="/shop/category/"]"#,
        r#".navbar a[href*="/shop/category/"]"#,
    ],
    &[r#"a[href*="/shop/category/"]"#],
];

const GRID_CONTAINERS: &[&str] = &[
    "#products_grid",
    ".o_wsale_products_grid_table_wrapper",
    ".oe_website_sale",
];

const PRODUCT_CARDS: &[&str] = &[
    ".oe_product",
    ".o_wsale_product_grid_wrapper .card",
    ".oe_product_cart",
    r#"[itemtype*="Product"]"#,
    ".o_wsale_products_grid_table_wrapper form",
];

const CARD_NAME: &str = r#".oe_product_name, h5, h6, .card-title, [itemprop="name"]"#;
const CARD_PRICE: &str = r#".oe_currency_value, [itemprop="price"], .product_price .oe_price"#;
const CARD_IMAGE: &str = r#"img[src*="/web/image"], img[data-src*="/web/image"]"#;
const CARD_CODE: &str = ".oe_product_code, .product_code, small";

const BREADCRUMB: &str = r#".breadcrumb a, nav[aria-label="breadcrumb"] a"#;
const NEXT_PAGE: &str = r#"a.page-link[rel="next"], .pagination .next a, a[aria-label="Next"]"#;

const DETAIL_CONTAINERS: &[&str] = &[
    "#product_detail",
    "#product_details",
    ".o_wsale_product_page",
    r#"[itemtype*="Product"]"#,
];

const DETAIL_DESCRIPTION: &str =
    r#"#product_full_description, .product_description, [itemprop="description"]"#;

/// Parses the category index (the shop landing page)
///
/// Category links are searched in tiers: the category sidebar, then the
/// navigation menus, then anywhere on the page. A page with no category
/// links at all is unusable as a crawl root and is a hard error.
pub fn parse_category_index(html: &str, base_url: &Url) -> Result<Vec<CategoryRecord>, ParseError> {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut categories = Vec::new();

    for tier in CATEGORY_LINK_TIERS {
        for selector_str in *tier {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            for element in document.select(&selector) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let Some(url) = resolve_url(href, base_url) else {
                    continue;
                };
                let name = element_text(&element);
                if name.is_empty() {
                    continue;
                }
                let Some(id) = derive_id(&url) else {
                    continue;
                };
                if seen.insert(id.clone()) {
                    categories.push(CategoryRecord { id, name, url });
                }
            }
        }
        if !categories.is_empty() {
            break;
        }
    }

    if categories.is_empty() {
        return Err(ParseError::MissingAnchor {
            kind: PageKind::CategoryIndex,
            anchor: "category navigation",
        });
    }

    Ok(categories)
}

/// Parses one product listing page
///
/// The product grid container is the structural anchor: a page with
/// neither a grid container nor any product card is a hard error, while a
/// present-but-empty grid is a normal end-of-pagination signal.
pub fn parse_product_listing(html: &str, base_url: &Url) -> Result<ListingPage, ParseError> {
    let document = Html::parse_document(html);

    let container_present = GRID_CONTAINERS.iter().any(|s| {
        Selector::parse(s)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false)
    });

    let mut cards: Vec<ElementRef> = Vec::new();
    for selector_str in PRODUCT_CARDS {
        if let Ok(selector) = Selector::parse(selector_str) {
            cards = document.select(&selector).collect();
            if !cards.is_empty() {
                break;
            }
        }
    }

    if cards.is_empty() && !container_present {
        return Err(ParseError::MissingAnchor {
            kind: PageKind::ProductListing,
            anchor: "product grid",
        });
    }

    let mut products = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();

    for card in cards {
        match extract_product_card(&card, base_url) {
            Ok(record) => {
                // Themes occasionally nest a matching element inside a card;
                // keep the first extraction per product URL.
                if seen.insert(record.id.clone()) {
                    products.push(record);
                }
            }
            Err(reason) => {
                tracing::warn!("Dropping product card: {}", reason);
                warnings.push(reason);
            }
        }
    }

    let breadcrumb_trail = extract_breadcrumb_trail(&document, base_url);
    let next_page = extract_next_page(&document, base_url);

    Ok(ListingPage {
        products,
        next_page,
        breadcrumb_trail,
        warnings,
    })
}

/// Parses a product detail page into its enrichment fields
///
/// Only fields the listing cannot provide (the long description) or may
/// have missed (image, reference code) are taken from the detail page;
/// name and price stay authoritative on the listing so the two never
/// disagree within one crawl.
pub fn parse_product_detail(html: &str, base_url: &Url) -> Result<DetailPage, ParseError> {
    let document = Html::parse_document(html);

    let container_present = DETAIL_CONTAINERS.iter().any(|s| {
        Selector::parse(s)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false)
    });

    if !container_present {
        return Err(ParseError::MissingAnchor {
            kind: PageKind::ProductDetail,
            anchor: "product container",
        });
    }

    let description = select_first_text(&document, DETAIL_DESCRIPTION).filter(|s| !s.is_empty());

    let image_url = Selector::parse(CARD_IMAGE).ok().and_then(|sel| {
        document.select(&sel).next().and_then(|img| {
            let href = img.value().attr("src").or_else(|| img.value().attr("data-src"))?;
            resolve_url(href, base_url)
        })
    });

    let reference_code = select_first_text(&document, CARD_CODE)
        .map(|s| s.trim().to_string())
        .filter(|s| looks_like_reference_code(s));

    Ok(DetailPage {
        description,
        image_url,
        reference_code,
    })
}

/// Extracts a single product record from a listing card
///
/// Every field is validated before the record is accepted; the error is a
/// human-readable reason used as a sync warning.
fn extract_product_card(card: &ElementRef, base_url: &Url) -> Result<ProductRecord, String> {
    let source_url = card_product_url(card, base_url)
        .ok_or_else(|| "product card without a valid product link".to_string())?;

    let id = derive_id(&source_url)
        .ok_or_else(|| format!("could not derive a product id from {}", source_url))?;

    let name = match card_select_text(card, CARD_NAME) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(format!("product {} has no name", source_url)),
    };

    let price_text = card_select_text(card, CARD_PRICE)
        .ok_or_else(|| format!("product '{}' has no price", name))?;
    let price = parse_price(&price_text)
        .ok_or_else(|| format!("product '{}' has unparseable price '{}'", name, price_text))?;

    let image_url = match card_image_href(card) {
        None => None,
        Some(href) => match resolve_url(&href, base_url) {
            Some(url) => Some(url),
            None => {
                return Err(format!("product '{}' has malformed image URL '{}'", name, href));
            }
        },
    };

    let reference_code = card_select_text(card, CARD_CODE).filter(|s| looks_like_reference_code(s));

    Ok(ProductRecord {
        id,
        name,
        price,
        reference_code,
        image_url,
        source_url,
    })
}

/// Finds the product link on a card, ignoring category links
fn card_product_url(card: &ElementRef, base_url: &Url) -> Option<String> {
    let is_product_href = |href: &str| href.contains("/shop") && !href.contains(CATEGORY_HREF);

    if card.value().name() == "a" {
        if let Some(href) = card.value().attr("href") {
            if is_product_href(href) {
                return resolve_url(href, base_url);
            }
        }
    }

    let selector = Selector::parse("a[href]").ok()?;
    card.select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| is_product_href(href))
        .and_then(|href| resolve_url(href, base_url))
}

fn card_image_href(card: &ElementRef) -> Option<String> {
    let selector = Selector::parse(CARD_IMAGE).ok()?;
    card.select(&selector).next().and_then(|img| {
        img.value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .map(|s| s.to_string())
    })
}

/// Category ids along the breadcrumb, in page order
fn extract_breadcrumb_trail(document: &Html, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse(BREADCRUMB) else {
        return Vec::new();
    };

    let mut trail = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.contains(CATEGORY_HREF) {
            continue;
        }
        if let Some(url) = resolve_url(href, base_url) {
            if let Some(id) = derive_id(&url) {
                if !trail.contains(&id) {
                    trail.push(id);
                }
            }
        }
    }
    trail
}

fn extract_next_page(document: &Html, base_url: &Url) -> Option<String> {
    let selector = Selector::parse(NEXT_PAGE).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_url(href, base_url))
}

/// Derives a stable id from a storefront URL
///
/// The storefront appends a numeric id to most slugs
/// (`/shop/category/hand-tools-3`, `/shop/angle-grinder-42`); that number
/// is the id. URLs without one fall back to the slug itself so re-syncs
/// still derive the same identity.
fn derive_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();

    if segment.is_empty() {
        return None;
    }

    if let Some((_, digits)) = segment.rsplit_once('-') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Some(digits.to_string());
        }
    }

    Some(segment)
}

/// Cleans a displayed price down to a decimal value
///
/// Currency symbols and whitespace are stripped, commas are treated as
/// grouping separators. Returns None when nothing parseable remains.
fn parse_price(text: &str) -> Option<BigDecimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.replace(',', "");

    if cleaned.is_empty() {
        return None;
    }

    let price = BigDecimal::from_str(&cleaned).ok()?;
    if price < BigDecimal::from(0) {
        return None;
    }
    Some(price)
}

/// Resolves an href to an absolute http(s) URL
fn resolve_url(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:") || href.starts_with("mailto:") || href.starts_with("data:") {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}

fn looks_like_reference_code(text: &str) -> bool {
    !text.is_empty()
        && text.len() <= 32
        && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn card_select_text(card: &ElementRef, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    card.select(&selector)
        .next()
        .map(|e| element_text(&e))
        .filter(|s| !s.is_empty())
}

fn select_first_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    document
        .select(&selector)
        .next()
        .map(|e| element_text(&e))
}
