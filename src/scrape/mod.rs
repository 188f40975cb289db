//! Storefront scraping: paced fetching and HTML extraction
//!
//! The fetcher owns transport concerns (browser headers, pacing, retries);
//! the parser owns every selector that is coupled to the source site's
//! markup. Nothing outside this module knows what the storefront's HTML
//! looks like.

mod fetcher;
mod pacer;
pub mod parser;

pub use fetcher::{build_http_client, FetchError, Fetcher};
pub use pacer::RequestPacer;
pub use parser::{
    parse_category_index, parse_product_detail, parse_product_listing, CategoryRecord, DetailPage,
    ListingPage, PageKind, ParseError, ProductRecord,
};
