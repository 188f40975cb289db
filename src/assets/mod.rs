//! Local materialization of product images

mod downloader;

pub use downloader::{download_all, ensure_image, DownloadError};
