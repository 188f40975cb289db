//! Product image materialization
//!
//! Images are stored content-addressed: the file name is derived from the
//! remote URL, so a product whose image URL is unchanged costs nothing on
//! re-sync, and a changed URL naturally produces a new file. Downloads are
//! independent per product; one failure nulls that product's local image
//! and the sync carries on.

use crate::catalog::Product;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Known image extensions, used both for Content-Type mapping and for the
/// already-downloaded check
const EXTENSIONS: &[&str] = &["jpg", "png", "webp", "gif"];

/// Per-image download failures; never fatal to the sync
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("HTTP {status} for image {url}")]
    Status { url: String, status: u16 },

    #[error("failed to write image for {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download pool shut down before {url} was fetched")]
    Cancelled { url: String },
}

/// The content-addressed file stem for an image URL
fn file_stem(image_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_url.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Maps a Content-Type header to a file extension, defaulting to jpg
fn extension_for(content_type: &str) -> &'static str {
    if content_type.contains("png") {
        "png"
    } else if content_type.contains("webp") {
        "webp"
    } else if content_type.contains("gif") {
        "gif"
    } else {
        "jpg"
    }
}

/// Ensures the image behind `image_url` exists locally
///
/// Returns the image's file name within `images_dir`. When a file for this
/// URL already exists, it is returned without any network I/O.
pub async fn ensure_image(
    client: &Client,
    images_dir: &Path,
    image_url: &str,
) -> Result<String, DownloadError> {
    let stem = file_stem(image_url);

    for ext in EXTENSIONS {
        let candidate = format!("{}.{}", stem, ext);
        if images_dir.join(&candidate).exists() {
            tracing::trace!("Image for {} already cached as {}", image_url, candidate);
            return Ok(candidate);
        }
    }

    let response = client
        .get(image_url)
        .send()
        .await
        .map_err(|e| DownloadError::Http {
            url: image_url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: image_url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let bytes = response.bytes().await.map_err(|e| DownloadError::Http {
        url: image_url.to_string(),
        message: e.to_string(),
    })?;

    let file_name = format!("{}.{}", stem, extension_for(&content_type));
    let io_err = |source| DownloadError::Io {
        url: image_url.to_string(),
        source,
    };

    std::fs::create_dir_all(images_dir).map_err(io_err)?;

    // Write through a temp name so a crash mid-write never leaves a file
    // that the exists-check above would mistake for a complete image.
    let final_path = images_dir.join(&file_name);
    let tmp_path = images_dir.join(format!("{}.part", stem));
    std::fs::write(&tmp_path, &bytes).map_err(io_err)?;
    std::fs::rename(&tmp_path, &final_path).map_err(io_err)?;

    tracing::debug!(
        "Downloaded image {} -> {} ({} bytes)",
        image_url,
        file_name,
        bytes.len()
    );

    Ok(file_name)
}

/// Materializes images for every product that references one
///
/// Runs up to `concurrency` downloads at a time. Failures are collected as
/// warnings; the affected product keeps `image_path = None` and is retried
/// on the next sync.
pub async fn download_all(
    client: &Client,
    images_dir: &Path,
    products: &mut [Product],
    concurrency: usize,
) -> Vec<String> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks: JoinSet<(usize, Result<String, DownloadError>)> = JoinSet::new();

    for (index, product) in products.iter().enumerate() {
        let Some(image_url) = product.image_url.clone() else {
            continue;
        };

        let client = client.clone();
        let images_dir: PathBuf = images_dir.to_path_buf();
        let semaphore = semaphore.clone();

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (index, Err(DownloadError::Cancelled { url: image_url }));
                }
            };
            let result = ensure_image(&client, &images_dir, &image_url).await;
            (index, result)
        });
    }

    let mut warnings = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(file_name))) => {
                products[index].image_path = Some(file_name);
            }
            Ok((index, Err(e))) => {
                let product = &mut products[index];
                product.image_path = None;
                tracing::warn!("Image download failed for product {}: {}", product.id, e);
                warnings.push(format!("image for product {}: {}", product.id, e));
            }
            Err(e) => {
                tracing::warn!("Image download task panicked: {}", e);
                warnings.push(format!("image download task failed: {}", e));
            }
        }
    }

    warnings
}
