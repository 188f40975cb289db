//! Catalog persistence
//!
//! The catalog of record is a single JSON document. Readers (the serving
//! layer) may open it at any time, so it is never mutated in place: writes
//! go to a sibling temp file which is then renamed over the target. A sync
//! that dies mid-write leaves the previous document untouched.

use crate::catalog::types::Catalog;
use std::path::Path;
use thiserror::Error;

/// Persistence errors; always fatal to the sync attempt that hit them
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Loads the catalog from disk, falling back to an empty catalog
///
/// A missing file is the normal first-boot state. An unreadable or corrupt
/// file is logged and treated the same way; the next successful sync will
/// replace it.
pub fn load_or_default(path: &Path) -> Catalog {
    if !path.exists() {
        tracing::info!("No catalog at {}, starting empty", path.display());
        return Catalog::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("Catalog at {} is corrupt ({}), starting empty", path.display(), e);
                Catalog::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read catalog at {} ({}), starting empty", path.display(), e);
            Catalog::default()
        }
    }
}

/// Atomically replaces the persisted catalog
///
/// Serializes to `<path>.tmp` in the same directory, then renames over the
/// target so concurrent readers observe either the old or the new document,
/// never a partial one.
pub fn persist(path: &Path, catalog: &Catalog) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(catalog)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    if let Err(e) = std::fs::write(&tmp, &json) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    tracing::debug!(
        "Persisted catalog to {} ({} bytes)",
        path.display(),
        json.len()
    );

    Ok(())
}
