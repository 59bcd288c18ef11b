//! Reading and writing the store file.
//!
//! Reads never fail the run: a missing file, unreadable content, or a
//! malformed document all yield an empty collection, and individually
//! malformed items are skipped. Writes go to a temporary sibling file that
//! is renamed over the target, so readers see either the old document or
//! the new one.

use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::models::{Item, StoreDocument};
use crate::utils::parent_dir;

/// Load stored items from `path`, treating anything unusable as empty.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_items(path: &Path) -> Vec<Item> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No existing store; starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read store; starting empty");
            return Vec::new();
        }
    };

    let document: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Store is not valid JSON; starting empty");
            return Vec::new();
        }
    };

    let Some(entries) = document.get("items").and_then(|v| v.as_array()) else {
        warn!("Store has no items array; starting empty");
        return Vec::new();
    };

    let mut skipped = 0usize;
    let items: Vec<Item> = entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Item>(entry.clone()) {
            Ok(item) if !item.id.is_empty() && !item.url.is_empty() => Some(item),
            _ => {
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        warn!(skipped, "Skipped malformed stored items");
    }
    info!(count = items.len(), "Loaded existing store");
    items
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store.json".to_string());
    parent_dir(path).join(format!(".{}.tmp", name))
}

/// Replace the store at `path` with `document`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), items = document.items.len()))]
pub async fn write_atomic(path: &Path, document: &StoreDocument) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(document)?;
    fs::create_dir_all(parent_dir(path)).await?;

    let tmp = temp_path(path);
    fs::write(&tmp, json).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!("Wrote store");
    Ok(())
}
