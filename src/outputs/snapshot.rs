//! Snapshot files: one pretty-printed JSON array of [`NewsItem`]s per source
//! per run, stored at `{data_dir}/index/{site}/{YYYYMMDD}/{HHMMSS}.json` in
//! chronological order.

use crate::error::{HarvestError, Result};
use crate::models::NewsItem;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `items` to `path`, creating parent directories.
///
/// # Errors
///
/// [`HarvestError::Persistence`] on any I/O or encoding failure.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = items.len()))]
pub async fn write_snapshot(path: &Path, items: &[NewsItem]) -> Result<()> {
    let json = serde_json::to_string_pretty(items)
        .map_err(|e| HarvestError::Persistence(format!("cannot encode snapshot: {e}")))?;

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create snapshot dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!("Wrote snapshot");
    Ok(())
}

/// Read a snapshot back.
///
/// # Errors
///
/// [`HarvestError::Persistence`] if the file is missing or not a JSON array
/// of items.
pub async fn read_snapshot(path: &Path) -> Result<Vec<NewsItem>> {
    let raw = fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| {
        HarvestError::Persistence(format!("corrupt snapshot {}: {e}", path.display()))
    })
}
