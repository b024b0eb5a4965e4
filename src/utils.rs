//! Small helpers for logging and the file system.
//!
//! - String truncation for log previews
//! - Output directory validation
//! - Atomic file replacement

use crate::error::{HarvestError, Result};
use std::fs as stdfs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary within `max` bytes
/// and get `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
///
/// # Errors
///
/// [`HarvestError::Persistence`] if the directory cannot be created or
/// written to.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // sync probe keeps the error surface simple
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            debug!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(HarvestError::Persistence(format!(
            "{} is not writable: {e}",
            path.display()
        ))),
    }
}

/// Replace `path` with `contents` via a named temp file in the same directory.
///
/// The temp file is synced before it is persisted over `path`, so readers
/// see either the old file or the complete new one.
///
/// # Errors
///
/// [`HarvestError::Persistence`] if the directory, the temp file or the
/// final rename fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).await?;

    let target = path.to_path_buf();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| {
            HarvestError::Persistence(format!("cannot replace {}: {}", target.display(), e.error))
        })?;
        Ok(())
    })
    .await
    .map_err(|e| HarvestError::Persistence(format!("atomic write task failed: {e}")))?
}
