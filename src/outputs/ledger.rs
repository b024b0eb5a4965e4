//! The update ledger: per source, when it was last harvested successfully.
//!
//! Stored at `{data_dir}/index/logs/last_update_time.json` as
//!
//! ```json
//! { "bksy": "2024-03-05 09:07:02", "wxpub_demo": "unknown" }
//! ```
//!
//! The timestamp doubles as the key of the snapshot a run produced, so an
//! incremental run can find the previous snapshot from it.

use crate::error::{HarvestError, Result};
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum LastUpdate {
    Unknown,
    /// `YYYY-MM-DD HH:MM:SS`
    At(String),
}

impl From<String> for LastUpdate {
    fn from(s: String) -> Self {
        if s.trim().is_empty() || s == UNKNOWN {
            LastUpdate::Unknown
        } else {
            LastUpdate::At(s)
        }
    }
}

impl From<LastUpdate> for String {
    fn from(u: LastUpdate) -> Self {
        match u {
            LastUpdate::Unknown => UNKNOWN.to_string(),
            LastUpdate::At(ts) => ts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<String, LastUpdate>,
}

impl Ledger {
    /// Load the ledger; a missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Persistence`] if the file exists but cannot be read
    /// or decoded.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await? {
            info!("No ledger yet; starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).await?;
        let ledger: Self = serde_json::from_str(&raw).map_err(|e| {
            HarvestError::Persistence(format!("corrupt ledger {}: {e}", path.display()))
        })?;
        if ledger.is_empty() {
            warn!("Ledger file holds no entries");
        } else {
            debug!(entries = ledger.len(), "Loaded ledger");
        }
        Ok(ledger)
    }

    /// Write the ledger atomically.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HarvestError::Persistence(format!("cannot encode ledger: {e}")))?;
        write_atomic(path, json.as_bytes()).await?;
        info!(entries = self.len(), "Saved ledger");
        Ok(())
    }

    pub fn get(&self, site: &str) -> Option<&LastUpdate> {
        self.entries.get(site)
    }

    /// The recorded timestamp, if the source has one.
    pub fn known(&self, site: &str) -> Option<&str> {
        match self.get(site) {
            Some(LastUpdate::At(ts)) => Some(ts),
            _ => None,
        }
    }

    pub fn record_success(&mut self, site: &str, timestamp: &str) {
        self.entries
            .insert(site.to_string(), LastUpdate::At(timestamp.to_string()));
    }

    /// Seed a failed source as unknown; an existing entry is kept.
    pub fn record_failure(&mut self, site: &str) {
        self.entries
            .entry(site.to_string())
            .or_insert(LastUpdate::Unknown);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
