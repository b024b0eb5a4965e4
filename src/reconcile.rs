//! Incremental reconciliation against the previous snapshot.
//!
//! An incremental run starts each source's walk at the date of its last
//! successful update, so the fresh batch overlaps what is already stored.
//! [`merge`] folds the fresh items into the stored list, and the merged list
//! becomes this run's snapshot.

use crate::config::TimeBoundary;
use crate::datetime::date_part;
use crate::error::Result;
use crate::models::NewsItem;
use crate::outputs::snapshot::read_snapshot;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};

/// When an incoming item counts as already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupRule {
    /// Same link, or the incoming item is later than a stored one. Items
    /// without a datetime only ever match by link.
    #[default]
    LinkOrLaterDatetime,
    /// Same link only.
    LinkOnly,
}

impl DedupRule {
    fn is_duplicate(self, incoming: &NewsItem, stored: &NewsItem) -> bool {
        incoming.link == stored.link
            || (self == DedupRule::LinkOrLaterDatetime
                && !incoming.datetime.is_empty()
                && !stored.datetime.is_empty()
                && incoming.datetime > stored.datetime)
    }
}

/// Append the incoming items not already in `stored`. Returns how many were added.
///
/// Each incoming item is compared against `stored` from its newest entry
/// backwards; items appended earlier in the same merge take part in later
/// comparisons. Stored items are never removed.
pub fn merge(stored: &mut Vec<NewsItem>, incoming: Vec<NewsItem>, rule: DedupRule) -> usize {
    let mut added = 0;
    for item in incoming {
        if stored.iter().rev().any(|s| rule.is_duplicate(&item, s)) {
            continue;
        }
        stored.push(item);
        added += 1;
    }
    added
}

/// Walk boundary for a source with a ledger timestamp: its date part.
pub fn boundary_from_ledger(timestamp: Option<&str>) -> Option<TimeBoundary> {
    timestamp.map(|ts| TimeBoundary::Since(date_part(ts).to_string()))
}

/// Snapshot path recorded by a ledger timestamp `YYYY-MM-DD HH:MM:SS`.
pub fn prior_snapshot_path(index_dir: &Path, site: &str, timestamp: &str) -> PathBuf {
    let compact: String = timestamp.chars().filter(char::is_ascii_digit).collect();
    let (day, time) = compact.split_at(compact.len().min(8));
    index_dir
        .join(site)
        .join(day)
        .join(format!("{}.json", &time[..time.len().min(6)]))
}

/// Merge a fresh chronological batch into the snapshot the ledger points at.
///
/// Returns the list to persist and the number of fresh items it gained.
/// Without a ledger timestamp, or when the prior snapshot is gone, the fresh
/// batch is taken as is.
///
/// # Errors
///
/// [`crate::error::HarvestError::Persistence`] if the prior snapshot exists
/// but cannot be read.
#[instrument(level = "info", skip(index_dir, fresh, rule))]
pub async fn reconcile(
    index_dir: &Path,
    site: &str,
    last_update: Option<&str>,
    fresh: Vec<NewsItem>,
    rule: DedupRule,
) -> Result<(Vec<NewsItem>, usize)> {
    let Some(ts) = last_update else {
        let n = fresh.len();
        return Ok((fresh, n));
    };
    let prior = prior_snapshot_path(index_dir, site, ts);
    if !fs::try_exists(&prior).await? {
        warn!(path = %prior.display(), "Previous snapshot missing; keeping fresh batch as is");
        let n = fresh.len();
        return Ok((fresh, n));
    }
    let mut stored = read_snapshot(&prior).await?;
    let before = stored.len();
    let added = merge(&mut stored, fresh, rule);
    debug!(stored = before, added, "Merged into previous snapshot");
    Ok((stored, added))
}
