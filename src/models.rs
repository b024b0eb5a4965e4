//! Data models shared across the harvesting pipeline.
//!
//! - [`NewsItem`]: one harvested record, the unit persisted in snapshots
//! - [`RawItem`] / [`RawPage`]: what an adapter hands back for one page
//! - [`RunOutcome`] / [`RunReport`]: per-source and per-run results
//! - [`RunContext`]: the run timestamp and index root, computed once per run
//!
//! The outcome and report types serialize with camelCase keys so that run
//! logs keep the same shape as the files downstream readers already consume.

use crate::datetime::fixed_offset;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A harvested news record.
///
/// `datetime` is normalized to `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`, which
/// keeps plain string comparison chronologically meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewsItem {
    pub link: String,
    pub title: String,
    pub datetime: String,
}

/// One entry as an adapter found it: link already resolved, datetime still raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub link: String,
    pub title: String,
    pub datetime_text: String,
}

/// One page of raw entries, newest first, plus the total page count if the
/// page advertised one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPage {
    pub items: Vec<RawItem>,
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Full,
    Incremental,
}

impl RunMode {
    /// Suffix used in run log file names.
    pub fn log_suffix(&self) -> &'static str {
        match self {
            RunMode::Full => "all",
            RunMode::Incremental => "incremental",
        }
    }
}

/// Result of harvesting one source.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub site_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,
    pub status: RunStatus,
    /// Items collected by this run's walk.
    pub number: usize,
    /// Items that survived the incremental merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success(site_name: &str, nick_name: &str, number: usize, file_path: PathBuf) -> Self {
        Self {
            site_name: site_name.to_string(),
            nick_name: Some(nick_name.to_string()),
            status: RunStatus::Success,
            number,
            added: None,
            file_path: Some(file_path),
            error: None,
        }
    }

    pub fn failed(site_name: &str, error: impl ToString) -> Self {
        Self {
            site_name: site_name.to_string(),
            nick_name: None,
            status: RunStatus::Failed,
            number: 0,
            added: None,
            file_path: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Aggregate of one run across all participating sources.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub update_time_stamp: String,
    pub logs_file_path: PathBuf,
    pub mode: RunMode,
    pub run_success: bool,
    pub all_success: bool,
    pub fetch_sources: Vec<String>,
    pub success_number: usize,
    pub success_fetches: BTreeMap<String, RunOutcome>,
    pub failed_number: usize,
    pub failed_fetches: BTreeMap<String, RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Fold per-source outcomes into a report.
    pub fn from_outcomes(
        ctx: &RunContext,
        mode: RunMode,
        fetch_sources: Vec<String>,
        outcomes: Vec<RunOutcome>,
    ) -> Self {
        let mut success_fetches = BTreeMap::new();
        let mut failed_fetches = BTreeMap::new();
        for outcome in outcomes {
            if outcome.is_success() {
                success_fetches.insert(outcome.site_name.clone(), outcome);
            } else {
                failed_fetches.insert(outcome.site_name.clone(), outcome);
            }
        }
        Self {
            update_time_stamp: ctx.display.clone(),
            logs_file_path: ctx.log_path(mode),
            mode,
            run_success: true,
            all_success: failed_fetches.is_empty() && success_fetches.len() == fetch_sources.len(),
            fetch_sources,
            success_number: success_fetches.len(),
            success_fetches,
            failed_number: failed_fetches.len(),
            failed_fetches,
            error: None,
        }
    }

    /// A report for a run that could not get as far as fetching anything.
    pub fn aborted(ctx: &RunContext, mode: RunMode, error: impl ToString) -> Self {
        Self {
            update_time_stamp: ctx.display.clone(),
            logs_file_path: ctx.log_path(mode),
            mode,
            run_success: false,
            all_success: false,
            fetch_sources: Vec::new(),
            success_number: 0,
            success_fetches: BTreeMap::new(),
            failed_number: 0,
            failed_fetches: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Per-run values every component needs: the run timestamp and the index root.
///
/// The timestamp is taken once, on the sources' local clock, and handed to
/// everything that names files, so all snapshots of one run share a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// `YYYY-MM-DD HH:MM:SS`, recorded in the ledger and the report.
    pub display: String,
    /// `YYYYMMDD_HHMMSS`, used to name files.
    pub compact: String,
    /// `{data_dir}/index`
    pub index_dir: PathBuf,
}

impl RunContext {
    pub fn now(data_dir: &Path, utc_offset_hours: i32) -> Self {
        Self::at(data_dir, Utc::now().with_timezone(&fixed_offset(utc_offset_hours)))
    }

    pub fn at(data_dir: &Path, when: DateTime<FixedOffset>) -> Self {
        Self {
            display: when.format("%Y-%m-%d %H:%M:%S").to_string(),
            compact: when.format("%Y%m%d_%H%M%S").to_string(),
            index_dir: data_dir.join("index"),
        }
    }

    /// `YYYYMMDD`
    pub fn day(&self) -> &str {
        &self.compact[..8]
    }

    /// `HHMMSS`
    pub fn time(&self) -> &str {
        &self.compact[9..15]
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.index_dir.join("logs")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.logs_dir().join("last_update_time.json")
    }

    pub fn log_path(&self, mode: RunMode) -> PathBuf {
        self.logs_dir()
            .join(format!("{}_{}.json", self.compact, mode.log_suffix()))
    }

    /// Directory holding one source's snapshots for this run's day.
    pub fn snapshot_dir(&self, site_name: &str) -> PathBuf {
        self.index_dir.join(site_name).join(self.day())
    }

    pub fn snapshot_path(&self, site_name: &str) -> PathBuf {
        self.snapshot_dir(site_name)
            .join(format!("{}.json", self.time()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> RunContext {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let when = offset.with_ymd_and_hms(2024, 3, 5, 9, 7, 2).unwrap();
        RunContext::at(Path::new("/data"), when)
    }

    #[test]
    fn test_run_context_slices() {
        let ctx = ctx();
        assert_eq!(ctx.display, "2024-03-05 09:07:02");
        assert_eq!(ctx.compact, "20240305_090702");
        assert_eq!(ctx.day(), "20240305");
        assert_eq!(ctx.time(), "090702");
    }

    #[test]
    fn test_run_context_paths() {
        let ctx = ctx();
        assert_eq!(
            ctx.snapshot_path("zdbk"),
            PathBuf::from("/data/index/zdbk/20240305/090702.json")
        );
        assert_eq!(
            ctx.ledger_path(),
            PathBuf::from("/data/index/logs/last_update_time.json")
        );
        assert_eq!(
            ctx.log_path(RunMode::Incremental),
            PathBuf::from("/data/index/logs/20240305_090702_incremental.json")
        );
    }

    #[test]
    fn test_news_item_serialization() {
        let item = NewsItem {
            link: "https://example.com/a".to_string(),
            title: "A".to_string(),
            datetime: "2024-03-05".to_string(),
        };
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(
            json,
            r#"{"link":"https://example.com/a","title":"A","datetime":"2024-03-05"}"#
        );
    }

    #[test]
    fn test_report_counts_outcomes() {
        let ctx = ctx();
        let outcomes = vec![
            RunOutcome::success("a", "A", 3, PathBuf::from("/x.json")),
            RunOutcome::failed("b", "boom"),
        ];
        let report = RunReport::from_outcomes(
            &ctx,
            RunMode::Full,
            vec!["a".into(), "b".into()],
            outcomes,
        );
        assert!(report.run_success);
        assert!(!report.all_success);
        assert_eq!(report.success_number, 1);
        assert_eq!(report.failed_number, 1);
        assert_eq!(report.failed_fetches["b"].error.as_deref(), Some("boom"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["successFetches"]["a"]["status"], "success");
        assert_eq!(json["logsFilePath"], "/data/index/logs/20240305_090702_all.json");
    }
}
