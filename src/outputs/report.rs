//! Run logs: the [`RunReport`] of each run, written to
//! `{data_dir}/index/logs/{YYYYMMDD_HHMMSS}_{all|incremental}.json`.

use crate::error::{HarvestError, Result};
use crate::models::RunReport;
use tokio::fs;
use tracing::{info, instrument};

#[instrument(level = "info", skip_all, fields(path = %report.logs_file_path.display()))]
pub async fn write_run_log(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| HarvestError::Persistence(format!("cannot encode run log: {e}")))?;
    if let Some(dir) = report.logs_file_path.parent() {
        fs::create_dir_all(dir).await?;
    }
    fs::write(&report.logs_file_path, json).await?;
    info!("Wrote run log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunContext, RunMode};
    use chrono::{FixedOffset, TimeZone};

    #[tokio::test]
    async fn test_write_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let when = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 9, 7, 2)
            .unwrap();
        let ctx = RunContext::at(dir.path(), when);
        let report = RunReport::aborted(&ctx, RunMode::Full, "config missing");
        write_run_log(&report).await.unwrap();

        let path = dir.path().join("index/logs/20240305_090702_all.json");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["runSuccess"], false);
        assert_eq!(json["error"], "config missing");
        assert_eq!(json["updateTimeStamp"], "2024-03-05 09:07:02");
    }
}
