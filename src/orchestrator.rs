//! Run orchestration.
//!
//! A [`Harvester`] run:
//!
//! 1. Loads the source configs and the selection of sources taking part.
//! 2. Loads the ledger.
//! 3. Spawns one task per source (fetch → walk → snapshot, plus the merge
//!    in incremental mode) and joins them all.
//! 4. Updates the ledger from the outcomes and saves it.
//! 5. Writes the run log.
//!
//! A source failing never fails the run; it becomes a `failed` outcome. A
//! run that cannot start (unreadable configs, corrupt ledger) still produces
//! a report with `runSuccess: false`.

use crate::config::{SourceConfig, SourceSelection, load_source_configs};
use crate::engine::Paginator;
use crate::error::{HarvestError, Result};
use crate::models::{RunContext, RunMode, RunOutcome, RunReport};
use crate::outputs::ledger::Ledger;
use crate::outputs::report::write_run_log;
use crate::outputs::snapshot::write_snapshot;
use crate::reconcile::{DedupRule, boundary_from_ledger, reconcile};
use crate::scrapers::SourceAdapter;
use crate::scrapers::retry::{RateLimitRetry, RetryPolicy};
use crate::utils::ensure_writable_dir;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Everything a run needs besides the source configs themselves.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    /// Sources named explicitly; takes precedence over `enabled_file`.
    pub selection: Option<SourceSelection>,
    pub enabled_file: Option<PathBuf>,
    pub cookie_file: PathBuf,
    pub timeout: Duration,
    pub utc_offset_hours: i32,
    pub dedup_rule: DedupRule,
    pub retry: RetryPolicy,
}

impl HarvestSettings {
    pub fn new(config_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            data_dir: data_dir.into(),
            selection: None,
            enabled_file: None,
            cookie_file: PathBuf::from("./wxpubcookie.txt"),
            timeout: Duration::from_secs(30),
            utc_offset_hours: 8,
            dedup_rule: DedupRule::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared, read-only state handed to every source task.
#[derive(Debug)]
struct RunEnv {
    client: reqwest::Client,
    ctx: RunContext,
    mode: RunMode,
    cookie_file: PathBuf,
    dedup_rule: DedupRule,
    retry: RetryPolicy,
}

/// One source's work order.
#[derive(Debug)]
struct SourceJob {
    config: Arc<SourceConfig>,
    last_update: Option<String>,
}

#[derive(Debug)]
pub struct Harvester {
    settings: HarvestSettings,
    client: reqwest::Client,
}

impl Harvester {
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the HTTP client cannot be built.
    pub fn new(settings: HarvestSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { settings, client })
    }

    /// Run now, on the sources' local clock.
    pub async fn run(&self, mode: RunMode) -> RunReport {
        let ctx = RunContext::now(&self.settings.data_dir, self.settings.utc_offset_hours);
        self.run_at(ctx, mode).await
    }

    /// Run with a given context. Always yields a report and tries to log it.
    #[instrument(level = "info", skip_all, fields(mode = mode.log_suffix(), run = %ctx.compact))]
    pub async fn run_at(&self, ctx: RunContext, mode: RunMode) -> RunReport {
        let report = match self.try_run(&ctx, mode).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Run aborted");
                RunReport::aborted(&ctx, mode, e)
            }
        };

        if let Err(e) = write_run_log(&report).await {
            error!(path = %report.logs_file_path.display(), error = %e, "Failed to write run log");
        }
        info!(
            "{} succeed, {} failed, saved at {}",
            report.success_number,
            report.failed_number,
            report.logs_file_path.display()
        );
        report
    }

    async fn try_run(&self, ctx: &RunContext, mode: RunMode) -> Result<RunReport> {
        let configs = load_source_configs(&self.settings.config_path).await?;
        let names = self.selected_names(&configs).await?;
        info!(count = names.len(), sources = ?names, "Selected sources");

        ensure_writable_dir(&ctx.logs_dir()).await?;
        let ledger_path = ctx.ledger_path();
        let mut ledger = Ledger::load(&ledger_path).await?;

        let env = Arc::new(RunEnv {
            client: self.client.clone(),
            ctx: ctx.clone(),
            mode,
            cookie_file: self.settings.cookie_file.clone(),
            dedup_rule: self.settings.dedup_rule,
            retry: self.settings.retry,
        });

        let mut outcomes = Vec::with_capacity(names.len());
        let mut spawned = Vec::new();
        let mut handles = Vec::new();
        for name in &names {
            let Some(config) = configs.get(name) else {
                warn!(site = %name, "Selected source has no config");
                outcomes.push(RunOutcome::failed(
                    name,
                    HarvestError::Config(format!("no config for source {name}")),
                ));
                continue;
            };
            let job = SourceJob {
                config: Arc::new(config.clone()),
                last_update: ledger.known(name).map(str::to_string),
            };
            spawned.push(name.clone());
            handles.push(tokio::spawn(harvest_source(job, Arc::clone(&env))));
        }

        let results = join_all(handles).await;
        for (name, result) in spawned.into_iter().zip(results) {
            outcomes.push(result.unwrap_or_else(|e| {
                error!(site = %name, error = %e, "Source task did not complete");
                RunOutcome::failed(&name, format!("task failed: {e}"))
            }));
        }

        for outcome in &outcomes {
            if outcome.is_success() {
                ledger.record_success(&outcome.site_name, &ctx.display);
            } else {
                ledger.record_failure(&outcome.site_name);
            }
        }
        if let Err(e) = ledger.save(&ledger_path).await {
            error!(path = %ledger_path.display(), error = %e, "Failed to save ledger");
        }

        Ok(RunReport::from_outcomes(ctx, mode, names, outcomes))
    }

    /// Explicit selection, else the enabled-sources file, else every config.
    async fn selected_names(&self, configs: &BTreeMap<String, SourceConfig>) -> Result<Vec<String>> {
        if let Some(selection) = &self.settings.selection {
            return Ok(selection.names());
        }
        if let Some(path) = &self.settings.enabled_file {
            return Ok(SourceSelection::load(path).await?.names());
        }
        Ok(configs.keys().cloned().collect())
    }
}

#[instrument(level = "info", skip_all, fields(site = %job.config.site_name))]
async fn harvest_source(job: SourceJob, env: Arc<RunEnv>) -> RunOutcome {
    match collect_source(&job, &env).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Source failed");
            RunOutcome::failed(&job.config.site_name, e)
        }
    }
}

async fn collect_source(job: &SourceJob, env: &RunEnv) -> Result<RunOutcome> {
    let config = &job.config;
    let site = config.site_name.as_str();

    let adapter =
        SourceAdapter::from_config(Arc::clone(config), env.client.clone(), &env.cookie_file).await?;
    let mut paginator = Paginator::new(RateLimitRetry::new(adapter, env.retry), config)?;
    if env.mode == RunMode::Incremental {
        if let Some(boundary) = boundary_from_ledger(job.last_update.as_deref()) {
            paginator = paginator.with_boundary(boundary);
        }
    }

    let harvest = paginator.harvest().await?;
    let number = harvest.items.len();
    let mut items = harvest.items;
    items.reverse();

    let path = env.ctx.snapshot_path(site);
    let added = match env.mode {
        RunMode::Full => {
            write_snapshot(&path, &items).await?;
            info!("{} items fetched, saved at {}", number, path.display());
            None
        }
        RunMode::Incremental => {
            let (merged, added) = reconcile(
                &env.ctx.index_dir,
                site,
                job.last_update.as_deref(),
                items,
                env.dedup_rule,
            )
            .await?;
            write_snapshot(&path, &merged).await?;
            info!("{} items added, saved at {}", added, path.display());
            Some(added)
        }
    };

    let mut outcome = RunOutcome::success(site, config.nick(), number, path);
    outcome.added = added;
    Ok(outcome)
}
