//! # News Harvest
//!
//! Harvests "news item" records (title, link, publication time) from a roster
//! of paginated sources and keeps them as dated, de-duplicated JSON
//! snapshots.
//!
//! ## Sources
//!
//! - HTML listing pages with a news module and a `current/total` page label
//! - JSON APIs, queried with GET or a form POST
//! - A cookie-authenticated JSON API with provider-side throttling
//!
//! ## Usage
//!
//! ```sh
//! news_harvest -c ./source_config.json -d ./data        # full run
//! news_harvest -c ./source_config.json -d ./data -i     # incremental run
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: an adapter per source returns one page of raw entries
//! 2. **Walking**: the paginator settles page count and time boundary, then
//!    walks pages newest first until the collector says stop
//! 3. **Reconciling**: incremental runs merge into the previous snapshot
//! 4. **Output**: snapshots, the update ledger and a run log under
//!    `{data_dir}/index/`

use clap::Parser;
use std::error::Error;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collector;
mod config;
mod datetime;
mod engine;
mod error;
mod models;
mod orchestrator;
mod outputs;
mod reconcile;
mod scrapers;
mod utils;

use cli::Cli;
use config::SourceSelection;
use models::RunMode;
use orchestrator::{HarvestSettings, Harvester};
use reconcile::DedupRule;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_harvest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mode = if args.incremental {
        RunMode::Incremental
    } else {
        RunMode::Full
    };

    let mut settings = HarvestSettings::new(args.config, args.data_dir);
    if !args.sources.is_empty() {
        settings.selection = Some(SourceSelection::Listed(args.sources));
    }
    settings.enabled_file = args.enabled;
    settings.cookie_file = args.cookie_file;
    settings.timeout = std::time::Duration::from_secs(args.timeout_secs);
    settings.utc_offset_hours = args.utc_offset_hours;
    if args.strict_dedup {
        settings.dedup_rule = DedupRule::LinkOnly;
    }

    let harvester = Harvester::new(settings)?;
    let report = harvester.run(mode).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        run_success = report.run_success,
        all_success = report.all_success,
        "Execution complete"
    );

    Ok(())
}
