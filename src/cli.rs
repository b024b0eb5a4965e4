//! Command-line interface definitions.
//!
//! All options can be given as flags; the paths also read environment
//! variables.

use clap::Parser;
use std::path::PathBuf;

/// Harvest dated news snapshots from the configured sources.
///
/// # Examples
///
/// ```sh
/// # Full harvest of every configured source
/// news_harvest -c ./source_config.json -d ./data
///
/// # Incremental harvest of two sources
/// news_harvest -i -s zdbk -s bksy
///
/// # Sources enabled in a flag file, link-only de-duplication
/// news_harvest -i -e ./enabled.json --strict-dedup
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source config file (JSON, or YAML by extension)
    #[arg(short, long, env = "HARVEST_CONFIG", default_value = "./source_config.json")]
    pub config: PathBuf,

    /// Root of the snapshot, ledger and run log tree
    #[arg(short, long, env = "HARVEST_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Harvest only these sources (repeatable)
    #[arg(short, long = "source")]
    pub sources: Vec<String>,

    /// File selecting sources: a name-to-bool map or a list of names
    #[arg(short, long)]
    pub enabled: Option<PathBuf>,

    /// Merge into the previous snapshots instead of harvesting from scratch
    #[arg(short, long)]
    pub incremental: bool,

    /// Raw cookie string for cookie-session sources
    #[arg(long, env = "HARVEST_COOKIE_FILE", default_value = "./wxpubcookie.txt")]
    pub cookie_file: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Offset of the sources' local clock from UTC
    #[arg(long, default_value_t = 8, allow_negative_numbers = true)]
    pub utc_offset_hours: i32,

    /// Treat an incoming item as known only when its link is already stored
    #[arg(long)]
    pub strict_dedup: bool,
}
