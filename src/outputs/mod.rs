//! Everything the harvester persists.
//!
//! # Submodules
//!
//! - [`snapshot`]: per-source, per-run item snapshots
//! - [`ledger`]: last successful update per source
//! - [`report`]: per-run logs
//!
//! # Output Structure
//!
//! ```text
//! {data_dir}/index/
//! ├── bksy/
//! │   └── 20240305/
//! │       └── 090702.json          # snapshot, chronological
//! └── logs/
//!     ├── last_update_time.json    # ledger
//!     └── 20240305_090702_all.json # run log
//! ```

pub mod ledger;
pub mod report;
pub mod snapshot;
