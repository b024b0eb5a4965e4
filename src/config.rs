//! Source configuration and source selection.
//!
//! A source config file maps a source name to its [`SourceConfig`]. Keys use
//! camelCase (`siteName`, `maxNumber`, `earliestDateTime`, ...). Files ending
//! in `.yaml`/`.yml` are read as YAML, everything else as JSON.
//!
//! ```json
//! {
//!   "bksy": {
//!     "siteName": "bksy",
//!     "type": "page",
//!     "maxNumber": 100,
//!     "earliestDateTime": "all",
//!     "baseUrl": "http://bksy.example.edu",
//!     "urlTemplate": "/list{n}.htm",
//!     "newsModuleIdClass": "#news-list",
//!     "totalPagesIdClass": ".all_pages"
//!   }
//! }
//! ```

use crate::error::{HarvestError, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Cool-down between sequential page requests for cookie-session sources.
const COOKIE_SESSION_COOLDOWN_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FetchStyle {
    #[serde(rename = "page", alias = "listing-page")]
    ListingPage,
    #[serde(rename = "json", alias = "json-api")]
    JsonApi,
}

/// Which JSON adapter serves a `json` source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonVariant {
    #[default]
    Plain,
    CookieSession,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "GET")]
    Get,
    #[serde(alias = "POST")]
    Post,
}

/// The earliest datetime a source walk accepts.
///
/// Serialized as a plain string: `"all"` means "discover the oldest datetime
/// from the last page", anything else is an explicit boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum TimeBoundary {
    #[default]
    Discover,
    Since(String),
}

impl From<String> for TimeBoundary {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            TimeBoundary::Discover
        } else {
            TimeBoundary::Since(trimmed.to_string())
        }
    }
}

impl From<TimeBoundary> for String {
    fn from(b: TimeBoundary) -> Self {
        match b {
            TimeBoundary::Discover => "all".to_string(),
            TimeBoundary::Since(s) => s,
        }
    }
}

fn default_max_number() -> usize {
    100
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_datetime_index() -> String {
    "datetime".to_string()
}

fn default_title_index() -> String {
    "title".to_string()
}

fn default_link_index() -> String {
    "link".to_string()
}

fn default_items_key() -> String {
    "items".to_string()
}

fn default_total_pages_key() -> String {
    "totalPage".to_string()
}

/// Static descriptor of one source.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// Filled from the map key when absent.
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(rename = "type")]
    pub style: FetchStyle,
    #[serde(default)]
    pub json_variant: Option<JsonVariant>,
    /// Item quota for one walk.
    #[serde(default = "default_max_number")]
    pub max_number: usize,
    #[serde(default)]
    pub earliest_date_time: TimeBoundary,
    #[serde(default)]
    pub date_regex: Option<String>,
    #[serde(default)]
    pub time_regex: Option<String>,

    #[serde(default)]
    pub base_url: String,
    /// Page URL, relative to `base_url`, with `{n}` for the page number.
    #[serde(default)]
    pub url_template: String,
    /// Item URL, relative to `base_url`, with `{id}` for bare item ids.
    #[serde(default)]
    pub link_template: String,

    // listing pages
    #[serde(default)]
    pub news_module_id_class: Option<String>,
    #[serde(default)]
    pub total_pages_id_class: Option<String>,

    // JSON APIs
    #[serde(default = "default_datetime_index")]
    pub datetime_index: String,
    #[serde(default = "default_title_index")]
    pub title_index: String,
    #[serde(default = "default_link_index")]
    pub link_index: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Form fields sent with POST requests; values may contain `{n}`.
    #[serde(default)]
    pub form: BTreeMap<String, String>,
    #[serde(default = "default_items_key")]
    pub items_key: String,
    #[serde(default = "default_total_pages_key")]
    pub total_pages_key: String,

    // cookie-session APIs
    #[serde(default)]
    pub pub_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,

    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    /// Offset of the source's local clock, used to render epoch timestamps.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl SourceConfig {
    pub fn nick(&self) -> &str {
        self.nick_name.as_deref().unwrap_or(&self.site_name)
    }

    /// Full URL of page `n`: `base_url` + `url_template` with `{n}` replaced.
    pub fn page_url(&self, n: u32) -> String {
        format!("{}{}", self.base_url, self.url_template).replace("{n}", &n.to_string())
    }

    /// `base_url` joined with `link_template`.
    pub fn full_link_template(&self) -> String {
        format!("{}{}", self.base_url, self.link_template)
    }

    /// The JSON variant in effect. Sites named `wxpub_*` are cookie-session
    /// sources unless configured otherwise.
    pub fn effective_json_variant(&self) -> JsonVariant {
        self.json_variant.unwrap_or_else(|| {
            if self.site_name.starts_with("wxpub_") {
                JsonVariant::CookieSession
            } else {
                JsonVariant::Plain
            }
        })
    }

    /// Delay between sequential page requests.
    pub fn cooldown(&self) -> Duration {
        let default = match (self.style, self.effective_json_variant()) {
            (FetchStyle::JsonApi, JsonVariant::CookieSession) => COOKIE_SESSION_COOLDOWN_MS,
            _ => 0,
        };
        Duration::from_millis(self.cooldown_ms.unwrap_or(default))
    }
}

/// Load every source config from `path`.
///
/// A missing `siteName` is filled from its map key; a differing one is
/// overridden by the key.
///
/// # Arguments
///
/// * `path` - A JSON file, or YAML when it ends in `.yaml`/`.yml`
///
/// # Returns
///
/// The configs keyed by source name, in name order.
///
/// # Errors
///
/// Returns [`HarvestError::Config`] if the file cannot be read or decoded.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_source_configs(path: &Path) -> Result<BTreeMap<String, SourceConfig>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HarvestError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut configs: BTreeMap<String, SourceConfig> = decode(path, &raw)?;
    for (name, config) in configs.iter_mut() {
        if config.site_name.is_empty() {
            config.site_name = name.clone();
        } else if &config.site_name != name {
            warn!(key = %name, site_name = %config.site_name, "Config key and siteName differ; using key");
            config.site_name = name.clone();
        }
    }
    debug!(count = configs.len(), "Loaded source configs");
    Ok(configs)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn decode<T: serde::de::DeserializeOwned>(path: &Path, raw: &str) -> Result<T> {
    if is_yaml(path) {
        serde_yaml::from_str(raw)
            .map_err(|e| HarvestError::Config(format!("invalid YAML in {}: {e}", path.display())))
    } else {
        serde_json::from_str(raw)
            .map_err(|e| HarvestError::Config(format!("invalid JSON in {}: {e}", path.display())))
    }
}

/// Which configured sources take part in a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SourceSelection {
    /// `{"zdbk": true, "wxpub_zjdx": false}`
    Flags(BTreeMap<String, bool>),
    /// `["zdbk", "bksy"]`
    Listed(Vec<String>),
}

impl SourceSelection {
    /// Read a selection file (flag mapping or list).
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the file cannot be read or is neither
    /// shape.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HarvestError::Config(format!("cannot read {}: {e}", path.display())))?;
        decode(path, &raw)
    }

    /// Selected source names in a stable order, without repeats.
    pub fn names(&self) -> Vec<String> {
        match self {
            SourceSelection::Flags(flags) => flags
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(name, _)| name.clone())
                .collect(),
            SourceSelection::Listed(names) => names.iter().unique().cloned().collect(),
        }
    }
}
