//! Fetch adapters: one page of raw items per call.
//!
//! Every source is served by one adapter chosen from its config:
//!
//! | Config | Adapter | Transport | Notes |
//! |--------|---------|-----------|-------|
//! | `type: page` | [`listing::ListingAdapter`] | GET + HTML | total pages from a `"current/total"` label |
//! | `type: json` | [`json_api::JsonApiAdapter`] | GET or form POST | `items` / `totalPage` read from the payload |
//! | `type: json`, cookie session | [`cookie_session::CookieSessionAdapter`] | GET + session cookie | double-encoded payload, throttling detection |
//!
//! Adapters resolve links to absolute URLs but leave datetimes as raw text;
//! parsing belongs to the batch collector so that failures can be buffered.
//! [`retry::RateLimitRetry`] wraps any adapter to absorb provider throttling.

pub mod cookie_session;
pub mod json_api;
pub mod listing;
pub mod retry;

use crate::config::{FetchStyle, JsonVariant, SourceConfig};
use crate::error::{HarvestError, Result};
use crate::models::RawPage;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Retrieves one page of raw items for a source.
pub trait FetchAdapter {
    /// Fetch page `n` (1-based, newest first).
    ///
    /// # Errors
    ///
    /// [`HarvestError::Fetch`] on transport or payload-shape failures,
    /// [`HarvestError::RateLimited`] when the provider signals throttling.
    async fn fetch_page(&self, n: u32) -> Result<RawPage>;
}

/// The adapter variants, selected by configuration.
#[derive(Debug)]
pub enum SourceAdapter {
    Listing(listing::ListingAdapter),
    Json(json_api::JsonApiAdapter),
    CookieSession(cookie_session::CookieSessionAdapter),
}

impl SourceAdapter {
    /// Build the adapter a source's config asks for.
    ///
    /// # Arguments
    ///
    /// * `config` - The source's static descriptor
    /// * `client` - Shared HTTP client, already carrying the request timeout
    /// * `cookie_file` - Session cookie, only read for cookie-session sources
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the listing selectors are invalid, or a
    /// cookie-session source lacks its `pubId` or a readable cookie.
    pub async fn from_config(
        config: Arc<SourceConfig>,
        client: reqwest::Client,
        cookie_file: &Path,
    ) -> Result<Self> {
        match (config.style, config.effective_json_variant()) {
            (FetchStyle::ListingPage, _) => {
                Ok(SourceAdapter::Listing(listing::ListingAdapter::new(client, config)?))
            }
            (FetchStyle::JsonApi, JsonVariant::Plain) => {
                Ok(SourceAdapter::Json(json_api::JsonApiAdapter::new(client, config)))
            }
            (FetchStyle::JsonApi, JsonVariant::CookieSession) => Ok(SourceAdapter::CookieSession(
                cookie_session::CookieSessionAdapter::new(client, config, cookie_file).await?,
            )),
        }
    }
}

impl FetchAdapter for SourceAdapter {
    async fn fetch_page(&self, n: u32) -> Result<RawPage> {
        match self {
            SourceAdapter::Listing(a) => a.fetch_page(n).await,
            SourceAdapter::Json(a) => a.fetch_page(n).await,
            SourceAdapter::CookieSession(a) => a.fetch_page(n).await,
        }
    }
}

/// Fail on non-2xx responses.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HarvestError::Fetch(format!(
            "HTTP error {} from {}",
            status,
            response.url()
        )))
    }
}

/// Turn an item reference into an absolute URL.
///
/// - `http(s)://…` is kept as is
/// - `/path` is appended to `link_template` (`base_url` + the configured
///   link prefix), keeping any path the prefix carries
/// - anything else is a bare id substituted into `link_template`'s `{id}`,
///   or joined onto `base_url` when the template has no placeholder
///
/// # Arguments
///
/// * `href` - The link as the source published it
/// * `base_url` - The source's site root
/// * `link_template` - `base_url` followed by the configured link prefix
///
/// # Returns
///
/// The absolute URL stored with the news item.
pub fn resolve_link(href: &str, base_url: &str, link_template: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with('/') {
        return format!("{link_template}{href}");
    }
    if link_template.contains("{id}") {
        return link_template.replace("{id}", href);
    }
    match Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{link_template}{href}"),
    }
}
