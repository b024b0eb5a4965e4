//! Paginated HTML listing pages.
//!
//! Each page carries a news module (an element holding one `li` per entry)
//! and a pagination label such as `1/37`. Per entry the first `a` gives the
//! link and title; the entry's full text carries the date.

use super::{FetchAdapter, check_status, resolve_link};
use crate::config::SourceConfig;
use crate::error::{HarvestError, Result};
use crate::models::{RawItem, RawPage};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

static PAGE_OF_TOTAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").unwrap());
static BARE_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug)]
pub struct ListingAdapter {
    client: reqwest::Client,
    config: Arc<SourceConfig>,
    module_selector: String,
    total_selector: Option<String>,
}

impl ListingAdapter {
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the news module selector is missing or
    /// either selector does not parse.
    pub fn new(client: reqwest::Client, config: Arc<SourceConfig>) -> Result<Self> {
        let module_selector = config.news_module_id_class.clone().ok_or_else(|| {
            HarvestError::Config(format!("{}: newsModuleIdClass is required", config.site_name))
        })?;
        parse_selector(&module_selector)?;
        if let Some(total) = &config.total_pages_id_class {
            parse_selector(total)?;
        }
        Ok(Self {
            client,
            total_selector: config.total_pages_id_class.clone(),
            module_selector,
            config,
        })
    }
}

impl FetchAdapter for ListingAdapter {
    #[instrument(level = "debug", skip(self), fields(site = %self.config.site_name))]
    async fn fetch_page(&self, n: u32) -> Result<RawPage> {
        let url = self.config.page_url(n);
        let response = check_status(self.client.get(&url).send().await?)?;
        let body = response.text().await?;
        debug!(%url, bytes = body.len(), "Fetched listing page");
        parse_listing(
            &body,
            &self.module_selector,
            self.total_selector.as_deref(),
            &self.config.base_url,
            &self.config.full_link_template(),
        )
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Config(format!("invalid selector {css:?}: {e}")))
}

/// Extract entries and the advertised page count from one listing page.
///
/// A page without the news module yields no items rather than an error, so
/// that probing past the real last page is survivable.
///
/// # Arguments
///
/// * `html` - The listing page
/// * `module_selector` - CSS selector of the element holding the `li` entries
/// * `total_selector` - CSS selector of the `current/total` label, if any
/// * `base_url` - The source's site root
/// * `link_template` - `base_url` followed by the configured link prefix
///
/// # Errors
///
/// [`HarvestError::Config`] if a selector does not parse.
pub fn parse_listing(
    html: &str,
    module_selector: &str,
    total_selector: Option<&str>,
    base_url: &str,
    link_template: &str,
) -> Result<RawPage> {
    let module_sel = parse_selector(module_selector)?;
    let li_sel = parse_selector("li")?;
    let a_sel = parse_selector("a")?;
    let document = Html::parse_document(html);

    let total_pages = match total_selector {
        Some(css) => {
            let sel = parse_selector(css)?;
            document
                .select(&sel)
                .next()
                .and_then(|el| parse_total_pages(&el.text().collect::<String>()))
        }
        None => None,
    };

    let Some(module) = document.select(&module_sel).next() else {
        warn!(selector = module_selector, "News module not found on page");
        return Ok(RawPage {
            items: Vec::new(),
            total_pages,
        });
    };

    let mut items = Vec::new();
    for li in module.select(&li_sel) {
        let Some(anchor) = li.select(&a_sel).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let title = anchor
            .value()
            .attr("title")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| anchor.text().collect::<String>().trim().to_string());
        items.push(RawItem {
            link: resolve_link(href, base_url, link_template),
            title,
            datetime_text: li.text().collect::<Vec<_>>().join(" "),
        });
    }

    Ok(RawPage { items, total_pages })
}

/// Read a page count from a label like `1/37`, or from a bare number.
///
/// # Returns
///
/// The total of a `current/total` label, else the first bare number, else
/// `None`.
pub fn parse_total_pages(text: &str) -> Option<u32> {
    if let Some(caps) = PAGE_OF_TOTAL_RE.captures(text) {
        return caps[2].parse().ok();
    }
    BARE_COUNT_RE.find(text).and_then(|m| m.as_str().parse().ok())
}
