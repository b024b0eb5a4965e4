//! Paginated JSON APIs.
//!
//! The payload is an object with an item array and a total page count; the
//! key names, the item field names and the request shape (GET, or a form
//! POST whose fields may mention `{n}`) all come from the source config.

use super::{FetchAdapter, check_status, resolve_link};
use crate::config::{HttpMethod, SourceConfig};
use crate::error::{HarvestError, Result};
use crate::models::{RawItem, RawPage};
use itertools::Itertools;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

#[derive(Debug)]
pub struct JsonApiAdapter {
    client: reqwest::Client,
    config: Arc<SourceConfig>,
}

impl JsonApiAdapter {
    pub fn new(client: reqwest::Client, config: Arc<SourceConfig>) -> Self {
        Self { client, config }
    }
}

impl FetchAdapter for JsonApiAdapter {
    #[instrument(level = "debug", skip(self), fields(site = %self.config.site_name))]
    async fn fetch_page(&self, n: u32) -> Result<RawPage> {
        let url = self.config.page_url(n);
        let request = match self.config.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_form(&self.config, n)),
        };
        let response = check_status(request.send().await?)?;
        let body = response.text().await?;
        debug!(%url, bytes = body.len(), "Fetched JSON page");
        parse_json_page(&body, &self.config)
    }
}

/// URL-encode the configured form fields for page `n`.
///
/// # Arguments
///
/// * `config` - Source whose `form` map is encoded
/// * `n` - Page number substituted for `{n}` in every field value
///
/// # Returns
///
/// An `application/x-www-form-urlencoded` body, fields in key order.
pub fn encode_form(config: &SourceConfig, n: u32) -> String {
    let page = n.to_string();
    config
        .form
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(&v.replace("{n}", &page))
            )
        })
        .join("&")
}

/// Decode one JSON page into raw items.
///
/// Entries without a link are skipped. Links are resolved against the
/// source's link template.
///
/// # Arguments
///
/// * `body` - The response body
/// * `config` - Source naming the item array, the total key and the item fields
///
/// # Returns
///
/// The page's items in payload order, with the advertised total when present.
///
/// # Errors
///
/// [`HarvestError::Fetch`] if the body is not JSON or has no item array.
pub fn parse_json_page(body: &str, config: &SourceConfig) -> Result<RawPage> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| HarvestError::Fetch(format!("invalid JSON payload: {e}")))?;

    let entries = payload
        .get(&config.items_key)
        .and_then(Value::as_array)
        .ok_or_else(|| HarvestError::Fetch(format!("payload has no {:?} array", config.items_key)))?;

    let total_pages = payload.get(&config.total_pages_key).and_then(as_page_count);

    let link_template = config.full_link_template();
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let href = field_text(entry, &config.link_index);
        if href.is_empty() {
            trace!(?entry, "Entry without link; skipping");
            continue;
        }
        items.push(RawItem {
            link: resolve_link(&href, &config.base_url, &link_template),
            title: field_text(entry, &config.title_index),
            datetime_text: field_text(entry, &config.datetime_index),
        });
    }
    Ok(RawPage { items, total_pages })
}

/// A field as text: strings verbatim, numbers and booleans stringified.
fn field_text(entry: &Value, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn as_page_count(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
