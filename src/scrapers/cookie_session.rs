//! Cookie-authenticated publication API (official-account article lists).
//!
//! Requests carry a session cookie read from an external file plus the
//! browser-like headers the provider expects. The response nests its data
//! as JSON strings inside JSON: `publish_page` is itself encoded, and so is
//! every entry's `publish_info`. Publication times arrive as epoch seconds
//! and are rendered on the source's local clock.

use super::{FetchAdapter, check_status};
use crate::config::SourceConfig;
use crate::datetime::{fixed_offset, from_epoch_seconds};
use crate::error::{HarvestError, Result};
use crate::models::{RawItem, RawPage};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://mp.weixin.qq.com/cgi-bin/appmsgpublish";
const DEFAULT_PAGE_SIZE: u32 = 10;
/// The provider's `total_count` is divided by this to estimate the page count.
const TOTAL_COUNT_PER_PAGE: u64 = 5;
const RATE_LIMIT_MESSAGE: &str = "freq control";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

#[derive(Debug)]
pub struct CookieSessionAdapter {
    client: reqwest::Client,
    config: Arc<SourceConfig>,
    cookie: String,
    offset: FixedOffset,
}

impl CookieSessionAdapter {
    /// Read the session cookie and prepare the adapter.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the cookie file cannot be read or is
    /// empty, or if the source has no `pubId`.
    pub async fn new(
        client: reqwest::Client,
        config: Arc<SourceConfig>,
        cookie_file: &Path,
    ) -> Result<Self> {
        if config.pub_id.is_none() {
            return Err(HarvestError::Config(format!(
                "{}: pubId is required",
                config.site_name
            )));
        }
        let cookie = tokio::fs::read_to_string(cookie_file)
            .await
            .map_err(|e| {
                HarvestError::Config(format!("cannot read cookie file {}: {e}", cookie_file.display()))
            })?
            .trim()
            .to_string();
        if cookie.is_empty() {
            return Err(HarvestError::Config(format!(
                "cookie file {} is empty",
                cookie_file.display()
            )));
        }
        Ok(Self {
            client,
            offset: fixed_offset(config.utc_offset_hours),
            config,
            cookie,
        })
    }

    fn endpoint(&self) -> String {
        let configured = format!("{}{}", self.config.base_url, self.config.url_template);
        if configured.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            configured
        }
    }

    fn page_url(&self, n: u32) -> Result<Url> {
        let page_size = self.config.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let begin = begin_offset(n, page_size).to_string();
        let count = page_size.to_string();
        let token = self.config.token.clone().unwrap_or_default();
        let fakeid = self.config.pub_id.clone().unwrap_or_default();
        Url::parse_with_params(
            &self.endpoint(),
            &[
                ("sub", "list"),
                ("search_field", ""),
                ("begin", begin.as_str()),
                ("count", count.as_str()),
                ("query", ""),
                ("fakeid", fakeid.as_str()),
                ("type", "101_1"),
                ("free_publish_type", "1"),
                ("sub_action", "list_ex"),
                ("token", token.as_str()),
                ("lang", "zh_CN"),
                ("f", "json"),
                ("ajax", "1"),
            ],
        )
        .map_err(|e| HarvestError::Config(format!("invalid endpoint {}: {e}", self.endpoint())))
    }

    fn referer(&self) -> String {
        let token = self.config.token.as_deref().unwrap_or_default();
        let timestamp = chrono::Utc::now().timestamp() - 100;
        format!(
            "https://mp.weixin.qq.com/cgi-bin/appmsg?t=media/appmsg_edit_v2&action=edit&isNew=1&type=77&createType=0&token={token}&lang=zh_CN&timestamp={timestamp}"
        )
    }
}

/// Index of the first article on page `n`, widened so large pages cannot overflow.
fn begin_offset(n: u32, page_size: u32) -> u64 {
    u64::from(n.saturating_sub(1)) * u64::from(page_size)
}

impl FetchAdapter for CookieSessionAdapter {
    #[instrument(level = "debug", skip(self), fields(site = %self.config.site_name))]
    async fn fetch_page(&self, n: u32) -> Result<RawPage> {
        let url = self.page_url(n)?;
        let response = self
            .client
            .get(url)
            .header("accept", "*/*")
            .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6")
            .header(
                "sec-ch-ua",
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Microsoft Edge\";v=\"120\"",
            )
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "same-origin")
            .header("x-requested-with", "XMLHttpRequest")
            .header("cookie", &self.cookie)
            .header("referer", self.referer())
            .header("referrer-policy", "strict-origin-when-cross-origin")
            .header("user-agent", USER_AGENT)
            .send()
            .await?;
        let body = check_status(response)?.text().await?;
        debug!(page = n, bytes = body.len(), "Fetched publication page");
        parse_publish_page(&body, self.offset)
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(default)]
    base_resp: Option<BaseResp>,
    #[serde(default)]
    publish_page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BaseResp {
    #[serde(default)]
    ret: i64,
    #[serde(default)]
    err_msg: String,
}

#[derive(Debug, Deserialize)]
struct PublishPage {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    publish_list: Vec<PublishEntry>,
}

#[derive(Debug, Deserialize)]
struct PublishEntry {
    #[serde(default)]
    publish_info: String,
}

#[derive(Debug, Deserialize)]
struct PublishInfo {
    sent_info: SentInfo,
    #[serde(default)]
    appmsgex: Vec<AppMsg>,
}

#[derive(Debug, Deserialize)]
struct SentInfo {
    time: i64,
}

#[derive(Debug, Deserialize)]
struct AppMsg {
    link: String,
    title: String,
}

/// Normalize one provider response into the common page shape.
///
/// # Arguments
///
/// * `body` - The raw response, with `publish_page` still string-encoded
/// * `offset` - Clock used to render each article's epoch publish time
///
/// # Returns
///
/// The first article of every decodable entry, and a page count of
/// `ceil(total_count / 5)`.
///
/// # Errors
///
/// [`HarvestError::RateLimited`] when the provider answers `freq control`.
/// [`HarvestError::Fetch`] for any other unexpected shape, including a
/// `total_count` whose page count does not fit in `u32`.
pub fn parse_publish_page(body: &str, offset: FixedOffset) -> Result<RawPage> {
    let response: PublishResponse = serde_json::from_str(body)
        .map_err(|e| HarvestError::Fetch(format!("invalid publish response: {e}")))?;
    let base = response.base_resp.unwrap_or_default();
    if base.err_msg == RATE_LIMIT_MESSAGE {
        return Err(HarvestError::RateLimited(base.err_msg));
    }
    let encoded = response.publish_page.ok_or_else(|| {
        HarvestError::Fetch(format!(
            "no publish_page in response (ret={}, err_msg={:?})",
            base.ret, base.err_msg
        ))
    })?;
    let page: PublishPage = serde_json::from_str(&encoded)
        .map_err(|e| HarvestError::Fetch(format!("invalid publish_page: {e}")))?;

    let mut items = Vec::with_capacity(page.publish_list.len());
    for entry in &page.publish_list {
        let info: PublishInfo = match serde_json::from_str(&entry.publish_info) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable publish_info");
                continue;
            }
        };
        let Some(article) = info.appmsgex.into_iter().next() else {
            continue;
        };
        let datetime_text = match from_epoch_seconds(info.sent_info.time, offset) {
            Ok(dt) => dt,
            Err(e) => {
                warn!(error = %e, "Unrepresentable publish time");
                String::new()
            }
        };
        items.push(RawItem {
            link: article.link,
            title: article.title,
            datetime_text,
        });
    }

    let total_pages = u32::try_from(page.total_count.div_ceil(TOTAL_COUNT_PER_PAGE)).map_err(|_| {
        HarvestError::Fetch(format!("implausible total_count {}", page.total_count))
    })?;
    Ok(RawPage {
        items,
        total_pages: Some(total_pages),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publish_body(total_count: u64, times: &[(i64, &str)]) -> String {
        let list: Vec<serde_json::Value> = times
            .iter()
            .map(|(time, title)| {
                let info = serde_json::json!({
                    "sent_info": {"time": time},
                    "appmsgex": [{"link": format!("https://mp.example.com/s/{title}"), "title": title}]
                });
                serde_json::json!({"publish_info": info.to_string()})
            })
            .collect();
        let page = serde_json::json!({"total_count": total_count, "publish_list": list});
        serde_json::json!({
            "base_resp": {"ret": 0, "err_msg": "ok"},
            "publish_page": page.to_string()
        })
        .to_string()
    }

    #[test]
    fn test_parse_double_encoded_payload() {
        let body = publish_body(23, &[(1_704_067_200, "first"), (1_703_980_800, "second")]);
        let page = parse_publish_page(&body, fixed_offset(8)).unwrap();
        assert_eq!(page.total_pages, Some(5));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "first");
        assert_eq!(page.items[0].datetime_text, "2024-01-01 08:00:00");
        assert_eq!(page.items[1].datetime_text, "2023-12-31 08:00:00");
    }

    #[test]
    fn test_freq_control_is_rate_limited() {
        let body = r#"{"base_resp": {"ret": 200013, "err_msg": "freq control"}}"#;
        let err = parse_publish_page(body, fixed_offset(8)).unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_expired_session_is_fetch_error() {
        let body = r#"{"base_resp": {"ret": 200003, "err_msg": "invalid session"}}"#;
        let err = parse_publish_page(body, fixed_offset(8)).unwrap_err();
        assert!(matches!(err, HarvestError::Fetch(_)));
    }

    #[test]
    fn test_implausible_total_count_is_fetch_error() {
        let body = publish_body(u64::MAX, &[(1_704_067_200, "first")]);
        let err = parse_publish_page(&body, fixed_offset(8)).unwrap_err();
        assert!(matches!(err, HarvestError::Fetch(_)));
    }

    #[test]
    fn test_begin_offset_does_not_overflow() {
        assert_eq!(begin_offset(1, 10), 0);
        assert_eq!(begin_offset(3, 10), 20);
        assert_eq!(
            begin_offset(u32::MAX, u32::MAX),
            u64::from(u32::MAX - 1) * u64::from(u32::MAX)
        );
    }

    #[tokio::test]
    async fn test_missing_cookie_file_is_config_error() {
        let config: SourceConfig = serde_json::from_str(
            r#"{"siteName": "wxpub_demo", "type": "json", "pubId": "MzA"}"#,
        )
        .unwrap();
        let err = CookieSessionAdapter::new(
            reqwest::Client::new(),
            Arc::new(config),
            Path::new("/nonexistent/cookie.txt"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[tokio::test]
    async fn test_fetch_sends_cookie_and_paging_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/appmsgpublish"))
            .and(query_param("begin", "10"))
            .and(query_param("fakeid", "MzA"))
            .and(header("cookie", "session=abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(publish_body(8, &[(1_704_067_200, "x")])),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cookie_file = dir.path().join("cookie.txt");
        std::fs::write(&cookie_file, "session=abc\n").unwrap();

        let config: SourceConfig = serde_json::from_value(serde_json::json!({
            "siteName": "wxpub_demo",
            "type": "json",
            "pubId": "MzA",
            "token": "123",
            "baseUrl": server.uri(),
            "urlTemplate": "/cgi-bin/appmsgpublish"
        }))
        .unwrap();
        let adapter = CookieSessionAdapter::new(reqwest::Client::new(), Arc::new(config), &cookie_file)
            .await
            .unwrap();
        let page = adapter.fetch_page(2).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_pages, Some(2));
    }
}
