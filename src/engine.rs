//! Pagination and stopping.
//!
//! A [`Paginator`] drives one adapter across pages `1..=N`, newest first,
//! strictly one request at a time. Before walking it settles two things:
//!
//! 1. **How many pages exist**, from page 1's advertised total.
//! 2. **How far back to go**: the configured boundary, or when none is
//!    configured, the datetime of the oldest entry on the last page.
//!
//! Upstream page counts are noisy and often overstate the real number of
//! pages. Discovery therefore walks the probe backwards from the advertised
//! last page until a page actually yields a datetime, and the walk then uses
//! that corrected count.
//!
//! The walk ends early when the [`BatchCollector`] says so (quota reached or
//! too many consecutive invalid items); that truncates the walk, it does not
//! fail it.

use crate::collector::{BatchCollector, Step};
use crate::config::{SourceConfig, TimeBoundary};
use crate::datetime::DateTimeExtractor;
use crate::error::{HarvestError, Result};
use crate::models::{NewsItem, RawPage};
use crate::scrapers::FetchAdapter;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// What a completed walk produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest {
    /// Newest first, as discovered.
    pub items: Vec<NewsItem>,
    /// The effective time boundary of the walk.
    pub boundary: String,
    /// Pages considered, after any discovery correction.
    pub total_pages: u32,
}

pub struct Paginator<A> {
    adapter: A,
    site: String,
    quota: usize,
    boundary: TimeBoundary,
    extractor: DateTimeExtractor,
    cooldown: Duration,
}

impl<A: FetchAdapter> Paginator<A> {
    /// # Errors
    ///
    /// [`HarvestError::Config`] if the source's date or time pattern is invalid.
    pub fn new(adapter: A, config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            adapter,
            site: config.site_name.clone(),
            quota: config.max_number,
            boundary: config.earliest_date_time.clone(),
            extractor: DateTimeExtractor::new(
                config.date_regex.as_deref(),
                config.time_regex.as_deref(),
            )?,
            cooldown: config.cooldown(),
        })
    }

    /// Replace the configured boundary, e.g. with one taken from the ledger.
    pub fn with_boundary(mut self, boundary: TimeBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    async fn pause(&self) {
        if !self.cooldown.is_zero() {
            sleep(self.cooldown).await;
        }
    }

    /// Fetch page 1 and read the number of pages it advertises.
    ///
    /// Page 1 is handed back so the walk can reuse it instead of fetching it
    /// again.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Fetch`] if page 1 cannot be fetched or carries no total.
    pub async fn get_total_pages(&self) -> Result<(RawPage, u32)> {
        let page = self.adapter.fetch_page(1).await?;
        let total = page.total_pages.ok_or_else(|| {
            HarvestError::Fetch(format!("{}: total page count unavailable", self.site))
        })?;
        Ok((page, total))
    }

    /// Datetime of the oldest entry, probing backwards from page `total_pages`.
    ///
    /// Returns the datetime together with the page count that actually held
    /// it. Pages that yield no datable entry, or fail to load, are skipped
    /// while earlier pages remain.
    ///
    /// # Errors
    ///
    /// [`HarvestError::Fetch`] when no page down to page 1 yields a datetime,
    /// or when page 1 itself fails.
    #[instrument(level = "info", skip(self), fields(site = %self.site))]
    pub async fn get_oldest_datetime(&self, total_pages: u32) -> Result<(String, u32)> {
        let mut pages = total_pages;
        while pages >= 1 {
            match self.adapter.fetch_page(pages).await {
                Ok(page) => {
                    if let Some(oldest) = self.oldest_in(&page) {
                        if pages < total_pages {
                            info!(advertised = total_pages, actual = pages, "Corrected overstated page count");
                        }
                        return Ok((oldest, pages));
                    }
                    warn!(page = pages, "Probed page has no datable entries; trying the previous one");
                }
                Err(e) if pages > 1 => {
                    warn!(page = pages, error = %e, "Probed page failed; trying the previous one");
                }
                Err(e) => return Err(e),
            }
            pages -= 1;
            if pages >= 1 {
                self.pause().await;
            }
        }
        Err(HarvestError::Fetch(format!(
            "{}: could not determine the oldest datetime",
            self.site
        )))
    }

    /// The last entry on a page with a parseable datetime.
    fn oldest_in(&self, page: &RawPage) -> Option<String> {
        page.items
            .iter()
            .rev()
            .find_map(|item| self.extractor.extract(&item.datetime_text).ok())
    }

    /// The effective boundary and page count for a walk over `total_pages`.
    pub async fn resolve_boundary(&self, total_pages: u32) -> Result<(String, u32)> {
        match &self.boundary {
            TimeBoundary::Since(b) => Ok((b.clone(), total_pages)),
            TimeBoundary::Discover if total_pages == 0 => Ok((String::new(), 0)),
            TimeBoundary::Discover => {
                self.pause().await;
                self.get_oldest_datetime(total_pages).await
            }
        }
    }

    /// Walk pages `1..=total_pages` collecting items on or after `boundary`.
    ///
    /// `first` is an already fetched page 1; when `None` it is requested like
    /// any other page. Pages after the first wait out the cool-down.
    #[instrument(level = "info", skip(self, first), fields(site = %self.site))]
    pub async fn walk(
        &self,
        mut first: Option<RawPage>,
        total_pages: u32,
        boundary: &str,
    ) -> Result<Vec<NewsItem>> {
        let mut collector = BatchCollector::new(self.quota, boundary);

        'pages: for n in 1..=total_pages {
            let page = match first.take() {
                Some(page) if n == 1 => page,
                _ => {
                    if n > 1 {
                        self.pause().await;
                    }
                    self.adapter.fetch_page(n).await?
                }
            };
            debug!(page = n, entries = page.items.len(), "Processing page");
            for raw in page.items {
                if let Step::Stop(reason) = collector.offer_raw(raw, &self.extractor) {
                    info!(page = n, ?reason, collected = collector.len(), "Stopping walk");
                    break 'pages;
                }
            }
        }

        if collector.is_empty() {
            debug!(total_pages, %boundary, "Walk collected nothing");
        }
        Ok(collector.into_batch())
    }

    /// Total pages, then boundary, then the walk.
    #[instrument(level = "info", skip(self), fields(site = %self.site))]
    pub async fn harvest(&self) -> Result<Harvest> {
        let (first, advertised) = self.get_total_pages().await?;
        let (boundary, total_pages) = self.resolve_boundary(advertised).await?;
        debug!(%boundary, total_pages, "Resolved walk bounds");
        let first = if total_pages >= 1 { Some(first) } else { None };
        let items = self.walk(first, total_pages, &boundary).await?;
        Ok(Harvest {
            items,
            boundary,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawItem;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Serves canned pages; every page advertises `advertised` total pages.
    struct FakeSource {
        pages: BTreeMap<u32, Vec<RawItem>>,
        advertised: u32,
        requests: Mutex<Vec<u32>>,
    }

    impl FakeSource {
        fn new(pages: Vec<Vec<RawItem>>, advertised: u32) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| (i as u32 + 1, p))
                    .collect(),
                advertised,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<u32> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl FetchAdapter for FakeSource {
        async fn fetch_page(&self, n: u32) -> Result<RawPage> {
            self.requests.lock().unwrap().push(n);
            Ok(RawPage {
                items: self.pages.get(&n).cloned().unwrap_or_default(),
                total_pages: Some(self.advertised),
            })
        }
    }

    fn raw(i: usize, datetime: &str) -> RawItem {
        RawItem {
            link: format!("https://example.com/{i}"),
            title: format!("item {i}"),
            datetime_text: datetime.to_string(),
        }
    }

    fn config(max_number: usize, earliest: &str) -> SourceConfig {
        serde_json::from_value(serde_json::json!({
            "siteName": "fake",
            "type": "page",
            "maxNumber": max_number,
            "earliestDateTime": earliest
        }))
        .unwrap()
    }

    fn config_with_cooldown(max_number: usize, earliest: &str, cooldown_ms: u64) -> SourceConfig {
        let mut config = config(max_number, earliest);
        config.cooldown_ms = Some(cooldown_ms);
        config
    }

    /// Page of `count` entries, one day apart, counting down from `start_day`.
    fn dated_page(first_index: usize, start_day: u32, count: usize) -> Vec<RawItem> {
        (0..count)
            .map(|k| raw(first_index + k, &format!("2024-03-{:02} 12:00:00", start_day - k as u32)))
            .collect()
    }

    #[tokio::test]
    async fn test_total_pages_from_first_page() {
        let source = FakeSource::new(vec![dated_page(1, 30, 2)], 7);
        let p = Paginator::new(source, &config(100, "all")).unwrap();
        let (first, total) = p.get_total_pages().await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(first.items.len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_tolerates_overstated_total() {
        let source = FakeSource::new(vec![dated_page(1, 30, 10), dated_page(11, 20, 10)], 3);
        let p = Paginator::new(source, &config(100, "all")).unwrap();
        let (oldest, pages) = p.get_oldest_datetime(3).await.unwrap();
        assert_eq!(oldest, "2024-03-11 12:00:00");
        assert_eq!(pages, 2);
    }

    #[tokio::test]
    async fn test_discovery_fails_when_no_page_has_items() {
        let source = FakeSource::new(vec![], 2);
        let p = Paginator::new(source, &config(100, "all")).unwrap();
        let err = p.get_oldest_datetime(2).await.unwrap_err();
        assert!(matches!(err, HarvestError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_walk_stops_after_four_invalid_items() {
        let mut page: Vec<RawItem> = dated_page(1, 30, 4);
        page.extend((5..=8).map(|i| raw(i, "garbled")));
        page.extend(dated_page(9, 20, 2));
        let source = FakeSource::new(vec![page.clone(), page], 2);
        let p = Paginator::new(source, &config(100, "2024-01-01")).unwrap();
        let batch = p.walk(None, 2, "2024-01-01").await.unwrap();
        let links: Vec<_> = batch.iter().map(|n| n.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://example.com/1",
                "https://example.com/2",
                "https://example.com/3",
                "https://example.com/4"
            ]
        );
        assert_eq!(p.adapter.requests(), vec![1]);
    }

    #[tokio::test]
    async fn test_walk_redeems_buffered_items() {
        let mut page = dated_page(1, 30, 4);
        page.push(raw(5, "garbled"));
        page.push(raw(6, "2023-12-01"));
        page.push(raw(7, "2024-03-20"));
        let source = FakeSource::new(vec![page], 1);
        let p = Paginator::new(source, &config(100, "2024-01-01")).unwrap();
        let batch = p.walk(None, 1, "2024-01-01").await.unwrap();
        let titles: Vec<_> = batch.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["item 1", "item 2", "item 3", "item 4", "item 5", "item 6", "item 7"]
        );
    }

    #[tokio::test]
    async fn test_harvest_two_pages_quota_fifteen() {
        let source = FakeSource::new(vec![dated_page(1, 30, 10), dated_page(11, 20, 10)], 2);
        let p = Paginator::new(source, &config(15, "2024-01-01")).unwrap();
        let harvest = p.harvest().await.unwrap();
        assert_eq!(harvest.items.len(), 15);
        assert_eq!(harvest.items[0].link, "https://example.com/1");
        assert_eq!(harvest.items[14].link, "https://example.com/15");
        // page 1 is fetched once and reused by the walk
        assert_eq!(p.adapter.requests(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_harvest_with_discovered_boundary() {
        let source = FakeSource::new(vec![dated_page(1, 30, 10), dated_page(11, 20, 5)], 3);
        let p = Paginator::new(source, &config(100, "all")).unwrap();
        let harvest = p.harvest().await.unwrap();
        assert_eq!(harvest.boundary, "2024-03-16 12:00:00");
        assert_eq!(harvest.total_pages, 2);
        assert_eq!(harvest.items.len(), 15);
    }

    #[tokio::test]
    async fn test_boundary_excludes_older_items() {
        let source = FakeSource::new(vec![dated_page(1, 30, 10)], 1);
        let p = Paginator::new(source, &config(100, "2024-03-25"))
            .unwrap()
            .with_boundary(TimeBoundary::Since("2024-03-25".into()));
        let harvest = p.harvest().await.unwrap();
        // days 30..=25 pass; 24..=21 form a run of four invalid items
        assert_eq!(harvest.items.len(), 6);
        assert!(harvest.items.iter().all(|n| n.datetime.as_str() >= "2024-03-25"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_waits_cooldown_between_pages() {
        let pages = vec![dated_page(1, 30, 5), dated_page(6, 25, 5), dated_page(11, 20, 5)];
        let source = FakeSource::new(pages, 3);
        let p = Paginator::new(source, &config_with_cooldown(100, "2024-01-01", 1000)).unwrap();
        let started = tokio::time::Instant::now();
        let batch = p.walk(None, 3, "2024-01-01").await.unwrap();
        assert_eq!(batch.len(), 15);
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(p.adapter.requests(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_harvest_reuses_first_page_without_cooldown() {
        let source = FakeSource::new(vec![dated_page(1, 30, 5)], 1);
        let p = Paginator::new(source, &config_with_cooldown(100, "2024-01-01", 1000)).unwrap();
        let started = tokio::time::Instant::now();
        let harvest = p.harvest().await.unwrap();
        assert_eq!(harvest.items.len(), 5);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
