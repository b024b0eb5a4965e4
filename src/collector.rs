//! Batch collection with error-tolerance buffering.
//!
//! Listings are not perfectly sorted and dates occasionally fail to parse, so
//! a single bad entry must not end a walk. Items that fail the boundary check
//! are parked in an [`ErrorBuffer`]; the next valid item redeems the whole
//! buffer into the batch. Only a run of more than [`MAX_INVALID_RUN`]
//! consecutive invalid items stops the walk, and that run is dropped.

use crate::datetime::{DateTimeExtractor, is_on_or_after};
use crate::models::{NewsItem, RawItem};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Consecutive invalid items tolerated before the walk stops.
pub const MAX_INVALID_RUN: usize = 3;

/// Whether the walk should keep going after an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuotaReached,
    InvalidRun,
}

/// Items waiting for a later valid item to vouch for them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorBuffer {
    items: Vec<NewsItem>,
    run: usize,
}

impl ErrorBuffer {
    /// Park an invalid item and extend the current run.
    pub fn record_invalid(mut self, item: NewsItem) -> Self {
        self.items.push(item);
        self.run += 1;
        self
    }

    /// Release the parked items and reset the run.
    pub fn redeem(self) -> (Vec<NewsItem>, Self) {
        (self.items, Self::default())
    }

    /// Length of the current run of invalid items.
    pub fn run(&self) -> usize {
        self.run
    }

    pub fn exceeded(&self) -> bool {
        self.run > MAX_INVALID_RUN
    }
}

/// Accumulates one source's items for one run, newest first.
#[derive(Debug)]
pub struct BatchCollector {
    quota: usize,
    boundary: String,
    items: Vec<NewsItem>,
    buffer: ErrorBuffer,
    seen: HashSet<String>,
}

impl BatchCollector {
    pub fn new(quota: usize, boundary: impl Into<String>) -> Self {
        Self {
            quota,
            boundary: boundary.into(),
            items: Vec::new(),
            buffer: ErrorBuffer::default(),
            seen: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse a raw item's datetime and offer it.
    ///
    /// An unparsable datetime counts as invalid; if it is later redeemed the
    /// item is kept with an empty datetime.
    pub fn offer_raw(&mut self, raw: RawItem, extractor: &DateTimeExtractor) -> Step {
        let (datetime, valid) = match extractor.extract(&raw.datetime_text) {
            Ok(dt) => {
                let valid = is_on_or_after(&dt, &self.boundary);
                (dt, valid)
            }
            Err(e) => {
                debug!(link = %raw.link, error = %e, "Datetime unparsable; buffering item");
                (String::new(), false)
            }
        };
        self.offer(
            NewsItem {
                link: raw.link,
                title: raw.title,
                datetime,
            },
            valid,
        )
    }

    /// Offer one item whose validity has already been decided.
    pub fn offer(&mut self, item: NewsItem, valid: bool) -> Step {
        if self.items.len() >= self.quota {
            return Step::Stop(StopReason::QuotaReached);
        }
        if !self.seen.insert(item.link.clone()) {
            trace!(link = %item.link, "Duplicate link in batch; skipping");
            return Step::Continue;
        }

        let buffer = std::mem::take(&mut self.buffer);
        if valid {
            let (redeemed, reset) = buffer.redeem();
            if !redeemed.is_empty() {
                debug!(count = redeemed.len(), "Redeeming buffered items");
            }
            self.buffer = reset;
            let room = self.quota - self.items.len();
            self.items.extend(redeemed.into_iter().take(room));
            if self.items.len() < self.quota {
                self.items.push(item);
            }
        } else {
            self.buffer = buffer.record_invalid(item);
        }

        if self.items.len() >= self.quota {
            Step::Stop(StopReason::QuotaReached)
        } else if self.buffer.exceeded() {
            debug!(run = self.buffer.run(), "Too many consecutive invalid items");
            Step::Stop(StopReason::InvalidRun)
        } else {
            Step::Continue
        }
    }

    /// The collected batch, newest first. Unredeemed buffered items are dropped.
    pub fn into_batch(self) -> Vec<NewsItem> {
        if self.buffer.run() > 0 {
            debug!(dropped = self.buffer.run(), "Discarding unredeemed buffered items");
        }
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(i: usize) -> NewsItem {
        NewsItem {
            link: format!("https://example.com/{i}"),
            title: format!("item {i}"),
            datetime: "2024-01-10".to_string(),
        }
    }

    fn links(batch: &[NewsItem]) -> Vec<String> {
        batch.iter().map(|n| n.link.clone()).collect()
    }

    #[test]
    fn test_four_consecutive_invalid_items_stop_the_walk() {
        let mut c = BatchCollector::new(100, "2024-01-01");
        let mut last = Step::Continue;
        let mut offered = 0;
        for i in 1..=10 {
            offered += 1;
            last = c.offer(item(i), i < 5);
            if last != Step::Continue {
                break;
            }
        }
        assert_eq!(last, Step::Stop(StopReason::InvalidRun));
        assert_eq!(offered, 8);
        assert_eq!(links(&c.into_batch()), links(&(1..=4).map(item).collect::<Vec<_>>()));
    }

    #[test]
    fn test_valid_item_redeems_buffered_run_in_order() {
        let mut c = BatchCollector::new(100, "2024-01-01");
        for i in 1..=4 {
            assert_eq!(c.offer(item(i), true), Step::Continue);
        }
        assert_eq!(c.offer(item(5), false), Step::Continue);
        assert_eq!(c.offer(item(6), false), Step::Continue);
        assert_eq!(c.offer(item(7), true), Step::Continue);
        let batch = c.into_batch();
        assert_eq!(links(&batch), links(&(1..=7).map(item).collect::<Vec<_>>()));
    }

    #[test]
    fn test_three_invalid_items_do_not_stop() {
        let mut c = BatchCollector::new(100, "2024-01-01");
        for i in 1..=3 {
            assert_eq!(c.offer(item(i), false), Step::Continue);
        }
        assert_eq!(c.offer(item(4), true), Step::Continue);
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn test_trailing_buffer_is_discarded() {
        let mut c = BatchCollector::new(100, "2024-01-01");
        c.offer(item(1), true);
        c.offer(item(2), false);
        assert_eq!(links(&c.into_batch()), vec![item(1).link]);
    }

    #[test]
    fn test_quota_stops_and_bounds_redemption() {
        let mut c = BatchCollector::new(3, "2024-01-01");
        assert_eq!(c.offer(item(1), true), Step::Continue);
        assert_eq!(c.offer(item(2), false), Step::Continue);
        assert_eq!(c.offer(item(3), false), Step::Continue);
        assert_eq!(c.offer(item(4), true), Step::Stop(StopReason::QuotaReached));
        let batch = c.into_batch();
        assert_eq!(batch.len(), 3);
        assert_eq!(links(&batch), links(&[item(1), item(2), item(3)]));
    }

    #[test]
    fn test_duplicate_links_are_ignored() {
        let mut c = BatchCollector::new(100, "2024-01-01");
        c.offer(item(1), true);
        c.offer(item(1), true);
        c.offer(item(2), true);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_offer_raw_checks_boundary_and_parse_failures() {
        let ex = DateTimeExtractor::default();
        let mut c = BatchCollector::new(100, "2024-01-05");
        let raw = |i: usize, text: &str| RawItem {
            link: format!("https://example.com/{i}"),
            title: format!("item {i}"),
            datetime_text: text.to_string(),
        };
        c.offer_raw(raw(1, "2024-01-09 10:00:00"), &ex);
        c.offer_raw(raw(2, "date drifted"), &ex);
        c.offer_raw(raw(3, "2024-01-04"), &ex);
        c.offer_raw(raw(4, "2024-01-06"), &ex);
        let batch = c.into_batch();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].datetime, "2024-01-09 10:00:00");
        assert_eq!(batch[1].datetime, "");
        assert_eq!(batch[2].datetime, "2024-01-04");
    }

    #[test]
    fn test_error_buffer_transitions() {
        let b = ErrorBuffer::default().record_invalid(item(1)).record_invalid(item(2));
        assert_eq!(b.run(), 2);
        assert!(!b.exceeded());
        let (items, reset) = b.redeem();
        assert_eq!(items.len(), 2);
        assert_eq!(reset, ErrorBuffer::default());
    }
}
