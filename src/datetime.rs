//! Datetime extraction and normalization.
//!
//! Every item datetime is normalized to `YYYY-MM-DD` or
//! `YYYY-MM-DD HH:MM:SS`. Both forms are zero-padded, so comparing them as
//! strings orders them chronologically, and a date-only boundary sorts before
//! every timestamp of the same day.

use crate::error::{HarvestError, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DEFAULT_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
static DEFAULT_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{2}:\d{2}:\d{2}").unwrap());

/// Pulls a normalized datetime out of free text using a date and a time pattern.
#[derive(Debug, Clone)]
pub struct DateTimeExtractor {
    date_re: Regex,
    time_re: Regex,
}

impl Default for DateTimeExtractor {
    fn default() -> Self {
        Self {
            date_re: DEFAULT_DATE_RE.clone(),
            time_re: DEFAULT_TIME_RE.clone(),
        }
    }
}

impl DateTimeExtractor {
    /// Build an extractor from optional per-source patterns.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] if either pattern is not a valid regex.
    pub fn new(date_pattern: Option<&str>, time_pattern: Option<&str>) -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| HarvestError::Config(format!("invalid pattern {p:?}: {e}")))
        };
        Ok(Self {
            date_re: match date_pattern {
                Some(p) => compile(p)?,
                None => DEFAULT_DATE_RE.clone(),
            },
            time_re: match time_pattern {
                Some(p) => compile(p)?,
                None => DEFAULT_TIME_RE.clone(),
            },
        })
    }

    /// Extract `date[ time]` from `text`.
    ///
    /// Slashes in the date are normalized to dashes. A missing time is not an
    /// error; a missing date is.
    pub fn extract(&self, text: &str) -> Result<String> {
        let date = self
            .date_re
            .find(text)
            .map(|m| m.as_str().replace('/', "-"))
            .ok_or_else(|| {
                HarvestError::DateTimeParse(format!(
                    "no date in {:?}",
                    crate::utils::truncate_for_log(text.trim(), 80)
                ))
            })?;
        match self.time_re.find(text) {
            Some(time) => Ok(format!("{} {}", date, time.as_str())),
            None => Ok(date),
        }
    }
}

/// Whether `datetime` is on or after `boundary`. Empty datetimes never are.
pub fn is_on_or_after(datetime: &str, boundary: &str) -> bool {
    !datetime.is_empty() && datetime >= boundary
}

/// The `YYYY-MM-DD` prefix of a normalized timestamp.
pub fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

/// A fixed UTC offset in whole hours, falling back to UTC when out of range.
pub fn fixed_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// Render epoch seconds as `YYYY-MM-DD HH:MM:SS` on the given local clock.
pub fn from_epoch_seconds(secs: i64, offset: FixedOffset) -> Result<String> {
    let utc = DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| HarvestError::DateTimeParse(format!("epoch {secs} out of range")))?;
    Ok(utc
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string())
}
