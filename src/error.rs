//! Error taxonomy for the harvesting pipeline.
//!
//! Errors are classified by how far they are allowed to travel:
//!
//! | Variant | Raised by | Contained by |
//! |---------|-----------|--------------|
//! | [`HarvestError::DateTimeParse`] | datetime extraction | the batch collector (never surfaced) |
//! | [`HarvestError::RateLimited`] | cookie-session adapter | the retry decorator, then becomes `Fetch` |
//! | [`HarvestError::Fetch`] | adapters, pagination engine | the orchestrator (source marked failed) |
//! | [`HarvestError::Persistence`] | snapshot / ledger writers | the orchestrator (source marked failed) |
//! | [`HarvestError::Config`] | config loading, adapter construction | the orchestrator |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Transport or payload-shape failure while retrieving a page.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Provider-side throttling signal.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A single item's datetime could not be extracted.
    #[error("datetime parse error: {0}")]
    DateTimeParse(String),

    /// Snapshot, ledger or log write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Whether the error is a provider throttling signal worth a cool-down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HarvestError::RateLimited(_))
    }

    /// Collapse a rate-limit error into a plain fetch error once retries are exhausted.
    pub fn into_fetch(self) -> Self {
        match self {
            HarvestError::RateLimited(msg) => HarvestError::Fetch(format!("rate limited: {msg}")),
            other => other,
        }
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HarvestError::Fetch(format!("request timed out: {e}"))
        } else {
            HarvestError::Fetch(e.to_string())
        }
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(e: std::io::Error) -> Self {
        HarvestError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_collapses_to_fetch() {
        let e = HarvestError::RateLimited("freq control".into()).into_fetch();
        assert!(matches!(e, HarvestError::Fetch(ref m) if m.contains("freq control")));
        assert!(!e.is_rate_limited());
    }

    #[test]
    fn test_io_error_is_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: HarvestError = io.into();
        assert!(matches!(e, HarvestError::Persistence(_)));
        assert_eq!(e.to_string(), "persistence error: denied");
    }
}
