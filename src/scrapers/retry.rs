//! Cool-down and retry for throttled providers.
//!
//! [`RateLimitRetry`] decorates any [`FetchAdapter`]. When the inner adapter
//! reports [`HarvestError::RateLimited`](crate::error::HarvestError::RateLimited) it waits and tries again:
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Once `max_retries` is exhausted the error is surfaced as a plain
//! [`HarvestError::Fetch`](crate::error::HarvestError::Fetch). Other errors pass through untouched.

use super::FetchAdapter;
use crate::error::Result;
use crate::models::RawPage;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

/// Retry knobs shared by every source in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

pub struct RateLimitRetry<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: FetchAdapter> RateLimitRetry<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self
            .policy
            .base_delay
            .saturating_mul(1 << shift)
            .min(self.policy.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<A> fmt::Debug for RateLimitRetry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitRetry")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<A: FetchAdapter> FetchAdapter for RateLimitRetry<A> {
    async fn fetch_page(&self, n: u32) -> Result<RawPage> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(n).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_rate_limited() => {
                    attempt += 1;
                    if attempt > self.policy.max_retries {
                        error!(
                            page = n,
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "Still rate limited; giving up"
                        );
                        return Err(e.into_fetch());
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        page = n,
                        attempt,
                        max = self.policy.max_retries,
                        ?delay,
                        "Rate limited; cooling down"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rate-limits the first `failures` calls, then succeeds.
    struct Throttled {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FetchAdapter for Throttled {
        async fn fetch_page(&self, _n: u32) -> Result<RawPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(HarvestError::RateLimited("freq control".into()))
            } else {
                Ok(RawPage::default())
            }
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_cooldown() {
        let adapter = RateLimitRetry::new(
            Throttled {
                failures: 2,
                calls: AtomicUsize::new(0),
            },
            quick(),
        );
        assert!(adapter.fetch_page(1).await.is_ok());
        assert_eq!(adapter.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_fetch_error() {
        let adapter = RateLimitRetry::new(
            Throttled {
                failures: 10,
                calls: AtomicUsize::new(0),
            },
            quick(),
        );
        let err = adapter.fetch_page(1).await.unwrap_err();
        assert!(matches!(err, HarvestError::Fetch(_)));
        assert_eq!(adapter.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let adapter = RateLimitRetry::new(
            Throttled {
                failures: 0,
                calls: AtomicUsize::new(0),
            },
            RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(4),
            },
        );
        let d = adapter.delay_for(5);
        assert!(d >= Duration::from_secs(4) && d <= Duration::from_millis(4250));
    }
}
