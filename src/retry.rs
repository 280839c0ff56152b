//! Status-aware retry and pacing policies.
//!
//! The target site signals rate-limiting with an unusual HTTP status rather
//! than 429/503, and a blocked navigation is indistinguishable from a broken
//! network as far as the corrective action goes: wait, try again. Everything
//! here treats both as the same opaque transient failure.

use std::future::Future;

use rand::Rng;
use tracing::warn;

use crate::driver::PageDriver;
use crate::error::{Result, ScrapeError};

/// Retry policy for one navigation, reload or UI action.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// HTTP statuses interpreted as a transient block.
    pub trigger_statuses: Vec<u16>,
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Fixed wait between attempts, routed through the page driver.
    pub wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            trigger_statuses: vec![430],
            max_attempts: 3,
            wait_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Match detail pages: blocked more aggressively, so back off longer.
    pub fn match_page() -> Self {
        Self {
            max_attempts: 4,
            wait_ms: 20_000,
            ..Self::default()
        }
    }

    /// Fixture/result listing pages.
    pub fn list_page() -> Self {
        Self {
            max_attempts: 5,
            wait_ms: 30_000,
            ..Self::default()
        }
    }

    /// In-place reloads; a reload can re-trigger the rate limiter too.
    pub fn reload() -> Self {
        Self::default()
    }

    pub fn is_triggered_by(&self, status: u16) -> bool {
        self.trigger_statuses.contains(&status)
    }
}

/// Delay window between consecutive match scrapes on one listing page.
#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ThrottlePolicy {
    pub fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    /// The window used between upcoming-fixture scrapes.
    pub fn next_matches() -> Self {
        Self { min_ms: 2_000, max_ms: 4_000 }
    }

    /// Sample a concrete delay: uniform in the window, fixed if degenerate.
    pub fn resolve(&self) -> u64 {
        let min = self.min_ms;
        let max = self.max_ms.max(min);
        if max == 0 {
            return 0;
        }
        if min == max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Bounded-loop retry, shared by navigation, reload and single UI actions.
///
/// Runs `attempt` up to `policy.max_attempts` times. Errors rejected by
/// `is_retryable` propagate immediately; retryable errors are logged and the
/// loop waits `policy.wait_ms` through the page before the next attempt (no
/// wait after the last one). The last error is returned on exhaustion;
/// callers decide how to wrap it.
pub async fn with_bounded_retry<P, T, F, Fut>(
    page: &P,
    policy: &RetryPolicy,
    what: &str,
    is_retryable: impl Fn(&ScrapeError) -> bool,
    mut attempt: F,
) -> Result<T>
where
    P: PageDriver,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for current in 1..=max_attempts {
        match attempt(current).await {
            Ok(value) => return Ok(value),
            Err(error) if !is_retryable(&error) => return Err(error),
            Err(error) => {
                if current < max_attempts {
                    warn!(
                        "[{what}] attempt {current}/{max_attempts} failed: {error}. \
                         Retrying after {} ms.",
                        policy.wait_ms
                    );
                }
                last_error = Some(error);
            }
        }

        if current < max_attempts && policy.wait_ms > 0 {
            page.wait_millis(policy.wait_ms).await;
        }
    }

    Err(last_error.unwrap_or(ScrapeError::NavigationExhausted {
        url: what.to_string(),
        attempts: max_attempts,
        last_cause: "no attempt executed".to_string(),
    }))
}

/// Navigate with retry on blocked statuses and driver errors.
///
/// A missing status (driver could not observe the response) counts as
/// success; only an explicit trigger status or a hard navigation error is
/// retried. Exhaustion yields [`ScrapeError::NavigationExhausted`], fatal to
/// the caller's current unit of work only.
pub async fn goto_with_retry<P: PageDriver>(
    page: &P,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Option<u16>> {
    with_bounded_retry(page, policy, url, |_| true, |_| async move {
        let status = page.navigate(url).await?;
        match status {
            Some(code) if policy.is_triggered_by(code) => Err(ScrapeError::BlockedStatus {
                status: code,
                url: url.to_string(),
            }),
            other => Ok(other),
        }
    })
    .await
    .map_err(|error| ScrapeError::NavigationExhausted {
        url: url.to_string(),
        attempts: policy.max_attempts.max(1),
        last_cause: error.to_string(),
    })
}

/// Reload the current document under the same status-retry regime.
pub async fn reload_with_retry<P: PageDriver>(page: &P, policy: &RetryPolicy) -> Result<()> {
    let url = page.current_url();
    with_bounded_retry(page, policy, &url, |_| true, |_| {
        let url = url.clone();
        async move {
            let status = page.reload().await?;
            match status {
                Some(code) if policy.is_triggered_by(code) => {
                    Err(ScrapeError::BlockedStatus { status: code, url })
                }
                _ => Ok(()),
            }
        }
    })
    .await
    .map_err(|error| ScrapeError::NavigationExhausted {
        url,
        attempts: policy.max_attempts.max(1),
        last_cause: error.to_string(),
    })
}
