//! Layered selector fallback.
//!
//! The target site's markup shifts between deployments, so anything that
//! matters is located through an ordered list of strategies: the most
//! specific selector first, progressively more generic ones behind it. The
//! outcome of each tier is a value, not an exception; only real driver
//! faults propagate.

use std::time::Duration;

use tracing::debug;

use crate::driver::{DriverError, Locator, PageDriver};

/// One tier in a fallback chain.
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    pub locator: Locator,
    pub timeout: Duration,
}

impl SelectorStrategy {
    pub fn new(locator: Locator, timeout: Duration) -> Self {
        Self { locator, timeout }
    }
}

/// Try each strategy in order, returning the first locator that matched.
///
/// `Ok(None)` means every tier timed out, which callers treat as "the
/// element is not on this page" rather than a failure.
pub async fn resolve_first<P: PageDriver>(
    page: &P,
    what: &str,
    strategies: &[SelectorStrategy],
) -> Result<Option<Locator>, DriverError> {
    for (tier, strategy) in strategies.iter().enumerate() {
        match page.wait_for(&strategy.locator, strategy.timeout).await {
            Ok(()) => {
                if tier > 0 {
                    debug!("{what}: fell back to tier {tier} selector {}", strategy.locator);
                }
                return Ok(Some(strategy.locator.clone()));
            }
            Err(error) if error.is_timeout() => {
                debug!("{what}: tier {tier} selector {} not present", strategy.locator);
            }
            Err(error) => return Err(error),
        }
    }

    Ok(None)
}
