//! Per-action pacing and retry.
//!
//! Every market extraction on a match page runs through an [`ActionRunner`]:
//! a fixed delay between actions keeps request bursts down, the optional
//! humanizer hook runs ahead of each attempt, and locator timeouts (the
//! signature of a half-rendered page) get a bounded number of retries.
//! Anything else propagates untouched.

use std::future::Future;

use crate::driver::PageDriver;
use crate::error::{Result, ScrapeError};
use crate::humanize::{HumanizeConfig, Humanizer};
use crate::retry::{with_bounded_retry, RetryPolicy};

pub const ACTION_DELAY_DEFAULT_MS: u64 = 1_000;

/// Default single-action retry: 5 attempts, 1 s apart, locator timeouts only.
pub fn action_retry_default() -> RetryPolicy {
    RetryPolicy {
        trigger_statuses: Vec::new(),
        max_attempts: 5,
        wait_ms: 1_000,
    }
}

pub struct ActionRunner<'a, P: PageDriver> {
    page: &'a P,
    delay_ms: u64,
    retry: RetryPolicy,
    humanizer: Humanizer,
    first_action: bool,
}

impl<'a, P: PageDriver> ActionRunner<'a, P> {
    pub fn new(page: &'a P, delay_ms: u64, retry: RetryPolicy, humanize: HumanizeConfig) -> Self {
        Self {
            page,
            delay_ms,
            retry,
            humanizer: Humanizer::new(humanize),
            first_action: true,
        }
    }

    /// Run one action with pacing, humanization and locator-timeout retry.
    pub async fn run<T, F, Fut>(&mut self, description: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.first_action && self.delay_ms > 0 {
            self.page.wait_millis(self.delay_ms).await;
        }
        self.first_action = false;

        let page = self.page;
        let humanizer = &self.humanizer;

        with_bounded_retry(
            page,
            &self.retry,
            description,
            ScrapeError::is_locator_timeout,
            |_| {
                // The action future is created here but only polled after
                // the humanizer hook; async fns do no work until awaited.
                let attempt = action();
                async move {
                    humanizer.before_action(page).await;
                    attempt.await
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::driver::fake::FakeSite;
    use crate::driver::{Driver, DriverError};
    use crate::humanize::{MouseMoveConfig, ScrollConfig};

    fn timeout_error() -> ScrapeError {
        ScrapeError::Driver(DriverError::WaitTimeout {
            locator: "div.quote-row".to_string(),
            timeout_ms: 100,
        })
    }

    #[tokio::test]
    async fn delay_is_skipped_before_the_first_action() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let mut runner =
            ActionRunner::new(&page, 750, action_retry_default(), HumanizeConfig::default());
        runner.run("first", || async { Ok(()) }).await.unwrap();
        runner.run("second", || async { Ok(()) }).await.unwrap();
        runner.run("third", || async { Ok(()) }).await.unwrap();

        // One pacing wait per action after the first.
        assert_eq!(site.waits(), vec![750, 750]);
    }

    #[tokio::test]
    async fn locator_timeouts_get_bounded_retries() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let remaining_failures = Cell::new(2u32);
        let mut runner =
            ActionRunner::new(&page, 0, action_retry_default(), HumanizeConfig::default());

        let value = runner
            .run("flaky market", || async {
                if remaining_failures.get() > 0 {
                    remaining_failures.set(remaining_failures.get() - 1);
                    return Err(timeout_error());
                }
                Ok(42)
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(site.waits(), vec![1_000, 1_000]);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_timeout() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let attempts = Cell::new(0u32);
        let mut runner =
            ActionRunner::new(&page, 0, action_retry_default(), HumanizeConfig::default());

        let error = runner
            .run("dead market", || async {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(timeout_error())
            })
            .await
            .unwrap_err();

        assert!(error.is_locator_timeout());
        assert_eq!(attempts.get(), 5);
        assert_eq!(site.waits().len(), 4);
    }

    #[tokio::test]
    async fn other_errors_propagate_without_retry() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let attempts = Cell::new(0u32);
        let mut runner =
            ActionRunner::new(&page, 0, action_retry_default(), HumanizeConfig::default());

        let error = runner
            .run("broken market", || async {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(ScrapeError::ParticipantsUnresolved)
            })
            .await
            .unwrap_err();

        assert!(matches!(error, ScrapeError::ParticipantsUnresolved));
        assert_eq!(attempts.get(), 1);
        assert!(site.waits().is_empty());
    }

    #[tokio::test]
    async fn humanizer_hook_runs_once_per_attempt() {
        let site = FakeSite::new();
        let driver = site.driver();
        let page = driver.open_page().await.unwrap();

        let humanize = HumanizeConfig {
            enabled: true,
            mouse: MouseMoveConfig { probability: 1.0, ..MouseMoveConfig::default() },
            scroll: ScrollConfig { probability: 1.0, ..ScrollConfig::default() },
        };

        let remaining_failures = Cell::new(1u32);
        let mut runner = ActionRunner::new(&page, 0, action_retry_default(), humanize);
        runner
            .run("noisy market", || async {
                if remaining_failures.get() > 0 {
                    remaining_failures.set(remaining_failures.get() - 1);
                    return Err(timeout_error());
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(site.pointer_moves(), 2);
        assert_eq!(site.scrolls(), 2);
    }
}
