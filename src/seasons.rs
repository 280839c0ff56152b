//! Season listing pagination discovery.

use std::collections::HashSet;
use std::time::Duration;

use tracing::info;

use crate::driver::{Locator, PageDriver};
use crate::error::Result;
use crate::retry::{goto_with_retry, RetryPolicy};

const PAGINATION_LINK: &str = "a.pagination-link";
const PAGINATION_WAIT: Duration = Duration::from_secs(30);

/// Expand one season listing URL into its paginated page URLs.
///
/// Navigates once; a season without a pagination control is itself the only
/// page. Pagination labels are deduplicated and the literal "Next" control is
/// not a page. Page URLs are fragment variants of the landed URL, which is
/// how the site addresses its client-side pagination.
pub async fn discover_season_pages<P: PageDriver>(page: &P, season_url: &str) -> Result<Vec<String>> {
    goto_with_retry(page, season_url, &RetryPolicy::list_page()).await?;

    let labels = match page
        .wait_for(&Locator::css(PAGINATION_LINK), PAGINATION_WAIT)
        .await
    {
        Ok(()) => page.texts(&Locator::css(PAGINATION_LINK)).await?,
        Err(error) if error.is_timeout() => {
            info!("no pagination detected for {season_url}");
            Vec::new()
        }
        Err(error) => return Err(error.into()),
    };

    let base_url = page
        .current_url()
        .split('#')
        .next()
        .unwrap_or_default()
        .to_string();

    let mut seen = HashSet::new();
    let pages: Vec<String> = labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty() && !label.eq_ignore_ascii_case("next"))
        .filter(|label| seen.insert(label.to_string()))
        .map(|label| format!("{base_url}#/page/{label}"))
        .collect();

    if pages.is_empty() {
        return Ok(vec![base_url]);
    }

    Ok(pages)
}
