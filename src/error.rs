use crate::driver::DriverError;

/// Errors surfaced by the scraping pipeline.
///
/// The taxonomy mirrors how failures are handled: blocked statuses and
/// driver hiccups are retried until they become [`ScrapeError::NavigationExhausted`],
/// locator timeouts are retried at the single-action level, and bad input
/// (league, odds format) fails immediately before any navigation happens.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Navigation kept hitting a blocked status or a driver error until the
    /// retry policy ran out of attempts. Fatal for the current unit of work
    /// (one match or one season page), never for the whole run.
    #[error("failed to load {url} after {attempts} attempts: {last_cause}")]
    NavigationExhausted {
        url: String,
        attempts: u32,
        last_cause: String,
    },

    /// The server answered with one of the configured block/rate-limit
    /// statuses. Only ever observed between retry attempts; callers see
    /// [`ScrapeError::NavigationExhausted`] instead.
    #[error("received blocked status {status} from {url}")]
    BlockedStatus { status: u16, url: String },

    #[error("league '{0}' is not referenced")]
    UnknownLeague(String),

    #[error("odds format '{0}' is not supported")]
    UnsupportedOddsFormat(String),

    /// Every metadata fallback tier failed, including the URL slug.
    #[error("unable to determine match participants from page content")]
    ParticipantsUnresolved,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ScrapeError {
    /// True when the error is a locator/wait timeout, the only class the
    /// per-action retry loop is allowed to swallow.
    pub fn is_locator_timeout(&self) -> bool {
        matches!(self, ScrapeError::Driver(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
