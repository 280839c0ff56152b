//! Browser driver boundary.
//!
//! The scraping pipeline never talks to an automation library directly; it
//! drives a [`PageDriver`] and opens pages through a [`Driver`]. The shipped
//! implementation is Headless Chrome ([`chrome`]), and the test suite runs
//! the same pipeline against a scripted fake.

use std::fmt;
use std::time::Duration;

use regex::Regex;

pub mod chrome;
pub mod dom;

#[cfg(test)]
pub mod fake;

/// Predicate applied to an element's normalized text content.
#[derive(Debug, Clone)]
pub enum TextFilter {
    /// Substring match.
    Contains(String),
    /// Regular expression match.
    Matches(Regex),
}

impl TextFilter {
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            TextFilter::Contains(needle) => text.contains(needle.as_str()),
            TextFilter::Matches(re) => re.is_match(text),
        }
    }
}

/// A CSS selector plus optional text predicate and match index.
///
/// This is the unit every wait/read/click goes through. Expressing the text
/// predicate here (instead of in site-specific code paths) keeps the layered
/// fallback chains declarative: a fallback tier is just another `Locator`.
#[derive(Debug, Clone)]
pub struct Locator {
    pub css: String,
    pub text: Option<TextFilter>,
    pub nth: Option<usize>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
            nth: None,
        }
    }

    /// Keep only elements whose text contains `needle`.
    pub fn with_text(mut self, needle: impl Into<String>) -> Self {
        self.text = Some(TextFilter::Contains(needle.into()));
        self
    }

    /// Keep only elements whose text matches `re`.
    pub fn matching(mut self, re: Regex) -> Self {
        self.text = Some(TextFilter::Matches(re));
        self
    }

    /// Select the n-th element (zero based) after text filtering.
    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.css)?;
        match &self.text {
            Some(TextFilter::Contains(s)) => write!(f, " :text(\"{s}\")")?,
            Some(TextFilter::Matches(re)) => write!(f, " :text(/{re}/)")?,
            None => {}
        }
        if let Some(n) = self.nth {
            write!(f, " :nth({n})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("timed out after {timeout_ms} ms waiting for {locator}")]
    WaitTimeout { locator: String, timeout_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("no element matched {0}")]
    NotFound(String),

    #[error("browser call failed: {0}")]
    Protocol(String),

    #[error("page already closed")]
    PageClosed,
}

impl DriverError {
    /// Locator/wait timeout classification. Protocol errors that mention a
    /// timeout are treated the same; CDP surfaces slow elements that way.
    pub fn is_timeout(&self) -> bool {
        match self {
            DriverError::WaitTimeout { .. } => true,
            DriverError::Protocol(msg) => msg.to_lowercase().contains("timeout"),
            _ => false,
        }
    }
}

/// One browser page (tab), owned by its [`Driver`].
///
/// All waits injected by the pipeline (retry back-off, throttling, action
/// delays) go through [`PageDriver::wait_millis`] so that implementations can
/// observe or virtualize time.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Navigate and report the main-document HTTP status, when available.
    async fn navigate(&self, url: &str) -> Result<Option<u16>, DriverError>;

    /// Reload the current document, reporting the status like [`Self::navigate`].
    async fn reload(&self) -> Result<Option<u16>, DriverError>;

    fn current_url(&self) -> String;

    /// Full HTML snapshot of the current document.
    async fn content(&self) -> Result<String, DriverError>;

    /// Wait until the locator matches at least one element.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    /// Normalized text content of every matched element, in document order.
    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError>;

    /// Attribute values of every matched element that carries the attribute.
    async fn attr_values(&self, locator: &Locator, attr: &str) -> Result<Vec<String>, DriverError>;

    /// Dispatch a synthetic `MouseEvent("click")` on the matched element.
    /// Synthetic dispatch is deliberate: it stays clickable under overlays
    /// and mid-animation, where native hit-testing fails.
    async fn dispatch_click(&self, locator: &Locator) -> Result<(), DriverError>;

    /// Move the virtual pointer to viewport coordinates in `steps` increments.
    async fn move_pointer(&self, x: f64, y: f64, steps: u32) -> Result<(), DriverError>;

    /// Scroll the page vertically by `dy` pixels.
    async fn scroll_by(&self, dy: f64) -> Result<(), DriverError>;

    fn viewport(&self) -> crate::fingerprint::Viewport;

    /// Cooperative sleep attributed to this page.
    async fn wait_millis(&self, ms: u64);

    fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<(), DriverError>;
}

/// Factory for pages within one fingerprinted browsing session.
#[allow(async_fn_in_trait)]
pub trait Driver {
    type Page: PageDriver;

    async fn open_page(&self) -> Result<Self::Page, DriverError>;

    /// Close every open page, then the underlying browser.
    async fn close(&self) -> Result<(), DriverError>;
}
