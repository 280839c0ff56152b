//! Session lifecycle.
//!
//! A session is one fingerprinted browser process plus the pages opened from
//! it. Configuration is explicit and threaded through the factory; there is
//! no process-wide mutable state to configure behind the pipeline's back.

use tracing::{debug, info};

use crate::driver::chrome::ChromeDriver;
use crate::driver::Driver;
use crate::error::Result;
use crate::fingerprint::FingerprintProfile;

/// Launch configuration for one scraping session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    /// `scheme://host:port`, handed to the browser as a launch flag.
    pub proxy_url: Option<String>,
    /// Extra chromium switches appended after the built-in hardening set.
    pub extra_args: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            proxy_url: None,
            extra_args: Vec::new(),
        }
    }
}

/// Opens isolated, fingerprinted sessions.
pub struct SessionFactory {
    config: SessionConfig,
}

impl SessionFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Launch a browser with a freshly sampled fingerprint.
    pub fn launch(&self) -> Result<Session<ChromeDriver>> {
        let profile = FingerprintProfile::randomized();
        info!(
            user_agent = %profile.user_agent,
            viewport = ?profile.viewport,
            timezone = profile.timezone,
            locale = profile.locale,
            "launching fingerprinted session"
        );

        let driver = ChromeDriver::launch(&self.config, profile)?;
        Ok(Session::new(driver))
    }
}

/// Exclusive owner of a browser process and all of its pages.
///
/// `close` tears everything down page-first. Dropping the session without
/// calling it still kills the browser process (the driver owns the child
/// process handle), so an early `?` cannot leak a browser.
pub struct Session<D: Driver> {
    driver: D,
}

impl<D: Driver> Session<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub async fn page(&self) -> Result<D::Page> {
        Ok(self.driver.open_page().await?)
    }

    pub async fn close(&self) {
        if let Err(error) = self.driver.close().await {
            debug!("session teardown reported: {error}");
        }
    }
}
