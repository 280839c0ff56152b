//! Scripted in-memory driver for tests.
//!
//! A [`FakeSite`] maps URLs to per-visit status/body sequences, so a test
//! can script "430, 430, then 200" or "empty page, then the odds appear
//! after a reload". Pages answer locator reads from the scripted body using
//! the same DOM helpers as the Chrome driver, waits resolve instantly and
//! are recorded instead of slept, and clicks are logged for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::dom;
use super::{Driver, DriverError, Locator, PageDriver};
use crate::fingerprint::Viewport;

struct PageScript {
    statuses: Vec<u16>,
    bodies: Vec<String>,
    visits: usize,
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, PageScript>,
    clicks: Vec<String>,
    waits: Vec<u64>,
    pointer_moves: u32,
    scrolls: u32,
}

/// Shared scripted site; clone handles freely.
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().expect("fake site state poisoned")
    }

    /// Script a page that always loads successfully with one body.
    pub fn add_page(&self, url: &str, body: &str) {
        self.add_page_with(url, &[200], &[body]);
    }

    /// Script per-visit statuses and bodies; the last entry of each sequence
    /// repeats for further visits.
    pub fn add_page_with(&self, url: &str, statuses: &[u16], bodies: &[&str]) {
        self.lock().pages.insert(
            url.to_string(),
            PageScript {
                statuses: statuses.to_vec(),
                bodies: bodies.iter().map(|body| body.to_string()).collect(),
                visits: 0,
            },
        );
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver { site: self.clone() }
    }

    /// Successful click dispatches, as locator display strings, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    /// Every non-zero wait the pipeline requested, in order.
    pub fn waits(&self) -> Vec<u64> {
        self.lock().waits.clone()
    }

    pub fn pointer_moves(&self) -> u32 {
        self.lock().pointer_moves
    }

    pub fn scrolls(&self) -> u32 {
        self.lock().scrolls
    }

    /// Navigation attempts against one scripted URL (fragment-insensitive).
    pub fn nav_attempts(&self, url: &str) -> usize {
        let key = url.split('#').next().unwrap_or(url);
        let state = self.lock();
        state
            .pages
            .get(url)
            .or_else(|| state.pages.get(key))
            .map(|script| script.visits)
            .unwrap_or(0)
    }

    pub fn total_nav_attempts(&self) -> usize {
        self.lock().pages.values().map(|script| script.visits).sum()
    }

    /// Record a visit and return the scripted (status, body) for it.
    fn visit(&self, url: &str) -> Result<(Option<u16>, String), DriverError> {
        let mut state = self.lock();

        // Fragment pagination addresses the same document.
        let key = if state.pages.contains_key(url) {
            url.to_string()
        } else {
            url.split('#').next().unwrap_or(url).to_string()
        };

        let script = state
            .pages
            .get_mut(&key)
            .ok_or_else(|| DriverError::Navigation(format!("no scripted page for {url}")))?;

        let index = script.visits;
        script.visits += 1;

        let status = script
            .statuses
            .get(index)
            .or_else(|| script.statuses.last())
            .copied();
        let body = script
            .bodies
            .get(index)
            .or_else(|| script.bodies.last())
            .cloned()
            .unwrap_or_default();

        Ok((status.or(Some(200)), body))
    }
}

pub struct FakeDriver {
    site: FakeSite,
}

impl Driver for FakeDriver {
    type Page = FakePage;

    async fn open_page(&self) -> Result<Self::Page, DriverError> {
        Ok(FakePage {
            site: self.site.clone(),
            current: Mutex::new(CurrentDoc::default()),
            closed: AtomicBool::new(false),
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[derive(Default)]
struct CurrentDoc {
    url: String,
    body: String,
}

pub struct FakePage {
    site: FakeSite,
    current: Mutex<CurrentDoc>,
    closed: AtomicBool,
}

impl FakePage {
    fn body(&self) -> String {
        self.current.lock().expect("current doc poisoned").body.clone()
    }
}

impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<Option<u16>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::PageClosed);
        }
        let (status, body) = self.site.visit(url)?;
        let mut current = self.current.lock().expect("current doc poisoned");
        current.url = url.to_string();
        current.body = body;
        Ok(status)
    }

    async fn reload(&self) -> Result<Option<u16>, DriverError> {
        let url = self.current_url();
        if url.is_empty() {
            return Err(DriverError::Navigation("nothing loaded yet".to_string()));
        }
        self.navigate(&url).await
    }

    fn current_url(&self) -> String {
        self.current.lock().expect("current doc poisoned").url.clone()
    }

    async fn content(&self) -> Result<String, DriverError> {
        Ok(self.body())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        // Scripted pages never render late; resolve or time out immediately.
        if dom::select_snapshots(&self.body(), locator)?.is_empty() {
            return Err(DriverError::WaitTimeout {
                locator: locator.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        Ok(dom::select_snapshots(&self.body(), locator)?
            .into_iter()
            .map(|snapshot| snapshot.text)
            .collect())
    }

    async fn attr_values(&self, locator: &Locator, attr: &str) -> Result<Vec<String>, DriverError> {
        Ok(dom::select_snapshots(&self.body(), locator)?
            .into_iter()
            .filter_map(|snapshot| snapshot.attrs.get(attr).cloned())
            .collect())
    }

    async fn dispatch_click(&self, locator: &Locator) -> Result<(), DriverError> {
        if dom::select_snapshots(&self.body(), locator)?.is_empty() {
            return Err(DriverError::NotFound(locator.to_string()));
        }
        self.site.lock().clicks.push(locator.to_string());
        Ok(())
    }

    async fn move_pointer(&self, _x: f64, _y: f64, _steps: u32) -> Result<(), DriverError> {
        self.site.lock().pointer_moves += 1;
        Ok(())
    }

    async fn scroll_by(&self, _dy: f64) -> Result<(), DriverError> {
        self.site.lock().scrolls += 1;
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        Viewport { width: 1280, height: 720 }
    }

    async fn wait_millis(&self, ms: u64) {
        if ms > 0 {
            self.site.lock().waits.push(ms);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
