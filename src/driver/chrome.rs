//! Headless Chrome implementation of the driver traits.
//!
//! Launch hardening, init-script injection and CDP overrides follow the same
//! playbook as the rest of the stealth stack: the fingerprint is decided
//! before launch and every page opened afterwards repeats it. Element reads
//! go through an HTML snapshot (`get_content` + the shared DOM helpers) and
//! clicks are dispatched as synthetic `MouseEvent`s from page JavaScript.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use headless_chrome::protocol::cdp::Emulation::{SetLocaleOverride, SetTimezoneOverride};
use headless_chrome::protocol::cdp::Input::{
    DispatchMouseEvent, DispatchMouseEventPointer_TypeOption, DispatchMouseEventTypeOption,
};
use headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::Rng;
use tracing::{debug, info};

use super::dom;
use super::{Driver, DriverError, Locator, PageDriver};
use crate::fingerprint::{FingerprintProfile, Viewport};
use crate::session::SessionConfig;

const DOM_POLL_INTERVAL_MS: u64 = 250;

/// How long the browser may sit idle between CDP calls before the library
/// reaps it. The block back-off waits alone can exceed the 30 s default.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

/// Reads the main document status out of the navigation timing entry. Chrome
/// does not hand the response to the automation layer on `navigate`, but the
/// page itself knows.
const RESPONSE_STATUS_JS: &str = r#"
(() => {
    const entries = performance.getEntriesByType('navigation');
    const last = entries[entries.length - 1];
    return last && typeof last.responseStatus === 'number' ? last.responseStatus : 0;
})()
"#;

pub struct ChromeDriver {
    browser: Browser,
    profile: FingerprintProfile,
    pages: Mutex<Vec<Arc<Tab>>>,
}

impl ChromeDriver {
    /// Launch a browser carrying the given fingerprint.
    pub fn launch(config: &SessionConfig, profile: FingerprintProfile) -> Result<Self, DriverError> {
        let ua_arg = format!("--user-agent={}", profile.user_agent);
        let lang_arg = format!("--lang={}", profile.locale);
        let scale_arg = format!("--force-device-scale-factor={}", profile.device_scale_factor);
        let proxy_arg = config
            .proxy_url
            .as_ref()
            .map(|proxy| format!("--proxy-server={proxy}"));

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--ignore-certificate-errors"),
            OsStr::new(&ua_arg),
            OsStr::new(&lang_arg),
            OsStr::new(&scale_arg),
        ];
        if config.headless {
            args.push(OsStr::new("--headless=new"));
        }
        if let Some(proxy) = proxy_arg.as_deref() {
            info!("📡 routing traffic through {proxy}");
            args.push(OsStr::new(proxy));
        }
        for extra in &config.extra_args {
            args.push(OsStr::new(extra));
        }

        let browser = Browser::new(LaunchOptions {
            // New headless mode goes through args; the built-in flag selects
            // the legacy mode that trips most detectors.
            headless: false,
            window_size: Some((profile.viewport.width, profile.viewport.height)),
            idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
            args,
            ..Default::default()
        })
        .map_err(|error| DriverError::Protocol(format!("browser launch failed: {error}")))?;

        Ok(Self {
            browser,
            profile,
            pages: Mutex::new(Vec::new()),
        })
    }

    fn apply_fingerprint(&self, tab: &Arc<Tab>) -> Result<(), DriverError> {
        tab.call_method(AddScriptToEvaluateOnNewDocument {
            source: self.profile.init_script(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|error| DriverError::Protocol(format!("init script injection failed: {error}")))?;

        tab.call_method(SetTimezoneOverride {
            timezone_id: self.profile.timezone.to_string(),
        })
        .map_err(|error| DriverError::Protocol(format!("timezone override failed: {error}")))?;

        tab.call_method(SetLocaleOverride {
            locale: Some(self.profile.locale.to_string()),
        })
        .map_err(|error| DriverError::Protocol(format!("locale override failed: {error}")))?;

        Ok(())
    }
}

impl Driver for ChromeDriver {
    type Page = ChromePage;

    async fn open_page(&self) -> Result<Self::Page, DriverError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|error| DriverError::Protocol(format!("new tab failed: {error}")))?;

        self.apply_fingerprint(&tab)?;

        self.pages
            .lock()
            .expect("page registry poisoned")
            .push(tab.clone());

        Ok(ChromePage {
            tab,
            viewport: self.profile.viewport,
            closed: AtomicBool::new(false),
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        let tabs: Vec<Arc<Tab>> = self
            .pages
            .lock()
            .expect("page registry poisoned")
            .drain(..)
            .collect();

        for tab in tabs {
            if let Err(error) = tab.close(true) {
                debug!("tab close failed during teardown: {error}");
            }
        }
        // Dropping `Browser` terminates the process; nothing else to do.
        Ok(())
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
    viewport: Viewport,
    closed: AtomicBool,
}

impl ChromePage {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::PageClosed);
        }
        Ok(())
    }

    fn read_status(&self) -> Option<u16> {
        let result = self.tab.evaluate(RESPONSE_STATUS_JS, false).ok()?;
        match result.value {
            Some(serde_json::Value::Number(n)) => {
                let status = n.as_u64().unwrap_or(0);
                (status > 0).then(|| status as u16)
            }
            _ => None,
        }
    }

    fn snapshot(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        self.tab
            .get_content()
            .map_err(|error| DriverError::Protocol(format!("content read failed: {error}")))
    }
}

impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str) -> Result<Option<u16>, DriverError> {
        self.ensure_open()?;
        self.tab
            .navigate_to(url)
            .map_err(|error| DriverError::Navigation(error.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|error| DriverError::Navigation(error.to_string()))?;
        Ok(self.read_status())
    }

    async fn reload(&self) -> Result<Option<u16>, DriverError> {
        self.ensure_open()?;
        self.tab
            .reload(true, None)
            .map_err(|error| DriverError::Navigation(error.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|error| DriverError::Navigation(error.to_string()))?;
        Ok(self.read_status())
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.snapshot()
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = !dom::select_snapshots(&self.snapshot()?, locator)?.is_empty();
            if found {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::WaitTimeout {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(DOM_POLL_INTERVAL_MS)).await;
        }
    }

    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, DriverError> {
        Ok(dom::select_snapshots(&self.snapshot()?, locator)?
            .into_iter()
            .map(|snapshot| snapshot.text)
            .collect())
    }

    async fn attr_values(&self, locator: &Locator, attr: &str) -> Result<Vec<String>, DriverError> {
        Ok(dom::select_snapshots(&self.snapshot()?, locator)?
            .into_iter()
            .filter_map(|snapshot| snapshot.attrs.get(attr).cloned())
            .collect())
    }

    async fn dispatch_click(&self, locator: &Locator) -> Result<(), DriverError> {
        self.ensure_open()?;

        let script = build_click_script(locator)?;
        let result = self
            .tab
            .evaluate(&script, false)
            .map_err(|error| DriverError::Protocol(format!("click dispatch failed: {error}")))?;

        match result.value {
            Some(serde_json::Value::Bool(true)) => Ok(()),
            _ => Err(DriverError::NotFound(locator.to_string())),
        }
    }

    async fn move_pointer(&self, x: f64, y: f64, steps: u32) -> Result<(), DriverError> {
        self.ensure_open()?;

        let start = Point {
            x: f64::from(self.viewport.width) / 2.0,
            y: f64::from(self.viewport.height) / 2.0,
        };
        let end = Point { x, y };

        // Control points randomized per move so the arc never repeats.
        let (p1, p2) = {
            let mut rng = rand::thread_rng();
            let variance = 100.0;
            let control = |rng: &mut rand::rngs::ThreadRng| Point {
                x: start.x + (end.x - start.x) * rng.gen_range(0.2..0.8)
                    + rng.gen_range(-variance..variance),
                y: start.y + (end.y - start.y) * rng.gen_range(0.2..0.8)
                    + rng.gen_range(-variance..variance),
            };
            (control(&mut rng), control(&mut rng))
        };

        for step in 0..=steps.max(2) {
            let t = f64::from(step) / f64::from(steps.max(2));
            let point = cubic_bezier(t, start, p1, p2, end);

            self.tab
                .call_method(DispatchMouseEvent {
                    Type: DispatchMouseEventTypeOption::MouseMoved,
                    x: point.x,
                    y: point.y,
                    button: None,
                    buttons: None,
                    modifiers: None,
                    timestamp: None,
                    delta_x: None,
                    delta_y: None,
                    pointer_Type: Some(DispatchMouseEventPointer_TypeOption::Mouse),
                    force: None,
                    tangential_pressure: None,
                    tilt_x: None,
                    tilt_y: None,
                    twist: None,
                    click_count: None,
                })
                .map_err(|error| DriverError::Protocol(format!("pointer move failed: {error}")))?;

            let delay = rand::thread_rng().gen_range(5..15);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(())
    }

    async fn scroll_by(&self, dy: f64) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.tab
            .evaluate(&format!("window.scrollBy(0, {dy});"), false)
            .map(|_| ())
            .map_err(|error| DriverError::Protocol(format!("scroll failed: {error}")))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn wait_millis(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|error| DriverError::Protocol(format!("tab close failed: {error}")))
    }
}

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    y: f64,
}

fn cubic_bezier(t: f64, p0: Point, p1: Point, p2: Point, p3: Point) -> Point {
    let cx = 3.0 * (p1.x - p0.x);
    let bx = 3.0 * (p2.x - p1.x) - cx;
    let ax = p3.x - p0.x - cx - bx;

    let cy = 3.0 * (p1.y - p0.y);
    let by = 3.0 * (p2.y - p1.y) - cy;
    let ay = p3.y - p0.y - cy - by;

    Point {
        x: (ax * t.powi(3)) + (bx * t.powi(2)) + (cx * t) + p0.x,
        y: (ay * t.powi(3)) + (by * t.powi(2)) + (cy * t) + p0.y,
    }
}

/// Build the page-side click script for a locator. The whole match-and-click
/// runs inside the page so overlay animations between "find" and "click"
/// cannot invalidate the target.
fn build_click_script(locator: &Locator) -> Result<String, DriverError> {
    let css = serde_json::to_string(&locator.css)
        .map_err(|_| DriverError::Selector(locator.css.clone()))?;

    let filter = match &locator.text {
        None => "() => true".to_string(),
        Some(super::TextFilter::Contains(needle)) => {
            let needle = serde_json::to_string(needle)
                .map_err(|_| DriverError::Selector(locator.css.clone()))?;
            format!("(t) => t.includes({needle})")
        }
        Some(super::TextFilter::Matches(re)) => {
            let source = serde_json::to_string(re.as_str())
                .map_err(|_| DriverError::Selector(locator.css.clone()))?;
            format!("(t) => new RegExp({source}).test(t)")
        }
    };

    let nth = locator.nth.unwrap_or(0);

    Ok(format!(
        r#"(() => {{
    const accepts = {filter};
    const nodes = Array.from(document.querySelectorAll({css}))
        .filter(node => accepts((node.textContent || '').replace(/\s+/g, ' ').trim()));
    const target = nodes[{nth}];
    if (!target) return false;
    target.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }}));
    return true;
}})()"#
    ))
}
