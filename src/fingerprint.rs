//! Session fingerprint generation.
//!
//! One [`FingerprintProfile`] is sampled per browsing session and every page
//! in that session shares it. Randomizing per page (or per call, like naive
//! stealth scripts do) produces cross-signal mismatches a detector can flag:
//! a navigator that reports 8 cores on one read and 12 on the next is a
//! stronger bot signal than no spoofing at all. The profile therefore fixes
//! every observable value up front and the injected script only echoes them.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }
}

/// `navigator.connection` hints.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionHints {
    pub effective_type: &'static str,
    pub downlink_mbps: f64,
    pub rtt_ms: u32,
}

/// User agents paired with the platform/vendor values they imply. The pool is
/// Chromium-only since that is the engine actually driven; a Firefox UA on a
/// Chrome engine is an instant fingerprint mismatch.
const ENGINE_PROFILES: &[(&str, &str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Win32",
        "Google Inc.",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "MacIntel",
        "Google Inc.",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Linux x86_64",
        "Google Inc.",
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
        "Win32",
        "Google Inc.",
    ),
];

const DESKTOP_VIEWPORTS: &[Viewport] = &[
    Viewport { width: 1280, height: 720 },
    Viewport { width: 1366, height: 768 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1600, height: 900 },
    Viewport { width: 1680, height: 1050 },
    Viewport { width: 1920, height: 1080 },
];

/// Locale and timezone are sampled together; a de-DE browser waking up in
/// America/New_York is another mismatch detectors look for.
const LOCALE_TIMEZONES: &[(&str, &str)] = &[
    ("en-GB", "Europe/London"),
    ("en-US", "America/New_York"),
    ("de-DE", "Europe/Berlin"),
    ("fr-FR", "Europe/Paris"),
    ("es-ES", "Europe/Madrid"),
    ("pt-PT", "Europe/Lisbon"),
];

const HARDWARE_CONCURRENCY: &[u32] = &[4, 6, 8, 12, 16];
const DEVICE_MEMORY_GB: &[u32] = &[4, 8, 16, 32];
const DEVICE_SCALE_FACTORS: &[f64] = &[1.0, 1.25, 2.0];

/// A consistent, randomized browser identity for one session.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub platform: &'static str,
    pub vendor: &'static str,
    pub viewport: Viewport,
    pub locale: &'static str,
    pub timezone: &'static str,
    pub color_scheme: ColorScheme,
    pub device_scale_factor: f64,
    pub hardware_concurrency: u32,
    pub device_memory_gb: u32,
    pub connection: ConnectionHints,
    pub plugin_count: u32,
}

impl FingerprintProfile {
    /// Sample a fresh profile.
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();

        let (user_agent, platform, vendor) = *ENGINE_PROFILES
            .choose(&mut rng)
            .unwrap_or(&ENGINE_PROFILES[0]);
        let viewport = *DESKTOP_VIEWPORTS.choose(&mut rng).unwrap_or(&DESKTOP_VIEWPORTS[0]);
        let (locale, timezone) = *LOCALE_TIMEZONES.choose(&mut rng).unwrap_or(&LOCALE_TIMEZONES[0]);

        Self {
            user_agent: user_agent.to_string(),
            platform,
            vendor,
            viewport,
            locale,
            timezone,
            color_scheme: if rng.gen_bool(0.85) {
                ColorScheme::Light
            } else {
                ColorScheme::Dark
            },
            device_scale_factor: *DEVICE_SCALE_FACTORS.choose(&mut rng).unwrap_or(&1.0),
            hardware_concurrency: *HARDWARE_CONCURRENCY.choose(&mut rng).unwrap_or(&8),
            device_memory_gb: *DEVICE_MEMORY_GB.choose(&mut rng).unwrap_or(&8),
            connection: ConnectionHints {
                effective_type: "4g",
                downlink_mbps: (rng.gen_range(40..100) as f64) / 10.0,
                rtt_ms: rng.gen_range(40..110),
            },
            plugin_count: rng.gen_range(3..=5),
        }
    }

    /// Render the stealth script injected on every new document.
    ///
    /// The script is built from a template so all values come from this
    /// profile and stay stable for the whole session.
    pub fn init_script(&self) -> String {
        INIT_SCRIPT_TEMPLATE
            .replace("__HARDWARE_CONCURRENCY__", &self.hardware_concurrency.to_string())
            .replace("__DEVICE_MEMORY__", &self.device_memory_gb.to_string())
            .replace("__PLATFORM__", self.platform)
            .replace("__VENDOR__", self.vendor)
            .replace("__LOCALE__", self.locale)
            .replace("__COLOR_SCHEME__", self.color_scheme.as_str())
            .replace("__PLUGIN_COUNT__", &self.plugin_count.to_string())
            .replace("__SCREEN_WIDTH__", &self.viewport.width.to_string())
            .replace("__SCREEN_HEIGHT__", &self.viewport.height.to_string())
            .replace("__EFFECTIVE_TYPE__", self.connection.effective_type)
            .replace("__DOWNLINK__", &format!("{:.1}", self.connection.downlink_mbps))
            .replace("__RTT__", &self.connection.rtt_ms.to_string())
    }
}

const INIT_SCRIPT_TEMPLATE: &str = r#"
// Unmask: headless builds expose navigator.webdriver = true.
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });

// Hardware identity. Values fixed per session.
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => __HARDWARE_CONCURRENCY__ });
Object.defineProperty(navigator, 'deviceMemory', { get: () => __DEVICE_MEMORY__ });
Object.defineProperty(navigator, 'platform', { get: () => '__PLATFORM__' });
Object.defineProperty(navigator, 'vendor', { get: () => '__VENDOR__' });
Object.defineProperty(navigator, 'languages', { get: () => ['__LOCALE__', 'en'] });
Object.defineProperty(navigator, 'maxTouchPoints', { get: () => 0 });

// Network hints.
if (navigator.connection) {
    Object.defineProperty(navigator.connection, 'effectiveType', { get: () => '__EFFECTIVE_TYPE__' });
    Object.defineProperty(navigator.connection, 'downlink', { get: () => __DOWNLINK__ });
    Object.defineProperty(navigator.connection, 'rtt', { get: () => __RTT__ });
}

// Plugins: headless Chrome reports an empty PluginArray.
Object.defineProperty(navigator, 'plugins', {
    get: () => {
        const pdf = {
            description: 'Portable Document Format',
            filename: 'internal-pdf-viewer',
            length: 1,
            name: 'Chrome PDF Plugin'
        };
        const list = Array(__PLUGIN_COUNT__).fill(pdf);
        Object.setPrototypeOf(list, PluginArray.prototype);
        return list;
    }
});

// chrome.runtime is probed by "is this a real Chrome" checks.
window.chrome = window.chrome || {};
window.chrome.runtime = window.chrome.runtime || {
    connect: function () {
        return {
            onMessage: { addListener: function () {}, removeListener: function () {} },
            postMessage: function () {},
            disconnect: function () {}
        };
    },
    sendMessage: function () {},
    onMessage: { addListener: function () {}, removeListener: function () {} }
};

// Notification permission must agree with the permissions API.
if (window.navigator.permissions) {
    const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}

// Screen dimensions must agree with the viewport the session launched with.
if (window.screen) {
    Object.defineProperty(window.screen, 'width', { get: () => __SCREEN_WIDTH__ });
    Object.defineProperty(window.screen, 'height', { get: () => __SCREEN_HEIGHT__ });
    Object.defineProperty(window.screen, 'availWidth', { get: () => __SCREEN_WIDTH__ });
    Object.defineProperty(window.screen, 'availHeight', { get: () => __SCREEN_HEIGHT__ });
}

window.matchMedia = (function (original) {
    return function (query) {
        if (query.includes('prefers-color-scheme')) {
            return {
                matches: query.includes('__COLOR_SCHEME__'),
                media: query,
                addEventListener: function () {},
                removeEventListener: function () {}
            };
        }
        return original(query);
    };
})(window.matchMedia.bind(window));

// WebGL vendor strings; SwiftShader here means headless.
const getParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function (parameter) {
    if (parameter === 37445) return 'Intel Inc.';
    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
    return getParameter.apply(this, [parameter]);
};

// WebRTC can leak the real local IP around any proxy.
['RTCPeerConnection', 'webkitRTCPeerConnection'].forEach(name => {
    if (window[name]) { window[name] = undefined; }
});
"#;
