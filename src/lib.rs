//! Resilient odds extraction for a JavaScript-rendered, bot-hostile betting
//! site.
//!
//! The pipeline is built from small layers:
//! - [`fingerprint`] / [`session`]: one consistent spoofed browser identity
//!   per run, explicit configuration, guaranteed teardown.
//! - [`retry`]: status-aware navigation retry; the site signals rate limits
//!   with an unusual HTTP status rather than an error page.
//! - [`markets`]: a state machine that walks a match page between mutually
//!   exclusive market views, with layered selector fallback and one
//!   reload-and-replay on stale DOM.
//! - [`matches`] / [`seasons`] / [`orchestrator`]: per-match extraction,
//!   pagination discovery and the streaming run drivers.
//!
//! Everything talks to the browser through the [`driver`] traits; production
//! uses Headless Chrome, tests run a scripted fake.

pub mod actions;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod fingerprint;
pub mod humanize;
pub mod leagues;
pub mod markets;
pub mod matches;
pub mod orchestrator;
pub mod retry;
pub mod seasons;
pub mod selectors;
pub mod session;

pub use error::{Result, ScrapeError};
pub use exporter::{Exporter, FileExporter, S3Exporter};
pub use fingerprint::FingerprintProfile;
pub use humanize::HumanizeConfig;
pub use leagues::{find_league, historic_urls, League, OddsFormat};
pub use matches::{MatchMetadata, MatchRecord, ScrapedMatch};
pub use orchestrator::{historic, next_matches, NextMatchesOptions};
pub use session::{Session, SessionConfig, SessionFactory};
