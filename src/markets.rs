//! Market selection and quote extraction.
//!
//! Markets are mutually exclusive UI states on a single match page: showing
//! the first-half moneyline and showing the +2.5 over/under are different
//! renderings of the same document. [`MarketSelector`] is the state machine
//! that walks a page between those states and reads the quote rows out of
//! the result. It is re-entered from the closed-tab state for every market.

use std::cell::Cell;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::dom::normalize_text;
use crate::driver::{Locator, PageDriver};
use crate::error::Result;
use crate::leagues::OddsFormat;
use crate::retry::{reload_with_retry, RetryPolicy};
use crate::selectors::{resolve_first, SelectorStrategy};

// Site selector strings are presentation detail and change between site
// deployments; they are deliberately corralled here.
const QUOTE_ROW: &str = r#"div[data-testid="over-under-expanded-row"]"#;
const BOOKMAKER_NAME: &str = r#"p[data-testid="outrights-expanded-bookmaker-name"]"#;
const ODD_CONTAINER: &str = r#"div[data-testid="odd-container"]"#;
const ODDS_LINK: &str = "a.odds-link";
const ODDS_TEXT: &str = "p.odds-text";
const TOTAL_CONTAINER: &str = r#"div[data-testid="total-container"]"#;
const PROVIDER_ATTR: &str = "provider-name";
const ODDS_CELL: &str = "div.odds-cell";

const MONEYLINE_PERIOD_TABS: &str = "div.flex-center.bg-gray-medium";
const MONEYLINE_READY: &str = r#"div[data-testid="odd-container"] p.odds-text"#;
const OVER_UNDER_TAB: &str = "div.hide-menu li div";
const OVER_UNDER_TAB_TEXT: &str = "Over/Under";
const OVER_UNDER_OPTION: &str = r#"div[data-testid="over-under-collapsed-option-box"]"#;
const BOOKIES_FILTER_ALL: &str = r#"div[data-testid="bookies-filter-nav"] [data-testid="all"]"#;

const FORMAT_DROPDOWN: &str = "div.group > div.dropdown-content";
const FORMAT_DROPDOWN_OPTION: &str = "div.group > div.dropdown-content > ul > li > a";

const DEFAULT_WAIT: Duration = Duration::from_secs(30);
const OPTION_VISIBLE_WAIT: Duration = Duration::from_secs(8);
const SHORT_WAIT: Duration = Duration::from_secs(3);
const FORMAT_BUTTON_WAIT: Duration = Duration::from_secs(5);
const SCROLL_SETTLE_MS: u64 = 500;

static FORMAT_BUTTON_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new("Decimal|American|Fractional").unwrap());

/// Three-way moneyline quote from one bookmaker. Always exactly three odds
/// slots; a missing cell is `None`, never a shorter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneylineQuote {
    pub book_maker_name: Option<String>,
    pub hw: Option<String>,
    pub d: Option<String>,
    pub aw: Option<String>,
}

/// Over/under quote from one bookmaker. Only emitted complete; a row with a
/// missing side is useless downstream and gets dropped at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverUnderQuote {
    pub bookmaker_name: String,
    pub odds_over: String,
    pub odds_under: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneylinePeriod {
    FullTime,
    FirstHalf,
    SecondHalf,
}

impl MoneylinePeriod {
    /// Position of this period's toggle in the period button strip.
    fn tab_index(&self) -> usize {
        match self {
            MoneylinePeriod::FullTime => 0,
            MoneylinePeriod::FirstHalf => 1,
            MoneylinePeriod::SecondHalf => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoneylinePeriod::FullTime => "full time",
            MoneylinePeriod::FirstHalf => "first half",
            MoneylinePeriod::SecondHalf => "second half",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverUnderLine {
    Plus15,
    Plus25,
    Plus35,
}

impl OverUnderLine {
    /// The option-box label, e.g. `+2.5`.
    pub fn target(&self) -> &'static str {
        match self {
            OverUnderLine::Plus15 => "+1.5",
            OverUnderLine::Plus25 => "+2.5",
            OverUnderLine::Plus35 => "+3.5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketState {
    Unset,
    FormatSelected,
    MarketTabOpen,
    MarketOptionSelected,
    OddsLoaded,
}

enum MarketTarget {
    Moneyline(MoneylinePeriod),
    OverUnder(OverUnderLine),
}

impl MarketTarget {
    fn describe(&self) -> String {
        match self {
            MarketTarget::Moneyline(period) => format!("three way market ({})", period.label()),
            MarketTarget::OverUnder(line) => format!("over/under {} market", line.target()),
        }
    }

    fn ready_locator(&self) -> Locator {
        match self {
            MarketTarget::Moneyline(_) => Locator::css(MONEYLINE_READY),
            MarketTarget::OverUnder(_) => Locator::css(format!("{QUOTE_ROW} {ODDS_TEXT}")),
        }
    }
}

/// Drives one page between market states and reads quotes out of it.
pub struct MarketSelector<'a, P: PageDriver> {
    page: &'a P,
    state: Cell<MarketState>,
}

impl<'a, P: PageDriver> MarketSelector<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self {
            page,
            state: Cell::new(MarketState::Unset),
        }
    }

    pub fn state(&self) -> MarketState {
        self.state.get()
    }

    fn transition(&self, next: MarketState) {
        debug!("market selector: {:?} -> {next:?}", self.state.get());
        self.state.set(next);
    }

    /// Switch the page's odds display format, best-effort.
    ///
    /// The control is located through a fallback chain because it is among
    /// the most redesign-prone widgets on the site. Not finding it (or the
    /// dropdown misbehaving) is a warning, not an error: the format may
    /// simply already be the requested one, and every quote read still works.
    pub async fn set_format(&self, format: OddsFormat) -> Result<()> {
        let strategies = [
            SelectorStrategy::new(
                Locator::css("button").matching(FORMAT_BUTTON_RX.clone()),
                FORMAT_BUTTON_WAIT,
            ),
            SelectorStrategy::new(Locator::css("div.group > button.gap-2"), SHORT_WAIT),
            SelectorStrategy::new(Locator::css(r#"button[class*="gap"]"#), SHORT_WAIT),
        ];

        info!("setting odds format to '{}'", format.label());

        match resolve_first(self.page, "odds format control", &strategies).await? {
            None => {
                warn!(
                    "odds format control not found; assuming '{}' is already active",
                    format.label()
                );
            }
            Some(control) => match self.drive_format_dropdown(&control, format).await {
                Ok(()) => info!("odds format changed"),
                Err(error) => warn!(
                    "odds format not changed, may already be set to '{}': {error}",
                    format.label()
                ),
            },
        }

        self.transition(MarketState::FormatSelected);
        Ok(())
    }

    async fn drive_format_dropdown(&self, control: &Locator, format: OddsFormat) -> Result<()> {
        self.page.dispatch_click(control).await?;
        self.page
            .wait_for(&Locator::css(FORMAT_DROPDOWN), SHORT_WAIT)
            .await?;
        self.page
            .dispatch_click(&Locator::css(FORMAT_DROPDOWN_OPTION).with_text(format.label()))
            .await?;
        Ok(())
    }

    /// Extract the three-way moneyline for one period.
    pub async fn moneyline(&self, period: MoneylinePeriod) -> Result<Vec<MoneylineQuote>> {
        self.load_market(&MarketTarget::Moneyline(period)).await?;
        let html = self.page.content().await?;
        Ok(parse_moneyline_rows(&html))
    }

    /// Extract over/under quotes for one goal line.
    pub async fn over_under(&self, line: OverUnderLine) -> Result<Vec<OverUnderQuote>> {
        self.load_market(&MarketTarget::OverUnder(line)).await?;
        let html = self.page.content().await?;
        Ok(parse_over_under_rows(&html, line))
    }

    /// Walk the page into the requested market and wait for its quote rows.
    ///
    /// A timeout on the rows gets one reload (status-retried, a reload can
    /// re-trigger the rate limiter) followed by one replay of the tab/option
    /// steps. A second timeout is fatal for this market only.
    async fn load_market(&self, target: &MarketTarget) -> Result<()> {
        info!("scraping odds for {}", target.describe());

        self.prepare(target).await?;

        let ready = target.ready_locator();
        match self.page.wait_for(&ready, DEFAULT_WAIT).await {
            Ok(()) => {}
            Err(error) if error.is_timeout() => {
                warn!(
                    "timeout waiting for {} odds; reloading page and replaying once",
                    target.describe()
                );
                reload_with_retry(self.page, &RetryPolicy::reload()).await?;
                self.transition(MarketState::FormatSelected);
                self.prepare(target).await?;
                self.page.wait_for(&ready, DEFAULT_WAIT).await?;
            }
            Err(error) => return Err(error.into()),
        }

        self.transition(MarketState::OddsLoaded);
        Ok(())
    }

    /// Open the market tab and pick the concrete option.
    async fn prepare(&self, target: &MarketTarget) -> Result<()> {
        match target {
            MarketTarget::Moneyline(period) => {
                // The moneyline family is the page's default tab; only the
                // period toggle needs driving.
                let tabs = Locator::css(MONEYLINE_PERIOD_TABS);
                self.page.wait_for(&tabs, DEFAULT_WAIT).await?;
                self.transition(MarketState::MarketTabOpen);

                self.page
                    .dispatch_click(&tabs.nth(period.tab_index()))
                    .await?;
                self.transition(MarketState::MarketOptionSelected);

                self.activate_all_bookies_filter().await;
            }
            MarketTarget::OverUnder(line) => {
                self.page
                    .dispatch_click(&Locator::css(OVER_UNDER_TAB).with_text(OVER_UNDER_TAB_TEXT))
                    .await?;
                self.transition(MarketState::MarketTabOpen);

                self.activate_all_bookies_filter().await;

                self.select_line_option(*line).await?;
                self.transition(MarketState::MarketOptionSelected);
            }
        }

        Ok(())
    }

    /// Click the `+X.5` option box, scrolling it into view once if needed.
    async fn select_line_option(&self, line: OverUnderLine) -> Result<()> {
        let option = Locator::css(OVER_UNDER_OPTION).with_text(line.target());

        match self.page.wait_for(&option, OPTION_VISIBLE_WAIT).await {
            Ok(()) => {}
            Err(error) if error.is_timeout() => {
                warn!(
                    "timeout waiting for {} option; scrolling and retrying",
                    line.target()
                );
                let viewport_height = f64::from(self.page.viewport().height);
                if let Err(scroll_error) = self.page.scroll_by(viewport_height).await {
                    debug!("scroll attempt failed: {scroll_error}");
                }
                self.page.wait_millis(SCROLL_SETTLE_MS).await;
                self.page.wait_for(&option, DEFAULT_WAIT).await?;
            }
            Err(error) => return Err(error.into()),
        }

        self.page.dispatch_click(&option).await?;
        Ok(())
    }

    /// Make sure quotes from every bookmaker are visible. Best-effort: the
    /// filter bar does not exist on all page variants.
    async fn activate_all_bookies_filter(&self) {
        match self
            .page
            .dispatch_click(&Locator::css(BOOKIES_FILTER_ALL))
            .await
        {
            Ok(()) => info!("all bookies filter activated"),
            Err(error) => warn!("unable to activate all bookies filter: {error}"),
        }
    }
}

static QUOTE_ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(QUOTE_ROW).unwrap());
static BOOKMAKER_NAME_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(BOOKMAKER_NAME).unwrap());
static ODD_CONTAINER_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(ODD_CONTAINER).unwrap());
static ODDS_LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(ODDS_LINK).unwrap());
static ODDS_TEXT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(ODDS_TEXT).unwrap());
static TOTAL_CONTAINER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(TOTAL_CONTAINER).unwrap());
static PROVIDER_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("[provider-name]").unwrap());
static ODDS_CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(ODDS_CELL).unwrap());

fn element_text(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<String>())
}

/// Odds value of one cell: the link text when the cell is clickable, the
/// plain paragraph otherwise.
fn quote_text(cell: ElementRef<'_>) -> Option<String> {
    let value = cell
        .select(&ODDS_LINK_SEL)
        .next()
        .or_else(|| cell.select(&ODDS_TEXT_SEL).next())
        .map(element_text)?;
    (!value.is_empty()).then_some(value)
}

/// Parse moneyline quote rows out of a page snapshot.
///
/// Every row is normalized to exactly three odds slots regardless of what
/// the DOM produced; downstream consumers index into home/draw/away blindly.
pub fn parse_moneyline_rows(html: &str) -> Vec<MoneylineQuote> {
    let document = Html::parse_document(html);

    document
        .select(&QUOTE_ROW_SEL)
        .map(|row| {
            let book_maker_name = row
                .select(&BOOKMAKER_NAME_SEL)
                .next()
                .map(element_text)
                .filter(|name| !name.is_empty());

            let mut odds: Vec<Option<String>> = row
                .select(&ODD_CONTAINER_SEL)
                .map(quote_text)
                .collect();
            odds.resize(3, None);

            let mut slots = odds.into_iter();
            MoneylineQuote {
                book_maker_name,
                hw: slots.next().flatten(),
                d: slots.next().flatten(),
                aw: slots.next().flatten(),
            }
        })
        .collect()
}

/// Parse over/under rows for one goal line out of a page snapshot.
///
/// Rows for other lines can be present in the same document (the site keeps
/// collapsed markets rendered); they are filtered by the total label or the
/// provider attribute. Incomplete rows are dropped.
pub fn parse_over_under_rows(html: &str, line: OverUnderLine) -> Vec<OverUnderQuote> {
    let document = Html::parse_document(html);
    let target = line.target();

    document
        .select(&QUOTE_ROW_SEL)
        .filter(|row| {
            let total_matches = row
                .select(&TOTAL_CONTAINER_SEL)
                .next()
                .map(element_text)
                .is_some_and(|text| text == target);
            let provider_matches = row
                .select(&PROVIDER_SEL)
                .next()
                .and_then(|el| el.value().attr(PROVIDER_ATTR))
                .is_some_and(|value| value == target);
            total_matches || provider_matches
        })
        .filter_map(|row| {
            let bookmaker_name = row
                .select(&BOOKMAKER_NAME_SEL)
                .next()
                .map(element_text)
                .filter(|name| !name.is_empty())?;

            let mut cells = row.select(&ODDS_CELL_SEL);
            let odds_over = cells.next().and_then(quote_text)?;
            let odds_under = cells.next().and_then(quote_text)?;

            Some(OverUnderQuote {
                bookmaker_name,
                odds_over,
                odds_under,
            })
        })
        .collect()
}
