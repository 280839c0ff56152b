//! Per-match scraping: navigation, metadata and the six mandatory markets.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::actions::{action_retry_default, ActionRunner, ACTION_DELAY_DEFAULT_MS};
use crate::driver::{Locator, PageDriver};
use crate::error::{Result, ScrapeError};
use crate::humanize::HumanizeConfig;
use crate::leagues::SITE_BASE_URL;
use crate::markets::{
    MarketSelector, MoneylinePeriod, MoneylineQuote, OverUnderLine, OverUnderQuote,
};
use crate::retry::{goto_with_retry, RetryPolicy};

const GAME_TIME: &str = r#"[data-testid="game-time-item"] p"#;
const GAME_TIME_FALLBACK: &str = ".text-xs.text-gray-dark";
const GAME_PARTICIPANTS: &str = r#"[data-testid="game-participants"] p.truncate"#;
const GAME_TITLE: &str = "h1";
const GAME_TITLE_SEPARATOR: &str = " - ";
const MATCH_ROW: &str = r#"div[data-testid="game-row"]"#;

const LONG_WAIT: Duration = Duration::from_secs(5);
const SHORT_WAIT: Duration = Duration::from_secs(3);
const LIST_WAIT: Duration = Duration::from_secs(30);

/// When and who. Never empty: the last fallback tier synthesizes values, a
/// match record without participants is unusable downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub day: String,
    pub date: String,
    pub time: String,
    pub home_team: String,
    pub away_team: String,
}

/// One fully scraped match, immutable once yielded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub scraped_at: String,
    pub league_name: String,
    pub day: String,
    pub date: String,
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    pub ml_full_time: Vec<MoneylineQuote>,
    pub ml_first_half: Vec<MoneylineQuote>,
    pub ml_second_half: Vec<MoneylineQuote>,
    pub under_over_15: Vec<OverUnderQuote>,
    pub under_over_25: Vec<OverUnderQuote>,
    pub under_over_35: Vec<OverUnderQuote>,
}

/// A match record paired with the file name the sink should use.
#[derive(Debug, Clone)]
pub struct ScrapedMatch {
    pub data: MatchRecord,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct ScrapeMatchOptions {
    pub retry: RetryPolicy,
    pub action_delay_ms: u64,
    pub action_retry: RetryPolicy,
    pub humanize: HumanizeConfig,
}

impl Default for ScrapeMatchOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::match_page(),
            action_delay_ms: ACTION_DELAY_DEFAULT_MS,
            action_retry: action_retry_default(),
            humanize: HumanizeConfig::default(),
        }
    }
}

/// Scrape one match page end to end.
///
/// Any market exhausting its action retries fails the whole match; the
/// collection loop catches that, logs it and moves on. A single bad match
/// must never take the batch down.
pub async fn scrape_match<P: PageDriver>(
    page: &P,
    link: &str,
    league_name: &str,
    options: &ScrapeMatchOptions,
) -> Result<ScrapedMatch> {
    let url = format!("{SITE_BASE_URL}{link}");

    let result = scrape_match_inner(page, &url, league_name, options).await;
    if let Err(ref err) = result {
        error!("extracting data for {url}: {err}");
    }
    result
}

async fn scrape_match_inner<P: PageDriver>(
    page: &P,
    url: &str,
    league_name: &str,
    options: &ScrapeMatchOptions,
) -> Result<ScrapedMatch> {
    goto_with_retry(page, url, &options.retry).await?;

    let mut runner = ActionRunner::new(
        page,
        options.action_delay_ms,
        options.action_retry.clone(),
        options.humanize,
    );

    let metadata = runner
        .run("match metadata", || extract_match_metadata(page))
        .await?;
    info!(
        "scraping {} vs {} ({})",
        metadata.home_team, metadata.away_team, metadata.date
    );

    let markets = MarketSelector::new(page);
    let selector = &markets;

    let ml_full_time = runner
        .run("moneyline odds (full time)", || {
            selector.moneyline(MoneylinePeriod::FullTime)
        })
        .await?;
    let ml_first_half = runner
        .run("moneyline odds (first half)", || {
            selector.moneyline(MoneylinePeriod::FirstHalf)
        })
        .await?;
    let ml_second_half = runner
        .run("moneyline odds (second half)", || {
            selector.moneyline(MoneylinePeriod::SecondHalf)
        })
        .await?;
    let under_over_25 = runner
        .run("over/under odds (2.5)", || {
            selector.over_under(OverUnderLine::Plus25)
        })
        .await?;
    let under_over_15 = runner
        .run("over/under odds (1.5)", || {
            selector.over_under(OverUnderLine::Plus15)
        })
        .await?;
    let under_over_35 = runner
        .run("over/under odds (3.5)", || {
            selector.over_under(OverUnderLine::Plus35)
        })
        .await?;

    let file_name = format!(
        "{}-{}-{}.json",
        metadata.date, metadata.home_team, metadata.away_team
    );

    let data = MatchRecord {
        scraped_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        league_name: league_name.to_string(),
        day: metadata.day,
        date: metadata.date,
        time: metadata.time,
        home_team: metadata.home_team,
        away_team: metadata.away_team,
        ml_full_time,
        ml_first_half,
        ml_second_half,
        under_over_15,
        under_over_25,
        under_over_35,
    };

    Ok(ScrapedMatch { data, file_name })
}

/// Extract match metadata with layered fallback.
///
/// Date/time and participant markup are the most volatile parts of the page,
/// so each read degrades through tiers instead of failing: structured
/// selectors, then generic classes, then the URL slug / synthesized values.
pub async fn extract_match_metadata<P: PageDriver>(page: &P) -> Result<MatchMetadata> {
    let (day, date, time) = read_date_time(page).await?;
    let (home_team, away_team) = read_participants(page).await?;

    Ok(MatchMetadata {
        day,
        date,
        time,
        home_team,
        away_team,
    })
}

async fn read_date_time<P: PageDriver>(page: &P) -> Result<(String, String, String)> {
    for (selector, timeout) in [(GAME_TIME, LONG_WAIT), (GAME_TIME_FALLBACK, SHORT_WAIT)] {
        let locator = Locator::css(selector);
        match page.wait_for(&locator, timeout).await {
            Ok(()) => {
                let parts = page.texts(&locator).await?;
                if parts.len() >= 3 {
                    let mut parts = parts.into_iter();
                    return Ok((
                        parts.next().unwrap_or_default(),
                        parts.next().unwrap_or_default(),
                        parts.next().unwrap_or_default(),
                    ));
                }
            }
            Err(error) if error.is_timeout() => continue,
            Err(error) => return Err(error.into()),
        }
    }

    let now = Local::now();
    Ok((
        "Today".to_string(),
        now.format("%Y-%m-%d").to_string(),
        now.format("%H:%M:%S").to_string(),
    ))
}

async fn read_participants<P: PageDriver>(page: &P) -> Result<(String, String)> {
    let participants = Locator::css(GAME_PARTICIPANTS);
    match page.wait_for(&participants, LONG_WAIT).await {
        Ok(()) => {
            let teams = page.texts(&participants).await?;
            if teams.len() >= 2 {
                let mut teams = teams.into_iter();
                return Ok((teams.next().unwrap_or_default(), teams.next().unwrap_or_default()));
            }
        }
        Err(error) if error.is_timeout() => {}
        Err(error) => return Err(error.into()),
    }

    let title = Locator::css(GAME_TITLE).with_text(GAME_TITLE_SEPARATOR);
    match page.wait_for(&title, SHORT_WAIT).await {
        Ok(()) => {
            if let Some(heading) = page.texts(&title).await?.into_iter().next() {
                let mut parts = heading.split(GAME_TITLE_SEPARATOR).map(str::trim);
                if let (Some(home), Some(away)) = (parts.next(), parts.next()) {
                    if !home.is_empty() && !away.is_empty() {
                        return Ok((home.to_string(), away.to_string()));
                    }
                }
            }
        }
        Err(error) if error.is_timeout() => {}
        Err(error) => return Err(error.into()),
    }

    parse_participants_from_url(&page.current_url()).ok_or(ScrapeError::ParticipantsUnresolved)
}

/// Derive team names from a match URL slug: the last path segment, hyphen
/// split, first two tokens capitalized.
fn parse_participants_from_url(url: &str) -> Option<(String, String)> {
    let path = url.split('#').next()?.split('?').next()?;
    let slug = path.split('/').filter(|segment| !segment.is_empty()).last()?;

    let mut tokens = slug.split('-').filter(|token| !token.is_empty());
    let home = tokens.next()?;
    let away = tokens.next()?;

    Some((capitalize(home), capitalize(away)))
}

fn capitalize(token: &str) -> String {
    let lower = token.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Collect unique match links from the loaded listing page, in page order.
pub async fn collect_match_links<P: PageDriver>(
    page: &P,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    info!("fetching match links");

    page.wait_for(&Locator::css(MATCH_ROW), LIST_WAIT).await?;

    let hrefs = page
        .attr_values(&Locator::css(format!("{MATCH_ROW} a")), "href")
        .await?;

    let mut seen = HashSet::new();
    let mut links: Vec<String> = hrefs
        .into_iter()
        .filter(|href| !href.is_empty())
        .filter(|href| seen.insert(href.clone()))
        .collect();

    if let Some(limit) = limit {
        links.truncate(limit);
    }

    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeSite;
    use crate::driver::Driver;

    #[test]
    fn participants_come_from_the_url_slug() {
        let (home, away) = parse_participants_from_url(
            "https://www.oddsportal.com/football/england/premier-league/arsenal-chelsea-AbCd1234/#over-under",
        )
        .unwrap();
        assert_eq!((home.as_str(), away.as_str()), ("Arsenal", "Chelsea"));

        // The slug tier takes the first two tokens; multi-word club names
        // degrade but stay non-empty.
        let (home, away) = parse_participants_from_url(
            "https://www.oddsportal.com/match/manchester-united-liverpool/",
        )
        .unwrap();
        assert_eq!((home.as_str(), away.as_str()), ("Manchester", "United"));
    }

    #[test]
    fn slug_with_a_single_token_is_rejected() {
        assert!(parse_participants_from_url("https://example.test/lonely/").is_none());
        assert!(parse_participants_from_url("").is_none());
    }

    #[tokio::test]
    async fn metadata_falls_back_to_slug_and_synthesized_datetime() {
        let site = FakeSite::new();
        site.add_page(
            "https://www.oddsportal.com/football/spain/laliga/barcelona-sevilla/",
            "<html><body><div>nothing structured at all</div></body></html>",
        );

        let driver = site.driver();
        let page = driver.open_page().await.unwrap();
        page.navigate("https://www.oddsportal.com/football/spain/laliga/barcelona-sevilla/")
            .await
            .unwrap();

        let metadata = extract_match_metadata(&page).await.unwrap();
        assert_eq!(metadata.home_team, "Barcelona");
        assert_eq!(metadata.away_team, "Sevilla");
        assert_eq!(metadata.day, "Today");
        assert!(!metadata.date.is_empty());
        assert!(!metadata.time.is_empty());
    }

    #[tokio::test]
    async fn metadata_prefers_structured_selectors() {
        let site = FakeSite::new();
        site.add_page(
            "https://www.oddsportal.com/m/1",
            r#"<html><body>
                <div data-testid="game-time-item"><p>Saturday</p><p>12 Oct 2024</p><p>16:30</p></div>
                <div data-testid="game-participants">
                    <p class="truncate">Arsenal</p>
                    <p class="truncate">Chelsea</p>
                </div>
            </body></html>"#,
        );

        let driver = site.driver();
        let page = driver.open_page().await.unwrap();
        page.navigate("https://www.oddsportal.com/m/1").await.unwrap();

        let metadata = extract_match_metadata(&page).await.unwrap();
        assert_eq!(
            metadata,
            MatchMetadata {
                day: "Saturday".into(),
                date: "12 Oct 2024".into(),
                time: "16:30".into(),
                home_team: "Arsenal".into(),
                away_team: "Chelsea".into(),
            }
        );
    }

    #[tokio::test]
    async fn metadata_splits_the_title_heading() {
        let site = FakeSite::new();
        site.add_page(
            "https://www.oddsportal.com/m/2",
            r#"<html><body><h1><span>Real Madrid - Valencia</span></h1></body></html>"#,
        );

        let driver = site.driver();
        let page = driver.open_page().await.unwrap();
        page.navigate("https://www.oddsportal.com/m/2").await.unwrap();

        let (home, away) = read_participants(&page).await.unwrap();
        assert_eq!((home.as_str(), away.as_str()), ("Real Madrid", "Valencia"));
    }

    #[tokio::test]
    async fn match_links_are_deduplicated_and_capped() {
        let site = FakeSite::new();
        site.add_page(
            "https://www.oddsportal.com/list",
            r#"<html><body>
                <div data-testid="game-row"><a href="/m/a/">A</a><a href="/m/a/">A again</a></div>
                <div data-testid="game-row"><a href="/m/b/">B</a></div>
                <div data-testid="game-row"><a href="/m/c/">C</a></div>
            </body></html>"#,
        );

        let driver = site.driver();
        let page = driver.open_page().await.unwrap();
        page.navigate("https://www.oddsportal.com/list").await.unwrap();

        let all = collect_match_links(&page, None).await.unwrap();
        assert_eq!(all, vec!["/m/a/", "/m/b/", "/m/c/"]);

        let capped = collect_match_links(&page, Some(2)).await.unwrap();
        assert_eq!(capped, vec!["/m/a/", "/m/b/"]);
    }
}
