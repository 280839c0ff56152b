//! End-to-end scrape runs, exposed as pull-based streams.
//!
//! Nothing here buffers a run's results: each scraped match is yielded as it
//! completes so the consuming sink can persist incrementally, and dropping
//! the stream (plus closing the session) is how a caller cancels a run.

use std::pin::Pin;

use async_stream::stream;
use futures_util::stream::{select_all, Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::driver::{Driver, PageDriver};
use crate::error::Result;
use crate::humanize::HumanizeConfig;
use crate::leagues::{find_league, historic_urls, League, OddsFormat};
use crate::matches::{collect_match_links, scrape_match, ScrapeMatchOptions, ScrapedMatch};
use crate::markets::MarketSelector;
use crate::retry::{goto_with_retry, RetryPolicy, ThrottlePolicy};
use crate::seasons::discover_season_pages;
use crate::session::Session;

/// Options for the shared collect-and-scrape routine on one listing page.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub league_name: String,
    pub odds_format: OddsFormat,
    pub limit: Option<usize>,
    pub throttle: Option<ThrottlePolicy>,
    pub match_options: ScrapeMatchOptions,
}

#[derive(Debug, Clone)]
pub struct NextMatchesOptions {
    pub limit: Option<usize>,
    pub humanize: HumanizeConfig,
}

impl Default for NextMatchesOptions {
    fn default() -> Self {
        Self {
            limit: None,
            humanize: HumanizeConfig::default(),
        }
    }
}

/// The shared collect-and-scrape routine (listing page already loaded).
///
/// Sets the odds format once, collects the unique match links, then walks
/// them sequentially with a throttle gap between matches. Sequential on
/// purpose: concurrent match scrapes through one page are impossible, and
/// concurrent pages against the same listing amplify the bot signal the rest
/// of this crate works to suppress.
///
/// A failed match is logged and skipped; a failure to read the listing
/// itself ends the stream with that error.
pub fn collect_match_data<P: PageDriver>(
    page: &P,
    options: CollectOptions,
) -> impl Stream<Item = Result<ScrapedMatch>> + '_ {
    stream! {
        let selector = MarketSelector::new(page);
        if let Err(error) = selector.set_format(options.odds_format).await {
            yield Err(error);
            return;
        }

        let links = match collect_match_links(page, options.limit).await {
            Ok(links) => links,
            Err(error) => {
                yield Err(error);
                return;
            }
        };
        info!("collected {} match links", links.len());

        let mut first = true;
        for link in links {
            if !first {
                if let Some(throttle) = &options.throttle {
                    page.wait_millis(throttle.resolve()).await;
                }
            }
            first = false;

            match scrape_match(page, &link, &options.league_name, &options.match_options).await {
                Ok(scraped) => yield Ok(scraped),
                Err(error) => error!("skipping match {link}: {error}"),
            }
        }
    }
}

/// Scrape the upcoming fixtures of one league.
pub fn next_matches<'a, D: Driver>(
    session: &'a Session<D>,
    league_name: &'a str,
    odds_format: OddsFormat,
    options: NextMatchesOptions,
) -> impl Stream<Item = Result<ScrapedMatch>> + 'a {
    stream! {
        let league = match find_league(league_name) {
            Ok(league) => league,
            Err(error) => {
                yield Err(error);
                return;
            }
        };

        let page = match session.page().await {
            Ok(page) => page,
            Err(error) => {
                yield Err(error);
                return;
            }
        };

        info!("scraping next matches from {}", league.base_url);

        match goto_with_retry(&page, league.base_url, &RetryPolicy::list_page()).await {
            Ok(_) => {
                let collect = collect_match_data(&page, CollectOptions {
                    league_name: league.key.to_string(),
                    odds_format,
                    limit: options.limit,
                    throttle: Some(ThrottlePolicy::next_matches()),
                    match_options: ScrapeMatchOptions {
                        retry: RetryPolicy::match_page(),
                        humanize: options.humanize,
                        ..ScrapeMatchOptions::default()
                    },
                });
                futures_util::pin_mut!(collect);
                while let Some(item) = collect.next().await {
                    yield item;
                }
            }
            Err(error) => yield Err(error),
        }

        close_page(&page).await;
    }
}

/// Scrape historic seasons of one league over an inclusive year range.
///
/// Each season gets its own page and the per-season streams are merged
/// cooperatively, so seasons progress in parallel at every await point
/// without any task spawning. Failures follow all-settled semantics: a
/// season that dies is logged and counted, the others keep going.
pub fn historic<'a, D: Driver>(
    session: &'a Session<D>,
    league_name: &'a str,
    start_year: i32,
    end_year: i32,
    odds_format: OddsFormat,
) -> impl Stream<Item = Result<ScrapedMatch>> + 'a {
    stream! {
        let league = match find_league(league_name) {
            Ok(league) => league,
            Err(error) => {
                yield Err(error);
                return;
            }
        };

        let season_urls = historic_urls(league, start_year, end_year);
        if season_urls.is_empty() {
            warn!("year range {start_year}-{end_year} contains no seasons");
            return;
        }
        info!("historic scrape of {} across {} seasons", league.key, season_urls.len());

        let mut seasons: Vec<Pin<Box<dyn Stream<Item = Result<ScrapedMatch>> + 'a>>> =
            Vec::with_capacity(season_urls.len());
        for season_url in season_urls {
            seasons.push(Box::pin(season_stream(session, league, season_url, odds_format)));
        }

        let mut merged = select_all(seasons);
        let mut failed_seasons = 0u32;

        while let Some(item) = merged.next().await {
            match item {
                Ok(scraped) => yield Ok(scraped),
                Err(error) => {
                    // All-settled: the season already aborted itself; record
                    // and keep draining the others.
                    error!("season aborted: {error}");
                    failed_seasons += 1;
                }
            }
        }

        if failed_seasons > 0 {
            warn!("{failed_seasons} season(s) aborted before completion");
        }
    }
}

/// One season's worth of matches. The final `Err` item, if any, marks the
/// point where the season aborted; nothing follows it.
fn season_stream<'a, D: Driver>(
    session: &'a Session<D>,
    league: &'static League,
    season_url: String,
    odds_format: OddsFormat,
) -> impl Stream<Item = Result<ScrapedMatch>> + 'a {
    stream! {
        let page = match session.page().await {
            Ok(page) => page,
            Err(error) => {
                yield Err(error);
                return;
            }
        };

        let page_urls = match discover_season_pages(&page, &season_url).await {
            Ok(urls) => urls,
            Err(error) => {
                close_page(&page).await;
                yield Err(error);
                return;
            }
        };

        'season: for page_url in page_urls {
            info!("starting scrape for: {page_url}");

            if let Err(error) = goto_with_retry(&page, &page_url, &RetryPolicy::list_page()).await {
                yield Err(error);
                break 'season;
            }

            let collect = collect_match_data(&page, CollectOptions {
                league_name: league.key.to_string(),
                odds_format,
                limit: None,
                throttle: None,
                match_options: ScrapeMatchOptions::default(),
            });
            futures_util::pin_mut!(collect);

            while let Some(item) = collect.next().await {
                match item {
                    Ok(scraped) => yield Ok(scraped),
                    Err(error) => {
                        // A listing-level failure poisons the remaining
                        // pages of this season, not the other seasons.
                        yield Err(error);
                        break 'season;
                    }
                }
            }
        }

        close_page(&page).await;
    }
}

async fn close_page<P: PageDriver>(page: &P) {
    if page.is_closed() {
        return;
    }
    if let Err(error) = page.close().await {
        debug!("page close failed: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, FakeSite};
    use crate::markets::{MoneylineQuote, OverUnderQuote};

    const LISTING_BODY: &str = r#"<html><body>
        <div data-testid="game-row"><a href="/football/england/premier-league/arsenal-chelsea-x1/">A v C</a></div>
        <div data-testid="game-row"><a href="/football/england/premier-league/leeds-everton-x2/">L v E</a></div>
        <div data-testid="game-row"><a href="/football/england/premier-league/arsenal-chelsea-x1/">A v C dup</a></div>
    </body></html>"#;

    fn match_body(home: &str, away: &str) -> String {
        format!(
            r#"<html><body>
            <div data-testid="game-time-item"><p>Saturday</p><p>2024-10-12</p><p>16:30</p></div>
            <div data-testid="game-participants">
                <p class="truncate">{home}</p>
                <p class="truncate">{away}</p>
            </div>
            <div class="flex-center bg-gray-medium">FT</div>
            <div class="flex-center bg-gray-medium">1H</div>
            <div class="flex-center bg-gray-medium">2H</div>
            <div class="hide-menu"><ul><li><div>Over/Under</div></li></ul></div>
            <div data-testid="over-under-collapsed-option-box">Over/Under +1.5</div>
            <div data-testid="over-under-collapsed-option-box">Over/Under +2.5</div>
            <div data-testid="over-under-collapsed-option-box">Over/Under +3.5</div>
            <div data-testid="over-under-expanded-row">
                <div data-testid="total-container">+2.5</div>
                <p data-testid="outrights-expanded-bookmaker-name">bet365</p>
                <div data-testid="odd-container"><p class="odds-text">1.91</p></div>
                <div data-testid="odd-container"><p class="odds-text">3.40</p></div>
                <div data-testid="odd-container"><p class="odds-text">4.20</p></div>
                <div class="odds-cell"><p class="odds-text">1.85</p></div>
                <div class="odds-cell"><p class="odds-text">1.95</p></div>
            </div>
        </body></html>"#
        )
    }

    fn seeded_site() -> FakeSite {
        let site = FakeSite::new();
        site.add_page(
            "https://www.oddsportal.com/football/england/premier-league",
            LISTING_BODY,
        );
        site.add_page(
            "https://www.oddsportal.com/football/england/premier-league/arsenal-chelsea-x1/",
            &match_body("Arsenal", "Chelsea"),
        );
        site.add_page(
            "https://www.oddsportal.com/football/england/premier-league/leeds-everton-x2/",
            &match_body("Leeds", "Everton"),
        );
        site
    }

    #[tokio::test]
    async fn next_matches_yields_one_record_per_unique_link() {
        let site = seeded_site();
        let session = Session::new(site.driver());

        let run = next_matches(
            &session,
            "premier-league",
            OddsFormat::Eu,
            NextMatchesOptions::default(),
        );
        futures_util::pin_mut!(run);

        // The external sink: one call per yielded record.
        let mut sink_calls: Vec<ScrapedMatch> = Vec::new();
        while let Some(item) = run.next().await {
            sink_calls.push(item.unwrap());
        }

        assert_eq!(sink_calls.len(), 2);
        assert_eq!(sink_calls[0].data.home_team, "Arsenal");
        assert_eq!(sink_calls[0].file_name, "2024-10-12-Arsenal-Chelsea.json");
        assert_eq!(sink_calls[1].data.home_team, "Leeds");

        for scraped in &sink_calls {
            let record = &scraped.data;
            assert_eq!(record.league_name, "premier-league");

            // Moneyline markets resolved with all three slots filled.
            assert_eq!(
                record.ml_full_time,
                vec![MoneylineQuote {
                    book_maker_name: Some("bet365".into()),
                    hw: Some("1.91".into()),
                    d: Some("3.40".into()),
                    aw: Some("4.20".into()),
                }]
            );

            // The +2.5 line has a complete quote; the other lines resolved
            // to empty arrays rather than being absent from the record.
            assert_eq!(
                record.under_over_25,
                vec![OverUnderQuote {
                    bookmaker_name: "bet365".into(),
                    odds_over: "1.85".into(),
                    odds_under: "1.95".into(),
                }]
            );
            assert!(record.under_over_15.is_empty());
            assert!(record.under_over_35.is_empty());
        }
    }

    #[tokio::test]
    async fn next_matches_honors_the_limit() {
        let site = seeded_site();
        let session = Session::new(site.driver());

        let run = next_matches(
            &session,
            "premier-league",
            OddsFormat::Eu,
            NextMatchesOptions { limit: Some(1), humanize: HumanizeConfig::default() },
        );
        futures_util::pin_mut!(run);

        let mut yielded = 0;
        while let Some(item) = run.next().await {
            item.unwrap();
            yielded += 1;
        }
        assert_eq!(yielded, 1);
    }

    #[tokio::test]
    async fn unknown_league_fails_before_any_navigation() {
        let site = FakeSite::new();
        let session: Session<FakeDriver> = Session::new(site.driver());

        let run = next_matches(
            &session,
            "sunday-league",
            OddsFormat::Eu,
            NextMatchesOptions::default(),
        );
        futures_util::pin_mut!(run);

        let first = run.next().await.unwrap();
        assert!(matches!(first, Err(crate::error::ScrapeError::UnknownLeague(_))));
        assert!(run.next().await.is_none());
        assert_eq!(site.total_nav_attempts(), 0);
    }

    #[tokio::test]
    async fn historic_walks_seasons_and_survives_a_dead_one() {
        let site = FakeSite::new();

        // 2022 season: one listing page with one match. 2023 season: the
        // listing never loads (430 forever) and must not take 2022 down.
        site.add_page(
            "https://www.oddsportal.com/football/usa/mls-2022/results/",
            r#"<html><body>
                <div data-testid="game-row"><a href="/football/usa/mls/la-galaxy-austin-x9/">match</a></div>
            </body></html>"#,
        );
        site.add_page(
            "https://www.oddsportal.com/football/usa/mls/la-galaxy-austin-x9/",
            &match_body("LA Galaxy", "Austin"),
        );
        site.add_page_with(
            "https://www.oddsportal.com/football/usa/mls-2023/results/",
            &[430],
            &["<html><body>blocked</body></html>"],
        );

        let session = Session::new(site.driver());

        let run = historic(&session, "mls", 2022, 2023, OddsFormat::Eu);
        futures_util::pin_mut!(run);

        let mut records = Vec::new();
        while let Some(item) = run.next().await {
            if let Ok(scraped) = item {
                records.push(scraped);
            }
        }

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data.home_team, "LA Galaxy");
        assert_eq!(records[0].data.league_name, "mls");
        // The blocked season was retried to policy exhaustion.
        assert_eq!(
            site.nav_attempts("https://www.oddsportal.com/football/usa/mls-2023/results/"),
            5
        );
    }
}
