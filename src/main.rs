use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use futures_util::{Stream, StreamExt};
use tracing::{error, info};

use oddsportal_scraper::driver::chrome::ChromeDriver;
use oddsportal_scraper::leagues::league_keys;
use oddsportal_scraper::orchestrator::{historic, next_matches, NextMatchesOptions};
use oddsportal_scraper::{
    find_league, Exporter, FileExporter, HumanizeConfig, OddsFormat, S3Exporter, ScrapedMatch,
    Session, SessionConfig, SessionFactory,
};

#[derive(Parser)]
#[command(
    name = "odds-portal",
    version,
    about = "Scrape football betting odds (moneyline and over/under markets) for historic seasons and upcoming fixtures."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape odds for a league's upcoming fixtures.
    NextMatches {
        #[command(flatten)]
        common: CommonOpts,

        /// Scrape at most this many matches from the listing.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Scrape a league's historic result archives over an inclusive year range.
    Historic {
        #[command(flatten)]
        common: CommonOpts,

        /// First season year.
        #[arg(long)]
        from_year: i32,

        /// Last season year, inclusive.
        #[arg(long)]
        to_year: i32,
    },
}

#[derive(Args)]
struct CommonOpts {
    /// League key, e.g. premier-league.
    #[arg(long)]
    league: String,

    /// Odds display format: eu, us, uk, hk, ma or in.
    #[arg(long, default_value = "eu")]
    format: OddsFormat,

    /// Directory for the exported JSON files.
    #[arg(long, default_value = "./data")]
    out_dir: PathBuf,

    /// Upload records to this S3 bucket instead of the local directory.
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Proxy server, scheme://host:port.
    #[arg(long, env = "ODDS_PORTAL_PROXY_URL")]
    proxy: Option<String>,

    /// Run the browser with a visible window.
    #[arg(long)]
    headful: bool,

    /// Inject humanized pointer/scroll noise between page actions.
    #[arg(long)]
    humanize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::NextMatches { common, limit } => run_next_matches(common, limit).await,
        Command::Historic {
            common,
            from_year,
            to_year,
        } => run_historic(common, from_year, to_year).await,
    }
}

async fn run_next_matches(opts: CommonOpts, limit: Option<usize>) -> anyhow::Result<()> {
    validate_league(&opts.league)?;

    let exporter = build_exporter(&opts).await;
    let session = launch_session(&opts)?;

    info!("🚀 scraping next matches for {}", opts.league);
    let run = next_matches(
        &session,
        &opts.league,
        opts.format,
        NextMatchesOptions {
            limit,
            humanize: humanize_config(&opts),
        },
    );
    let outcome = drain(run, &exporter).await;

    info!("closing browser");
    session.close().await;
    outcome
}

async fn run_historic(opts: CommonOpts, from_year: i32, to_year: i32) -> anyhow::Result<()> {
    validate_league(&opts.league)?;
    anyhow::ensure!(
        from_year <= to_year,
        "--from-year must not be after --to-year"
    );

    let exporter = build_exporter(&opts).await;
    let session = launch_session(&opts)?;

    info!(
        "🚀 scraping historic odds for {} ({from_year}-{to_year})",
        opts.league
    );
    let run = historic(&session, &opts.league, from_year, to_year, opts.format);
    let outcome = drain(run, &exporter).await;

    info!("closing browser");
    session.close().await;
    outcome
}

/// Reject unknown leagues before a browser ever launches.
fn validate_league(league: &str) -> anyhow::Result<()> {
    find_league(league).map(|_| ()).map_err(|error| {
        anyhow::anyhow!(
            "{error}; known leagues: {}",
            league_keys().collect::<Vec<_>>().join(", ")
        )
    })
}

fn launch_session(opts: &CommonOpts) -> anyhow::Result<Session<ChromeDriver>> {
    let factory = SessionFactory::new(SessionConfig {
        headless: !opts.headful,
        proxy_url: opts.proxy.clone(),
        extra_args: Vec::new(),
    });
    Ok(factory.launch()?)
}

async fn build_exporter(opts: &CommonOpts) -> Exporter {
    match &opts.s3_bucket {
        Some(bucket) => Exporter::S3(S3Exporter::from_env(bucket).await),
        None => Exporter::File(FileExporter::new(&opts.out_dir)),
    }
}

fn humanize_config(opts: &CommonOpts) -> HumanizeConfig {
    if opts.humanize {
        HumanizeConfig::enabled()
    } else {
        HumanizeConfig::default()
    }
}

/// Pull the run to completion, handing each record to the exporter as it
/// arrives. An exporter failure stops the run; a fatal scrape error is
/// reported after whatever was already exported.
async fn drain<S>(stream: S, exporter: &Exporter) -> anyhow::Result<()>
where
    S: Stream<Item = oddsportal_scraper::Result<ScrapedMatch>>,
{
    futures_util::pin_mut!(stream);

    let mut exported = 0usize;
    let mut fatal = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(scraped) => {
                exporter.export(&scraped.data, &scraped.file_name).await?;
                exported += 1;
            }
            Err(scrape_error) => {
                error!("scrape failed: {scrape_error}");
                fatal = Some(scrape_error);
            }
        }
    }

    info!("✅ exported {exported} match(es)");
    match fatal {
        Some(scrape_error) => Err(scrape_error.into()),
        None => Ok(()),
    }
}
