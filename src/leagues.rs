//! League catalog and historic URL synthesis.

use std::str::FromStr;

use crate::error::ScrapeError;

pub const SITE_BASE_URL: &str = "https://www.oddsportal.com";

/// One scrapeable league.
///
/// `fixed_structure` marks leagues whose seasons run over a calendar year;
/// their result archives live at `{url}-{year}/results/` instead of the
/// `{url}-{year}-{year+1}/results/` shape European leagues use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct League {
    pub key: &'static str,
    pub base_url: &'static str,
    pub fixed_structure: bool,
}

const LEAGUES: &[League] = &[
    League { key: "premier-league", base_url: "https://www.oddsportal.com/football/england/premier-league", fixed_structure: false },
    League { key: "championship", base_url: "https://www.oddsportal.com/football/england/championship", fixed_structure: false },
    League { key: "ligue-1", base_url: "https://www.oddsportal.com/football/france/ligue-1", fixed_structure: false },
    League { key: "bundesliga", base_url: "https://www.oddsportal.com/football/germany/bundesliga", fixed_structure: false },
    League { key: "liga", base_url: "https://www.oddsportal.com/football/spain/laliga", fixed_structure: false },
    League { key: "serie-a", base_url: "https://www.oddsportal.com/football/italy/serie-a", fixed_structure: false },
    League { key: "liga-portugal", base_url: "https://www.oddsportal.com/football/portugal/liga-portugal", fixed_structure: false },
    League { key: "eredivisie", base_url: "https://www.oddsportal.com/football/netherlands/eredivisie", fixed_structure: false },
    League { key: "mls", base_url: "https://www.oddsportal.com/football/usa/mls", fixed_structure: true },
    League { key: "brazil-serie-a", base_url: "https://www.oddsportal.com/football/brazil/serie-a", fixed_structure: true },
    League { key: "liga-mx", base_url: "https://www.oddsportal.com/football/mexico/liga-de-expansion-mx", fixed_structure: true },
];

/// Look up a league by its CLI key. Unknown names fail fast, before any
/// browser work starts.
pub fn find_league(name: &str) -> Result<&'static League, ScrapeError> {
    LEAGUES
        .iter()
        .find(|league| league.key == name)
        .ok_or_else(|| ScrapeError::UnknownLeague(name.to_string()))
}

pub fn league_keys() -> impl Iterator<Item = &'static str> {
    LEAGUES.iter().map(|league| league.key)
}

/// Result-archive URLs for every season in the inclusive year range.
pub fn historic_urls(league: &League, start_year: i32, end_year: i32) -> Vec<String> {
    (start_year..=end_year)
        .map(|year| {
            if league.fixed_structure {
                format!("{}-{year}/results/", league.base_url)
            } else {
                format!("{}-{year}-{}/results/", league.base_url, year + 1)
            }
        })
        .collect()
}

/// Odds display format, as named in the site's format dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsFormat {
    Eu,
    Us,
    Uk,
    Hk,
    Ma,
    In,
}

impl OddsFormat {
    /// The dropdown entry label for this format.
    pub fn label(&self) -> &'static str {
        match self {
            OddsFormat::Eu => "EU Odds",
            OddsFormat::Us => "US Odds",
            OddsFormat::Uk => "UK Odds",
            OddsFormat::Hk => "HK Odds",
            OddsFormat::Ma => "MA Odds",
            OddsFormat::In => "IN Odds",
        }
    }
}

impl FromStr for OddsFormat {
    type Err = ScrapeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "eu" => Ok(OddsFormat::Eu),
            "us" => Ok(OddsFormat::Us),
            "uk" => Ok(OddsFormat::Uk),
            "hk" => Ok(OddsFormat::Hk),
            "ma" => Ok(OddsFormat::Ma),
            "in" => Ok(OddsFormat::In),
            other => Err(ScrapeError::UnsupportedOddsFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for OddsFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
