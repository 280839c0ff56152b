//! Shared DOM-snapshot helpers.
//!
//! Both the Chrome driver and the test fake answer locator reads the same
//! way: take the page HTML, parse it, apply the locator. Keeping this in one
//! place guarantees the fake sees exactly what production sees.

use std::collections::HashMap;

use scraper::{Html, Selector};

use super::{DriverError, Locator};

/// A detached view of one matched element.
#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    pub text: String,
    pub attrs: HashMap<String, String>,
}

/// Collapse runs of whitespace the way `textContent` readers expect.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply a [`Locator`] to an HTML snapshot.
pub fn select_snapshots(html: &str, locator: &Locator) -> Result<Vec<ElementSnapshot>, DriverError> {
    let selector = Selector::parse(&locator.css)
        .map_err(|_| DriverError::Selector(locator.css.clone()))?;

    let document = Html::parse_document(html);
    let mut matches: Vec<ElementSnapshot> = document
        .select(&selector)
        .map(|el| ElementSnapshot {
            text: normalize_text(&el.text().collect::<String>()),
            attrs: el
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
        .filter(|snapshot| match &locator.text {
            Some(filter) => filter.is_match(&snapshot.text),
            None => true,
        })
        .collect();

    if let Some(nth) = locator.nth {
        matches = matches.into_iter().skip(nth).take(1).collect();
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    const HTML: &str = r#"
        <div class="group">
            <button class="gap-2">Decimal Odds</button>
            <button class="gap-2">Language</button>
        </div>
        <a class="pagination-link" href="#/page/1">1</a>
        <a class="pagination-link" href="#/page/2">2</a>
    "#;

    #[test]
    fn text_filter_narrows_matches() {
        let locator = Locator::css("button").with_text("Decimal");
        let found = select_snapshots(HTML, &locator).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "Decimal Odds");
    }

    #[test]
    fn regex_filter_and_nth() {
        let locator = Locator::css("a.pagination-link")
            .matching(Regex::new(r"^\d+$").unwrap())
            .nth(1);
        let found = select_snapshots(HTML, &locator).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "2");
        assert_eq!(found[0].attrs.get("href").map(String::as_str), Some("#/page/2"));
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_text("  1.91 \n\t "), "1.91");
    }
}
