//! Review extraction strategies.
//!
//! Each strategy is one self-contained way of finding reviews in the rendered
//! review page. The chain runs them in priority order and merges the output:
//!
//! 1. `structured`        DOM + selector cascades
//! 2. `review-header`     "Critique de TITLE par USER" headers
//! 3. `testid-block`      blocks tagged `data-testid="review-overview"`
//! 4. `heading-date`      heading + paragraph + date phrase (fallback)
//! 5. `heading-paragraph` heading + paragraph (fallback)
//!
//! Fallbacks only run while nothing has been found. Supporting a markup change
//! means adding a strategy here, not touching the harvest flow.

mod patterns;
mod structured;

pub use patterns::{
    HeadingParagraphDatePattern, HeadingParagraphPattern, ReviewHeaderPattern, TestIdBlockPattern,
};
pub use structured::StructuredStrategy;

use crate::errors::{HarvestError, Result};
use crate::models::{Origin, RawReview};
use crate::scraper::cleaner::{normalized_title, sanitize_text};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

// ── Strategy trait ────────────────────────────────────────────────────────────

pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn origin(&self) -> Origin;

    /// Only attempted when every earlier strategy came back empty.
    fn is_fallback(&self) -> bool {
        false
    }

    fn attempt(&self, markup: &str) -> Vec<RawReview>;
}

// ── Chain ─────────────────────────────────────────────────────────────────────

pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// The SensCritique set, in priority order.
    pub fn senscritique(username: &str, base_url: &Url) -> Self {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> =
            vec![Box::new(StructuredStrategy::new(base_url.clone()))];

        match ReviewHeaderPattern::new(username, base_url.clone()) {
            Ok(s) => strategies.push(Box::new(s)),
            Err(e) => warn!("review-header pattern disabled: {}", e),
        }
        strategies.push(Box::new(TestIdBlockPattern::new(base_url.clone())));
        strategies.push(Box::new(HeadingParagraphDatePattern::new(base_url.clone())));
        strategies.push(Box::new(HeadingParagraphPattern::new(base_url.clone())));

        Self::new(strategies)
    }

    /// Run every applicable strategy and merge.
    ///
    /// A pattern candidate is dropped when a structured one already has the
    /// same title and the same first 50 characters of content. Structured
    /// output always comes first so it wins later title dedup.
    pub fn extract(&self, markup: &str) -> Result<Vec<RawReview>> {
        let mut merged: Vec<RawReview> = Vec::new();
        let mut structured_keys: HashSet<(String, String)> = HashSet::new();

        for strategy in &self.strategies {
            if strategy.is_fallback() && !merged.is_empty() {
                continue;
            }

            let found = strategy.attempt(markup);
            debug!("Strategy {}: {} candidates", strategy.name(), found.len());

            let origin = strategy.origin();
            for mut candidate in found {
                candidate.origin = origin;
                let key = merge_key(&candidate);
                match origin {
                    Origin::Structured => {
                        structured_keys.insert(key);
                    }
                    Origin::Pattern => {
                        if structured_keys.contains(&key) {
                            continue;
                        }
                    }
                }
                merged.push(candidate);
            }
        }

        if merged.is_empty() {
            return Err(HarvestError::ExtractionMiss);
        }
        Ok(merged)
    }
}

fn merge_key(candidate: &RawReview) -> (String, String) {
    let content = candidate
        .content
        .as_deref()
        .map(sanitize_text)
        .unwrap_or_default();
    (
        normalized_title(&candidate.title),
        content.chars().take(50).collect(),
    )
}

// ── Shared helpers ────────────────────────────────────────────────────────────

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href=["']((?:https?://[^"'/]+)?(?:/[^"']*)?/(?:film|serie|jeu|livre)/[^"']+)["']"#)
        .unwrap()
});

static RATING_TESTID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)data-testid="Rating"[^>]*>\s*(?:<[^>]*>\s*)*(\d{1,2})\b"#).unwrap());

static RATING_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*(?:⭐|★|/\s*10\b|note\b)").unwrap());

static DATETIME_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)datetime=["']([^"']+)["']"#).unwrap());

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,3}").unwrap());

const TITLE_BOILERPLATE: &[&str] = &[
    "sens critique",
    "senscritique",
    "critique de",
    "connexion",
    "inscription",
    "se connecter",
    "newsletter",
    "lire la critique",
];

const CONTENT_BOILERPLATE: &[&str] = &[
    "nous utilisons des cookies",
    "activez javascript",
    "enable javascript",
    "se connecter",
    "créer un compte",
];

/// Largest char boundary ≤ `idx`.
pub(crate) fn floor_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// `s[start..end]`, with both ends clamped to valid boundaries.
pub(crate) fn window(s: &str, start: usize, end: usize) -> &str {
    let start = floor_boundary(s, start);
    let end = floor_boundary(s, end).max(start);
    &s[start..end]
}

pub(crate) fn resolve_url(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|u| u.to_string())
}

pub(crate) fn find_link(base: &Url, markup: &str) -> Option<String> {
    LINK.captures(markup)
        .and_then(|c| resolve_url(base, &c[1]))
}

/// Rating from markup: the `Rating` test id first, then "8 ★" style text.
pub(crate) fn find_rating(markup: &str) -> Option<u8> {
    RATING_TESTID
        .captures(markup)
        .or_else(|| RATING_TEXT.captures(markup))
        .and_then(|c| c[1].parse::<u8>().ok())
        .filter(|r| *r <= 10)
}

/// First number in free text (e.g. an aria-label "Note : 7"), if on the 0-10 scale.
pub(crate) fn first_rating_number(text: &str) -> Option<u8> {
    FIRST_NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .filter(|r| *r <= 10)
}

pub(crate) fn find_iso(markup: &str) -> Option<String> {
    DATETIME_ATTR
        .captures_iter(markup)
        .map(|c| c[1].trim().to_string())
        .find(|v| crate::scraper::dates::is_iso_like(v))
}

pub(crate) fn is_boilerplate_title(text: &str) -> bool {
    let lower = text.to_lowercase();
    TITLE_BOILERPLATE.iter().any(|b| lower.contains(b))
}

pub(crate) fn is_boilerplate_content(text: &str) -> bool {
    let lower = text.to_lowercase();
    CONTENT_BOILERPLATE.iter().any(|b| lower.contains(b))
}

/// Title/content gate shared by the pattern strategies.
pub(crate) fn validate_candidate(title: &str, content: &str) -> bool {
    let title = sanitize_text(title);
    let content = sanitize_text(content);
    title.chars().count() > 2
        && content.chars().count() >= patterns::MIN_PATTERN_CONTENT
        && !is_boilerplate_title(&title)
        && !is_boilerplate_content(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        origin: Origin,
        fallback: bool,
        out: Vec<RawReview>,
    }

    impl ExtractionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn origin(&self) -> Origin {
            self.origin
        }
        fn is_fallback(&self) -> bool {
            self.fallback
        }
        fn attempt(&self, _markup: &str) -> Vec<RawReview> {
            self.out.clone()
        }
    }

    fn candidate(title: &str, content: &str, origin: Origin) -> RawReview {
        RawReview {
            content: Some(content.to_string()),
            ..RawReview::new(title, origin)
        }
    }

    #[test]
    fn test_pattern_duplicate_of_structured_is_dropped() {
        let body = "Un film qui prend son temps et c'est tant mieux pour nous tous";
        let chain = StrategyChain::new(vec![
            Box::new(Fixed {
                name: "s",
                origin: Origin::Structured,
                fallback: false,
                out: vec![candidate("Dune", body, Origin::Structured)],
            }),
            Box::new(Fixed {
                name: "p",
                origin: Origin::Pattern,
                fallback: false,
                out: vec![
                    candidate("Dune", &format!("<p>{}</p>", body), Origin::Pattern),
                    candidate("Dune", "Un tout autre texte pour le même titre", Origin::Pattern),
                    candidate("Heat", "Un polar d'une densité rare", Origin::Pattern),
                ],
            }),
        ]);

        let merged = chain.extract("").unwrap();
        let titles: Vec<_> = merged.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Dune", "Dune", "Heat"]);
        assert_eq!(merged[0].origin, Origin::Structured);
    }

    #[test]
    fn test_candidates_take_their_strategy_origin() {
        let body = "Un film qui prend son temps et c'est tant mieux pour nous tous";
        let chain = StrategyChain::new(vec![
            Box::new(Fixed {
                name: "dom",
                origin: Origin::Structured,
                fallback: false,
                out: vec![candidate("Dune", body, Origin::Pattern)],
            }),
            Box::new(Fixed {
                name: "regex",
                origin: Origin::Pattern,
                fallback: false,
                out: vec![candidate("Dune", body, Origin::Pattern)],
            }),
        ]);

        let merged = chain.extract("").unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].origin, Origin::Structured);
    }

    #[test]
    fn test_fallback_skipped_once_something_found() {
        let chain = StrategyChain::new(vec![
            Box::new(Fixed {
                name: "first",
                origin: Origin::Pattern,
                fallback: false,
                out: vec![candidate("Heat", "Un polar d'une densité rare", Origin::Pattern)],
            }),
            Box::new(Fixed {
                name: "fallback",
                origin: Origin::Pattern,
                fallback: true,
                out: vec![candidate("Menu", "Un bloc de navigation quelconque", Origin::Pattern)],
            }),
        ]);
        let merged = chain.extract("").unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_empty_chain_output_is_extraction_miss() {
        let chain = StrategyChain::senscritique("KiMi_", &Url::parse("https://www.senscritique.com").unwrap());
        let err = chain.extract("<html><body><p>rien</p></body></html>").unwrap_err();
        assert!(matches!(err, HarvestError::ExtractionMiss));
    }

    #[test]
    fn test_window_respects_char_boundaries() {
        let s = "éééé";
        assert_eq!(window(s, 1, 5), "éé");
        assert_eq!(window(s, 0, 100), s);
        assert_eq!(window(s, 6, 2), "");
    }

    #[test]
    fn test_rating_and_link_helpers() {
        let base = Url::parse("https://www.senscritique.com").unwrap();
        assert_eq!(find_rating(r#"<div data-testid="Rating"><span>8</span></div>"#), Some(8));
        assert_eq!(find_rating("Ma note : 7 ★"), Some(7));
        assert_eq!(find_rating("99 ★"), None);
        assert_eq!(
            find_link(&base, r#"<a href="/film/heat/371012">Heat</a>"#).as_deref(),
            Some("https://www.senscritique.com/film/heat/371012")
        );
        assert_eq!(first_rating_number("Note : 6 sur 10"), Some(6));
    }
}
