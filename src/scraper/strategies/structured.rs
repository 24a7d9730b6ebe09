use super::{ExtractionStrategy, find_iso, first_rating_number, resolve_url};
use crate::models::{Origin, RawReview};
use crate::scraper::dates::{find_date_phrase, is_iso_like};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

// Cascades: most specific first, generic element last.

const CONTAINERS: &[&str] = &[
    r#"[data-testid="review-overview"]"#,
    r#"article[data-testid*="review"]"#,
    r#"[data-testid*="review-card"]"#,
    ".elco-collection-item",
    ".ProductListItem",
    r#"[class*="ReviewCard"]"#,
    r#"[class*="review"], [class*="Review"]"#,
    r#"[class*="critique"], [class*="Critique"]"#,
    "article",
];

const TITLES: &[&str] = &[
    r#"a[data-testid="productReviewTitle"]"#,
    r#"h2[data-testid="reviewTitle"]"#,
    r#"[data-testid="reviewTitle"]"#,
    r#"a[class*="elco-title"]"#,
    "h2",
    "h3",
    "h4",
    ".title",
    r#"[class*="title"]"#,
];

const CONTENTS: &[&str] = &[
    r#"p[data-testid="linkify"]"#,
    r#"[data-testid="linkify"]"#,
    r#"[data-testid*="content"]"#,
    r#"[class*="elco-description"]"#,
    ".content",
    r#"[class*="content"]"#,
    "p",
    r#"[class*="text"]"#,
];

const LINKS: &[&str] = &[
    r#"a[data-testid="productReviewTitle"][href]"#,
    r#"a[href*="/film/"]"#,
    r#"a[href*="/serie/"]"#,
    r#"a[href*="/jeu"]"#,
    r#"a[href*="/livre/"]"#,
    r#"a[class*="elco-title"][href]"#,
];

const RATINGS: &[&str] = &[
    r#"[data-testid="Rating"]"#,
    r#"[class*="elco-rating"]"#,
    r#"[class*="rating"]"#,
    r#"[class*="Rating"]"#,
    r#"[class*="note"]"#,
    r#"[aria-label*="note"]"#,
];

fn compile(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

static CONTAINER_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(CONTAINERS));
static TITLE_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(TITLES));
static CONTENT_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(CONTENTS));
static LINK_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(LINKS));
static RATING_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(RATINGS));
static DATETIME_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["time[datetime]", "[datetime]"]));
static PARAGRAPH_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["p"]));
static INLINE_SEL: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["span", "time", "small"]));

/// Text of an element with text nodes joined by spaces, whitespace collapsed.
fn text_of(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Short text that is basically just a date ("il y a 3 jours").
fn is_date_only(text: &str) -> bool {
    text.chars().count() < 40 && find_date_phrase(text).is_some()
}

/// DOM-based pass with selector cascades per field.
pub struct StructuredStrategy {
    base_url: Url,
}

impl StructuredStrategy {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// First cascade level that yields at least one titled container wins.
    fn candidates(&self, doc: &Html) -> Vec<RawReview> {
        for (level, sel) in CONTAINER_SEL.iter().enumerate() {
            let containers = resolve_nesting(doc.select(sel).collect());
            if containers.is_empty() {
                continue;
            }

            let found: Vec<RawReview> = containers
                .into_iter()
                .filter_map(|c| self.from_container(c))
                .collect();

            if !found.is_empty() {
                debug!(
                    "Structured: selector #{} matched {} reviews",
                    level,
                    found.len()
                );
                return found;
            }
        }
        Vec::new()
    }

    fn from_container(&self, container: ElementRef) -> Option<RawReview> {
        let title = first_match(container, &TITLE_SEL, |t| {
            t.chars().count() > 2 && !is_date_only(t)
        })?;

        let content = first_match(container, &CONTENT_SEL, |t| {
            t.chars().count() >= 10 && !is_date_only(t) && *t != title
        });

        let (date_text, iso_date) = extract_date(container);

        Some(RawReview {
            title,
            content,
            date_text,
            iso_date,
            rating: extract_rating(container),
            url: self.extract_link(container),
            origin: Origin::Structured,
        })
    }

    fn extract_link(&self, container: ElementRef) -> Option<String> {
        LINK_SEL
            .iter()
            .flat_map(|sel| container.select(sel))
            .find_map(|a| a.value().attr("href"))
            .and_then(|href| resolve_url(&self.base_url, href))
    }
}

impl ExtractionStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn origin(&self) -> Origin {
        Origin::Structured
    }

    fn attempt(&self, markup: &str) -> Vec<RawReview> {
        if markup.trim().is_empty() {
            return Vec::new();
        }
        let doc = Html::parse_document(markup);
        self.candidates(&doc)
    }
}

/// Resolve nesting among the matches of one selector level.
///
/// A match holding two or more titled matches is a list wrapper and gives way
/// to its items. Any other nesting collapses to the outermost match so one
/// review isn't read twice.
fn resolve_nesting(elements: Vec<ElementRef>) -> Vec<ElementRef> {
    let ids: HashSet<_> = elements.iter().map(|e| e.id()).collect();
    let titled_inner = |outer: &ElementRef| {
        outer
            .descendants()
            .skip(1)
            .filter(|n| ids.contains(&n.id()))
            .filter_map(ElementRef::wrap)
            .filter(|e| has_title_element(*e))
            .count()
    };

    let items: Vec<ElementRef> = elements
        .iter()
        .copied()
        .filter(|e| titled_inner(e) < 2)
        .collect();
    let item_ids: HashSet<_> = items.iter().map(|e| e.id()).collect();
    items
        .into_iter()
        .filter(|e| !e.ancestors().any(|a| item_ids.contains(&a.id())))
        .collect()
}

fn has_title_element(el: ElementRef) -> bool {
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|d| TITLE_SEL.iter().any(|sel| sel.matches(&d)))
}

/// Walk a field cascade, returning the first element text that passes `accept`.
fn first_match<F>(container: ElementRef, cascade: &[Selector], accept: F) -> Option<String>
where
    F: Fn(&String) -> bool,
{
    cascade
        .iter()
        .flat_map(|sel| container.select(sel))
        .map(text_of)
        .find(|t| accept(t))
}

fn extract_rating(container: ElementRef) -> Option<u8> {
    RATING_SEL
        .iter()
        .flat_map(|sel| container.select(sel))
        .find_map(|el| {
            first_rating_number(&text_of(el))
                .or_else(|| el.value().attr("aria-label").and_then(first_rating_number))
        })
}

/// Date lookup, in order: `datetime` attribute, `<p>` text, inline text, raw markup.
///
/// Returns `(display_text, iso_value)`.
fn extract_date(container: ElementRef) -> (Option<String>, Option<String>) {
    let iso = DATETIME_SEL
        .iter()
        .flat_map(|sel| container.select(sel))
        .filter_map(|el| el.value().attr("datetime"))
        .map(str::trim)
        .find(|v| is_iso_like(v))
        .map(str::to_string);

    let phrase_in = |cascade: &[Selector]| {
        cascade
            .iter()
            .flat_map(|sel| container.select(sel))
            .find_map(|el| find_date_phrase(&text_of(el)))
    };

    let text = phrase_in(PARAGRAPH_SEL.as_slice()).or_else(|| phrase_in(INLINE_SEL.as_slice()));

    if iso.is_some() || text.is_some() {
        return (text, iso);
    }

    let raw = container.html();
    (find_date_phrase(&raw), find_iso(&raw))
}
