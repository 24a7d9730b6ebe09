use super::{ExtractionStrategy, find_iso, find_link, find_rating, validate_candidate, window};
use crate::models::{Origin, RawReview};
use crate::scraper::dates::find_date_phrase;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

/// Shortest body a pattern match may carry.
pub(crate) const MIN_PATTERN_CONTENT: usize = 20;

const HEADER_CONTEXT: usize = 3_000;
const BLOCK_CONTEXT: usize = 4_000;

static PARAGRAPH_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p[^>]*>([^<]{30,500}?)</p>").unwrap());

static DIV_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<div[^>]*>([^<]{30,500}?)</div>").unwrap());

static TESTID_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-testid=["'](?:review-overview|review-card|reviewCard)["']"#).unwrap()
});

static BLOCK_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(h[2-4]|a)\b[^>]*>\s*([^<]{3,150}?)\s*</(?:h[2-4]|a)>").unwrap()
});

static BLOCK_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p[^>]*>([^<]{20,1000})</p>").unwrap());

static HEADING_BODY_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:<h[23][^>]*>|<a[^>]*>)([^<]{10,100})(?:</h[23]>|</a>)(?s:.){0,500}?(?:<p[^>]*>|<div[^>]*>)([^<]{20,300})(?:</p>|</div>)(?s:.){0,200}?(?:il y a \d+ (?:jours?|semaines?|mois|ans?)|le \d{1,2}\s+\w+\.?\s+\d{4}|datetime=["']([^"']+)["'])"#,
    )
    .unwrap()
});

static HEADING_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<h[23][^>]*>([^<]{10,100})</h[23]>(?s:.){0,1000}?<p[^>]*>([^<]{30,300})</p>")
        .unwrap()
});

/// Date text and ISO value found in a slice of markup.
fn date_in(context: &str) -> (Option<String>, Option<String>) {
    (find_date_phrase(context), find_iso(context))
}

fn around(markup: &str, start: usize, end: usize, pad: usize) -> &str {
    window(markup, start.saturating_sub(pad), end.saturating_add(pad))
}

fn pattern_review(title: &str, content: &str) -> RawReview {
    RawReview {
        content: Some(content.trim().to_string()),
        ..RawReview::new(title.trim(), Origin::Pattern)
    }
}

// ── "Critique de TITLE par USER" ─────────────────────────────────────────────

/// Review pages head every entry with "Critique de TITLE par USER"
/// ("Review of TITLE by USER" on the English locale).
///
/// The body, date, link and rating are looked up in the markup that follows
/// the header, up to the next header.
pub struct ReviewHeaderPattern {
    base_url: Url,
    header: Regex,
    body_before_marker: Regex,
}

impl ReviewHeaderPattern {
    /// An empty `username` accepts any author.
    pub fn new(username: &str, base_url: Url) -> Result<Self, regex::Error> {
        let user = match username.trim() {
            "" => r"[^\s<]+".to_string(),
            name => regex::escape(name),
        };
        let header = Regex::new(&format!(
            r"(?i)(?:<h[23][^>]*>|##\s*)\s*(?:Critique de|Review of) ([^<\n]+?)\s+(?:par|by)\s+{}(?:[\s<]|$)",
            user
        ))?;
        let body_before_marker = Regex::new(&format!(
            r"(?i)>\s*([^<]{{30,500}}?)\s*(?:Lire la critique|Par\s+{}(?:[\s<]|$)|</p>|</div>)",
            user
        ))?;
        Ok(Self {
            base_url,
            header,
            body_before_marker,
        })
    }

    fn body(&self, context: &str) -> Option<String> {
        [&self.body_before_marker, &*PARAGRAPH_BODY, &*DIV_BODY]
            .into_iter()
            .filter_map(|re| re.captures(context))
            .map(|c| c[1].trim().to_string())
            .find(|b| b.chars().count() > MIN_PATTERN_CONTENT)
    }
}

impl ExtractionStrategy for ReviewHeaderPattern {
    fn name(&self) -> &'static str {
        "review-header"
    }

    fn origin(&self) -> Origin {
        Origin::Pattern
    }

    fn attempt(&self, markup: &str) -> Vec<RawReview> {
        let headers: Vec<Captures> = self.header.captures_iter(markup).collect();
        let mut out = Vec::new();

        for (i, caps) in headers.iter().enumerate() {
            let Some(whole) = caps.get(0) else { continue };
            let title = caps[1].trim();

            let next_header = headers
                .get(i + 1)
                .and_then(|c| c.get(0))
                .map_or(markup.len(), |m| m.start());
            let end = next_header.min(whole.end() + HEADER_CONTEXT);
            let context = window(markup, whole.end(), end);

            let Some(content) = self.body(context) else {
                continue;
            };
            if !validate_candidate(title, &content) {
                continue;
            }

            let (date_text, iso_date) = date_in(context);
            let url = find_link(&self.base_url, context).or_else(|| {
                find_link(&self.base_url, around(markup, whole.start(), whole.start(), 500))
            });
            let rating = find_rating(context)
                .or_else(|| find_rating(around(markup, whole.start(), whole.start(), 200)));

            out.push(RawReview {
                date_text,
                iso_date,
                url,
                rating,
                ..pattern_review(title, &content)
            });
        }
        out
    }
}

// ── data-testid blocks ────────────────────────────────────────────────────────

/// Raw-markup reading of blocks tagged with a review test id.
pub struct TestIdBlockPattern {
    base_url: Url,
}

impl TestIdBlockPattern {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl ExtractionStrategy for TestIdBlockPattern {
    fn name(&self) -> &'static str {
        "testid-block"
    }

    fn origin(&self) -> Origin {
        Origin::Pattern
    }

    fn attempt(&self, markup: &str) -> Vec<RawReview> {
        let starts: Vec<usize> = TESTID_BLOCK.find_iter(markup).map(|m| m.start()).collect();
        let mut out = Vec::new();

        for (i, &start) in starts.iter().enumerate() {
            let next = starts.get(i + 1).copied().unwrap_or(markup.len());
            let block = window(markup, start, next.min(start + BLOCK_CONTEXT));

            let title = BLOCK_TITLE
                .captures_iter(block)
                .map(|c| c[2].trim().to_string())
                .find(|t| t.chars().count() > 2 && find_date_phrase(t).is_none());
            let content = BLOCK_BODY
                .captures_iter(block)
                .map(|c| c[1].trim().to_string())
                .find(|b| !(b.chars().count() < 40 && find_date_phrase(b).is_some()));

            let (Some(title), Some(content)) = (title, content) else {
                continue;
            };
            if !validate_candidate(&title, &content) {
                continue;
            }

            let (date_text, iso_date) = date_in(block);
            out.push(RawReview {
                date_text,
                iso_date,
                url: find_link(&self.base_url, block),
                rating: find_rating(block),
                ..pattern_review(&title, &content)
            });
        }
        out
    }
}

// ── Generic fallbacks ─────────────────────────────────────────────────────────

/// Heading, then a paragraph or div, then a date shortly after.
pub struct HeadingParagraphDatePattern {
    base_url: Url,
}

impl HeadingParagraphDatePattern {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl ExtractionStrategy for HeadingParagraphDatePattern {
    fn name(&self) -> &'static str {
        "heading-date"
    }

    fn origin(&self) -> Origin {
        Origin::Pattern
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn attempt(&self, markup: &str) -> Vec<RawReview> {
        HEADING_BODY_DATE
            .captures_iter(markup)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let (title, content) = (caps[1].trim(), caps[2].trim());
                if !validate_candidate(title, content) {
                    return None;
                }
                let context = around(markup, whole.start(), whole.end(), 500);
                let (date_text, iso_date) = date_in(whole.as_str());
                Some(RawReview {
                    date_text,
                    iso_date: iso_date.or_else(|| caps.get(3).map(|m| m.as_str().trim().to_string())),
                    url: find_link(&self.base_url, context),
                    rating: find_rating(whole.as_str()),
                    ..pattern_review(title, content)
                })
            })
            .collect()
    }
}

/// Last resort: a heading followed by a paragraph, no date required.
pub struct HeadingParagraphPattern {
    base_url: Url,
}

impl HeadingParagraphPattern {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl ExtractionStrategy for HeadingParagraphPattern {
    fn name(&self) -> &'static str {
        "heading-paragraph"
    }

    fn origin(&self) -> Origin {
        Origin::Pattern
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn attempt(&self, markup: &str) -> Vec<RawReview> {
        HEADING_BODY
            .captures_iter(markup)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let (title, content) = (caps[1].trim(), caps[2].trim());
                if !validate_candidate(title, content) {
                    return None;
                }
                let context = around(markup, whole.start(), whole.end(), 200);
                let (date_text, iso_date) = date_in(context);
                Some(RawReview {
                    date_text,
                    iso_date,
                    url: find_link(&self.base_url, context),
                    rating: None,
                    ..pattern_review(title, content)
                })
            })
            .collect()
    }
}
