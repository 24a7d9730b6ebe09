use crate::models::{RawReview, ReviewRecord, dedup_key};
use crate::scraper::dates;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Body used when a container had a title but nothing readable under it.
pub const PLACEHOLDER_CONTENT: &str = "Critique sans extrait disponible.";

pub const MAX_CONTENT_CHARS: usize = 200;
const ELLIPSIS: &str = "...";
const MIN_CONTENT_CHARS: usize = 10;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// `<div class="x` cut off at the end of a capture.
static UNCLOSED_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*$").unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:class|href|src|style|id|rel|target|role|data-[\w-]+|aria-[\w-]+)\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .unwrap()
});

/// `>` left at the front once a tag's attributes are gone.
static TAG_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*/?>").unwrap());

static ATTRIBUTE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:class|href|src|style|data-[\w-]+|aria-[\w-]+)\s*=").unwrap()
});

// ── Text cleaning ─────────────────────────────────────────────────────────────

/// Strip tags and attribute residue, decode entities, collapse whitespace.
pub fn sanitize_text(raw: &str) -> String {
    let s = TAG.replace_all(raw, " ");
    let s = UNCLOSED_TAG.replace(&s, "");
    let s = ATTRIBUTE.replace_all(&s, " ");
    let s = TAG_TAIL.replace(&s, "");
    let s = decode_entities(&s);
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    Html::parse_fragment(s).root_element().text().collect()
}

/// Anything that still looks like markup after cleaning.
pub fn has_markup_residue(s: &str) -> bool {
    s.contains('<') || s.contains('>') || ATTRIBUTE_TOKEN.is_match(s)
}

/// 200 characters plus an ellipsis at most.
pub fn truncate_content(s: &str) -> String {
    if s.chars().count() <= MAX_CONTENT_CHARS {
        return s.to_string();
    }
    let cut: String = s.chars().take(MAX_CONTENT_CHARS).collect();
    format!("{}{}", cut.trim_end(), ELLIPSIS)
}

// ── Raw → record ──────────────────────────────────────────────────────────────

/// Clean one candidate. `None` means it was rejected.
pub fn raw_to_record(raw: &RawReview, now: DateTime<Utc>) -> Option<ReviewRecord> {
    let title = sanitize_text(&raw.title);
    if title.is_empty() || has_markup_residue(&title) {
        debug!("Rejected candidate with unusable title {:?}", raw.title);
        return None;
    }

    let (content, placeholder) = match raw.content.as_deref() {
        Some(c) => (sanitize_text(c), false),
        None => (PLACEHOLDER_CONTENT.to_string(), true),
    };

    if !placeholder && content.chars().count() < MIN_CONTENT_CHARS {
        debug!("Rejected {:?}: content too short", title);
        return None;
    }

    let content = truncate_content(&content);
    if has_markup_residue(&content) {
        debug!("Rejected {:?}: markup survived cleaning", title);
        return None;
    }

    let date = dates::normalize(raw.date_text.as_deref(), raw.iso_date.as_deref(), now);

    Some(ReviewRecord {
        title,
        content,
        date_display: date.display,
        date_instant: date.instant,
        source_url: raw.url.clone(),
        rating: raw.rating.filter(|r| *r <= 10),
        placeholder,
    })
}

/// First occurrence of each title wins.
pub fn dedup_by_title(records: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}

/// Newest first; undated records keep their arrival order at the tail.
pub fn sort_by_instant(records: &mut [ReviewRecord]) {
    records.sort_by(|a, b| match (a.date_instant, b.date_instant) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Full sanitize → dedup → sort pass over merged strategy output.
pub fn clean_reviews(raws: &[RawReview], now: DateTime<Utc>) -> Vec<ReviewRecord> {
    let records: Vec<ReviewRecord> = raws.iter().filter_map(|r| raw_to_record(r, now)).collect();
    let rejected = raws.len() - records.len();

    let mut records = dedup_by_title(records);
    sort_by_instant(&mut records);

    debug!(
        "Cleaned {} candidates → {} reviews ({} rejected)",
        raws.len(),
        records.len(),
        rejected
    );
    records
}

pub fn normalized_title(title: &str) -> String {
    dedup_key(title)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
