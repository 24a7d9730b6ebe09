use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ── Review ────────────────────────────────────────────────────────────────────

/// One sanitized review, as handed to consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub title: String,
    pub content: String,
    pub date_display: Option<String>,
    pub date_instant: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
    pub rating: Option<u8>,
    /// `content` is the fixed placeholder, not text from the page.
    #[serde(default)]
    pub placeholder: bool,
}

impl ReviewRecord {
    /// Key used for deduplication: trimmed, whitespace-collapsed, case kept.
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.title)
    }
}

pub fn dedup_key(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Favorites / stats ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
    pub title: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileStats {
    pub films: u32,
    pub series: u32,
    pub games: u32,
    pub books: u32,
    pub total: u32,
}

// ── Profile ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    pub location: String,
    pub gender: String,
    pub age: Option<u8>,
    pub stats: ProfileStats,
    pub favorites: Vec<FavoriteItem>,
    pub reviews: Vec<ReviewRecord>,
    pub profile_url: String,
    pub avatar_url: String,
}

/// What the base-profile sub-fetch yields before reviews/favorites are merged in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseProfile {
    pub username: String,
    pub location: String,
    pub gender: String,
    pub age: Option<u8>,
    pub stats: ProfileStats,
    pub profile_url: String,
    pub avatar_url: String,
    /// Media images found on the profile page; used when the favorites scan is empty.
    pub gallery: Vec<FavoriteItem>,
}

// ── Options / cache ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOptions {
    pub load_reviews: bool,
    pub load_favorites: bool,
    pub use_cache: bool,
    pub cache_time_ms: u64,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            load_reviews: true,
            load_favorites: true,
            use_cache: true,
            cache_time_ms: 600_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub username: String,
    pub load_reviews: bool,
    pub load_favorites: bool,
}

impl CacheKey {
    pub fn new(username: &str, options: &ProfileOptions) -> Self {
        Self {
            username: username.to_string(),
            load_reviews: options.load_reviews,
            load_favorites: options.load_favorites,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Arc<Profile>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age >= ttl,
            Err(_) => false,
        }
    }
}

// ── Reporting ─────────────────────────────────────────────────────────────────

/// Size/duration metadata for an external monitoring sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HarvestReport {
    pub duration_ms: u64,
    pub review_count: usize,
    pub favorite_count: usize,
    pub from_cache: bool,
    /// Reviews were requested but none came back; usually a markup change.
    pub zero_review_alert: bool,
}

#[derive(Debug, Clone)]
pub struct Assembled {
    pub profile: Arc<Profile>,
    pub report: HarvestReport,
}

// ── Raw extraction output ─────────────────────────────────────────────────────

/// Which family of strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Structured,
    Pattern,
}

/// Unvalidated tuple straight out of an extraction strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReview {
    pub title: String,
    /// `None` when the container had a title but no usable body.
    pub content: Option<String>,
    pub date_text: Option<String>,
    pub iso_date: Option<String>,
    pub rating: Option<u8>,
    pub url: Option<String>,
    pub origin: Origin,
}

impl RawReview {
    pub fn new(title: impl Into<String>, origin: Origin) -> Self {
        Self {
            title: title.into(),
            content: None,
            date_text: None,
            iso_date: None,
            rating: None,
            url: None,
            origin,
        }
    }
}
