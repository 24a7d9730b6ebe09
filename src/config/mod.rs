use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Plain HTTP fetches (base profile, favorites)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// Headless browser + scroll loop tuning.
///
/// Every wait the acquisition performs is bounded by one of these values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Best-effort wait for the first review container to show up.
    #[serde(default = "default_marker_timeout_ms")]
    pub marker_timeout_ms: u64,

    /// Upper bound for a single in-page evaluation (scroll, sample, click).
    #[serde(default = "default_evaluate_timeout_ms")]
    pub evaluate_timeout_ms: u64,

    /// Hard ceiling for a whole acquisition, launch to capture.
    #[serde(default = "default_total_timeout_secs")]
    pub total_timeout_secs: u64,

    /// Page and browser shutdown. Past it the browser process is killed.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: u32,

    #[serde(default = "default_scroll_steps")]
    pub scroll_steps_per_iteration: u32,

    #[serde(default = "default_step_pause_ms")]
    pub step_pause_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Iterations with an unchanged item count before the loop is done.
    #[serde(default = "default_stable_rounds")]
    pub stable_rounds: u32,

    /// Iterations with unchanged height *and* item count before bailing early.
    #[serde(default = "default_idle_rounds")]
    pub idle_rounds: u32,

    #[serde(default = "default_max_scroll_attempts")]
    pub max_scroll_attempts: u32,

    /// CSS selector counted as "visible items" and awaited as the first marker.
    #[serde(default = "default_item_selector")]
    pub item_selector: String,

    /// Button labels treated as a "load more" control (case-insensitive).
    #[serde(default = "default_load_more_labels")]
    pub load_more_labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.senscritique.com".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_accept_language() -> String {
    "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7".to_string()
}
fn default_true() -> bool {
    true
}
fn default_navigation_timeout_secs() -> u64 {
    30
}
fn default_marker_timeout_ms() -> u64 {
    10_000
}
fn default_evaluate_timeout_ms() -> u64 {
    5_000
}
fn default_total_timeout_secs() -> u64 {
    120
}
fn default_close_timeout_ms() -> u64 {
    5_000
}
fn default_scroll_step_px() -> u32 {
    600
}
fn default_scroll_steps() -> u32 {
    4
}
fn default_step_pause_ms() -> u64 {
    150
}
fn default_settle_ms() -> u64 {
    1_000
}
fn default_stable_rounds() -> u32 {
    3
}
fn default_idle_rounds() -> u32 {
    2
}
fn default_max_scroll_attempts() -> u32 {
    50
}
fn default_item_selector() -> String {
    r#"[data-testid="review-overview"], article, [class*="ReviewCard"]"#.to_string()
}
fn default_load_more_labels() -> Vec<String> {
    ["voir plus", "charger plus", "afficher plus", "load more", "show more"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_cache_ttl_ms() -> u64 {
    600_000
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            marker_timeout_ms: default_marker_timeout_ms(),
            evaluate_timeout_ms: default_evaluate_timeout_ms(),
            total_timeout_secs: default_total_timeout_secs(),
            close_timeout_ms: default_close_timeout_ms(),
            scroll_step_px: default_scroll_step_px(),
            scroll_steps_per_iteration: default_scroll_steps(),
            step_pause_ms: default_step_pause_ms(),
            settle_ms: default_settle_ms(),
            stable_rounds: default_stable_rounds(),
            idle_rounds: default_idle_rounds(),
            max_scroll_attempts: default_max_scroll_attempts(),
            item_selector: default_item_selector(),
            load_more_labels: default_load_more_labels(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SC").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_scroll_contract() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.browser.stable_rounds, 3);
        assert_eq!(cfg.browser.idle_rounds, 2);
        assert_eq!(cfg.browser.max_scroll_attempts, 50);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.cache.ttl_ms, 600_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[browser]\nmax_scroll_attempts = 7\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.browser.max_scroll_attempts, 7);
        assert_eq!(cfg.browser.stable_rounds, 3);
        assert_eq!(cfg.scraper.base_url, "https://www.senscritique.com");
    }
}
