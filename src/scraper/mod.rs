pub mod browser;
pub mod cleaner;
pub mod dates;
pub mod harvest;
pub mod http_client;
pub mod parsers;
pub mod scroll;
pub mod strategies;

use crate::config::AppConfig;
use crate::errors::{HarvestError, Result};
use crate::models::{BaseProfile, FavoriteItem, ReviewRecord};
use crate::utils::Clock;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use self::browser::PageAcquirer;
use self::harvest::ReviewHarvester;
use self::http_client::HttpClient;
use self::parsers::{parse_base_profile, parse_favorites};

// ── Source trait ──────────────────────────────────────────────────────────────

/// The three independent sub-fetches a profile is assembled from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_base_profile(&self, username: &str) -> Result<BaseProfile>;
    async fn fetch_reviews(&self, username: &str) -> Result<Vec<ReviewRecord>>;
    async fn fetch_favorites(&self, username: &str) -> Result<Vec<FavoriteItem>>;
}

// ── URLs ──────────────────────────────────────────────────────────────────────

fn user_url(base: &Url, username: &str, tail: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| HarvestError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .push(username)
        .extend(tail);
    Ok(url)
}

/// `https://www.senscritique.com/KiMi_`
pub fn profile_url(base: &Url, username: &str) -> Result<Url> {
    user_url(base, username, &[])
}

/// `.../KiMi_/critiques`, the infinite-scroll review list.
pub fn reviews_url(base: &Url, username: &str) -> Result<Url> {
    user_url(base, username, &["critiques"])
}

/// `.../KiMi_/collection?action=RECOMMEND`, the "coups de cœur".
pub fn favorites_url(base: &Url, username: &str) -> Result<Url> {
    let mut url = user_url(base, username, &["collection"])?;
    url.query_pairs_mut().append_pair("action", "RECOMMEND");
    Ok(url)
}

// ── SensCritique ──────────────────────────────────────────────────────────────

/// HTTP for the profile and collection pages, headless browser for reviews.
pub struct SensCritiqueScraper {
    client: HttpClient,
    harvester: ReviewHarvester,
    base_url: Url,
}

impl SensCritiqueScraper {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let base_url = Url::parse(&config.scraper.base_url)?;
        let acquirer = PageAcquirer::new(
            config.browser.clone(),
            &config.scraper.user_agent,
            Arc::clone(&clock),
        );
        Ok(Self {
            client: HttpClient::new(&config.scraper)?,
            harvester: ReviewHarvester::new(Arc::new(acquirer), base_url.clone(), clock),
            base_url,
        })
    }
}

#[async_trait]
impl ProfileSource for SensCritiqueScraper {
    async fn fetch_base_profile(&self, username: &str) -> Result<BaseProfile> {
        let url = profile_url(&self.base_url, username)?;
        info!("Fetching profile page {}", url);

        let html = self.client.get_text(url.as_str()).await?;
        parse_base_profile(&html, username, url.as_str())
    }

    async fn fetch_reviews(&self, username: &str) -> Result<Vec<ReviewRecord>> {
        let url = reviews_url(&self.base_url, username)?;
        Ok(self.harvester.harvest(username, url.as_str()).await)
    }

    async fn fetch_favorites(&self, username: &str) -> Result<Vec<FavoriteItem>> {
        let url = favorites_url(&self.base_url, username)?;
        debug!("Fetching favorites {}", url);

        let html = self.client.get_text(url.as_str()).await?;
        let favorites = parse_favorites(&html, username);
        info!("{}: {} favorites", username, favorites.len());
        Ok(favorites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_urls() {
        let base = Url::parse("https://www.senscritique.com").unwrap();
        assert_eq!(
            profile_url(&base, "KiMi_").unwrap().as_str(),
            "https://www.senscritique.com/KiMi_"
        );
        assert_eq!(
            reviews_url(&base, "KiMi_").unwrap().as_str(),
            "https://www.senscritique.com/KiMi_/critiques"
        );
        assert_eq!(
            favorites_url(&base, "KiMi_").unwrap().as_str(),
            "https://www.senscritique.com/KiMi_/collection?action=RECOMMEND"
        );
    }

    #[test]
    fn test_username_is_a_single_segment() {
        let base = Url::parse("https://www.senscritique.com/").unwrap();
        let url = profile_url(&base, "a/b c").unwrap();
        assert_eq!(url.as_str(), "https://www.senscritique.com/a%2Fb%20c");
    }
}
