use crate::errors::HarvestError;
use crate::models::ReviewRecord;
use crate::scraper::browser::MarkupSource;
use crate::scraper::cleaner::clean_reviews;
use crate::scraper::strategies::StrategyChain;
use crate::utils::Clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Extraction + cleaning over markup that has already been captured.
///
/// Never fails: no match and unusable candidates both come out as fewer
/// (possibly zero) reviews.
pub fn extract_reviews(
    markup: &str,
    username: &str,
    base_url: &Url,
    now: DateTime<Utc>,
) -> Vec<ReviewRecord> {
    let chain = StrategyChain::senscritique(username, base_url);

    let raws = match chain.extract(markup) {
        Ok(raws) => raws,
        Err(HarvestError::ExtractionMiss) => {
            debug!("No strategy matched ({} bytes of markup)", markup.len());
            return Vec::new();
        }
        Err(e) => {
            warn!("Extraction failed: {}", e);
            return Vec::new();
        }
    };

    clean_reviews(&raws, now)
}

/// Review page → sanitized, deduplicated, newest-first records.
pub struct ReviewHarvester {
    source: Arc<dyn MarkupSource>,
    base_url: Url,
    clock: Arc<dyn Clock>,
}

impl ReviewHarvester {
    pub fn new(source: Arc<dyn MarkupSource>, base_url: Url, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            base_url,
            clock,
        }
    }

    /// Acquisition failures degrade to empty markup, hence zero reviews.
    pub async fn harvest(&self, username: &str, url: &str) -> Vec<ReviewRecord> {
        let markup = self.source.acquire_or_empty(url).await;

        // Resolved against the time the page was captured
        let reviews = extract_reviews(&markup, username, &self.base_url, self.clock.now());
        info!("{}: {} reviews harvested", username, reviews.len());
        reviews
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Fixed(Result<String>);

    #[async_trait]
    impl MarkupSource for Fixed {
        async fn acquire(&self, url: &str) -> Result<String> {
            match &self.0 {
                Ok(html) => Ok(html.clone()),
                Err(e) => Err(HarvestError::acquisition(url, e)),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap()
    }

    fn harvester(source: Fixed) -> ReviewHarvester {
        ReviewHarvester::new(
            Arc::new(source),
            Url::parse("https://www.senscritique.com").unwrap(),
            Arc::new(ManualClock::new(now())),
        )
    }

    const PAGE: &str = r#"<html><body>
      <article data-testid="review-overview">
        <a data-testid="productReviewTitle" href="/film/heat/371012">Heat</a>
        <p data-testid="linkify">Un polar d'une densité rare, porté par un duo d'acteurs immense.</p>
        <p>il y a 3 jours</p>
      </article>
      <article data-testid="review-overview">
        <a data-testid="productReviewTitle" href="/film/ran/4567">Ran</a>
        <p data-testid="linkify">Fresque crépusculaire, chaque plan est un tableau de maître.</p>
        <p>il y a 1 jour</p>
      </article>
      <article data-testid="review-overview">
        <a data-testid="productReviewTitle" href="/film/heat/371012">Heat</a>
        <p data-testid="linkify">Doublon rendu deux fois par le défilement infini.</p>
      </article>
      <h2>Critique de Tenet par KiMi_</h2>
      <p>Un palindrome bavard mais d'une ambition formelle indéniable.</p>
      <span>il y a 2 semaines</span>
    </body></html>"#;

    #[tokio::test]
    async fn test_harvest_merges_dedups_and_sorts() {
        let h = harvester(Fixed(Ok(PAGE.to_string())));
        let reviews = h.harvest("KiMi_", "https://www.senscritique.com/KiMi_/critiques").await;

        let titles: Vec<_> = reviews.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Ran", "Heat", "Tenet"]);
        assert_eq!(reviews[1].date_instant, Some(now() - chrono::Duration::days(3)));
        assert!(reviews[1].content.starts_with("Un polar"));
        assert_eq!(
            reviews[0].source_url.as_deref(),
            Some("https://www.senscritique.com/film/ran/4567")
        );
    }

    #[tokio::test]
    async fn test_acquisition_failure_yields_zero_reviews() {
        let h = harvester(Fixed(Err(HarvestError::ExtractionMiss)));
        let reviews = h.harvest("KiMi_", "https://www.senscritique.com/KiMi_/critiques").await;
        assert!(reviews.is_empty());
    }

    #[test]
    fn test_every_card_in_a_list_wrapper_is_kept() {
        let base = Url::parse("https://www.senscritique.com").unwrap();
        let html = r#"<html><body><section class="reviews-list">
          <div class="review-item"><h3>Heat</h3>
            <p>Un polar d'une densité rare, porté par un duo d'acteurs immense.</p><span>il y a 5 jours</span></div>
          <div class="review-item"><h3>Alien</h3>
            <p>Un huis clos spatial d'une efficacité redoutable et glaçante.</p><span>il y a 2 jours</span></div>
          <div class="review-item"><h3>Ran</h3>
            <p>Fresque crépusculaire, chaque plan est un tableau de maître.</p><span>il y a 9 jours</span></div>
        </section></body></html>"#;

        let reviews = extract_reviews(html, "KiMi_", &base, now());
        let titles: Vec<_> = reviews.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Alien", "Heat", "Ran"]);
    }

    #[test]
    fn test_zero_containers_is_empty_not_error() {
        let base = Url::parse("https://www.senscritique.com").unwrap();
        let html = "<html><body><nav>Films Séries Jeux</nav><footer>© SensCritique</footer></body></html>";
        assert!(extract_reviews(html, "KiMi_", &base, now()).is_empty());
        assert!(extract_reviews("", "KiMi_", &base, now()).is_empty());
    }
}
