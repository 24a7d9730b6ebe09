//! Profile assembler: ties scraper → cache together.
//!
//! ## `load()`
//!
//!   1. Cache lookup on `(username, load_reviews, load_favorites)`; a live hit
//!      returns immediately without touching the network.
//!   2. Otherwise the base profile, the review harvest and the favorites scan
//!      run concurrently and are awaited together.
//!   3. A failed base profile fails the call (`ProfileUnavailable`). Failed
//!      reviews or favorites only leave their list empty.
//!   4. The assembled profile replaces the cache entry.
//!
//! `invalidate()` drops every cached variant for a user.

use crate::cache::ProfileCache;
use crate::errors::{HarvestError, Result};
use crate::models::{
    Assembled, CacheEntry, CacheKey, FavoriteItem, HarvestReport, Profile, ProfileOptions,
    ReviewRecord,
};
use crate::scraper::ProfileSource;
use crate::utils::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Assembler {
    source: Arc<dyn ProfileSource>,
    cache: Arc<dyn ProfileCache>,
    clock: Arc<dyn Clock>,
}

impl Assembler {
    pub fn new(
        source: Arc<dyn ProfileSource>,
        cache: Arc<dyn ProfileCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            cache,
            clock,
        }
    }

    pub async fn load(&self, username: &str, options: ProfileOptions) -> Result<Assembled> {
        let started = self.clock.now();
        let key = CacheKey::new(username, &options);

        if options.use_cache {
            if let Some(entry) = self.cache.get(&key, started).await {
                info!("{}: served from cache", username);
                let report = HarvestReport {
                    duration_ms: self.elapsed_ms(started),
                    review_count: entry.payload.reviews.len(),
                    favorite_count: entry.payload.favorites.len(),
                    from_cache: true,
                    zero_review_alert: false,
                };
                return Ok(Assembled {
                    profile: entry.payload,
                    report,
                });
            }
        }

        info!(
            "{}: assembling (reviews={}, favorites={})",
            username, options.load_reviews, options.load_favorites
        );

        let reviews_fut = async {
            if options.load_reviews {
                self.source.fetch_reviews(username).await
            } else {
                Ok(Vec::new())
            }
        };
        let favorites_fut = async {
            if options.load_favorites {
                self.source.fetch_favorites(username).await
            } else {
                Ok(Vec::new())
            }
        };

        let (base, reviews, favorites) = tokio::join!(
            self.source.fetch_base_profile(username),
            reviews_fut,
            favorites_fut,
        );

        let base = base.map_err(|e| match e {
            HarvestError::ProfileUnavailable { .. } => e,
            other => HarvestError::unavailable(username, other),
        })?;

        let reviews: Vec<ReviewRecord> = reviews.unwrap_or_else(|e| {
            warn!("{}: reviews unavailable: {}", username, e);
            Vec::new()
        });

        let mut favorites: Vec<FavoriteItem> = favorites.unwrap_or_else(|e| {
            warn!("{}: favorites unavailable: {}", username, e);
            Vec::new()
        });
        if options.load_favorites && favorites.is_empty() && !base.gallery.is_empty() {
            info!(
                "{}: no favorites found, using {} profile-page images",
                username,
                base.gallery.len()
            );
            favorites = base.gallery;
        }

        let zero_review_alert = options.load_reviews && reviews.is_empty();
        if zero_review_alert {
            warn!("{}: harvest returned zero reviews, markup may have changed", username);
        }

        let profile = Arc::new(Profile {
            username: base.username,
            location: base.location,
            gender: base.gender,
            age: base.age,
            stats: base.stats,
            favorites,
            reviews,
            profile_url: base.profile_url,
            avatar_url: base.avatar_url,
        });

        if options.use_cache {
            self.cache
                .set(
                    key,
                    CacheEntry {
                        payload: Arc::clone(&profile),
                        created_at: self.clock.now(),
                        ttl: Duration::from_millis(options.cache_time_ms),
                    },
                )
                .await;
        }

        let report = HarvestReport {
            duration_ms: self.elapsed_ms(started),
            review_count: profile.reviews.len(),
            favorite_count: profile.favorites.len(),
            from_cache: false,
            zero_review_alert,
        };
        info!(
            "{}: {} reviews | {} favorites | {}ms",
            username, report.review_count, report.favorite_count, report.duration_ms
        );

        Ok(Assembled { profile, report })
    }

    /// Forget every cached variant for `username`.
    pub async fn invalidate(&self, username: &str) -> usize {
        let n = self.cache.evict_user(username).await;
        info!("{}: {} cache entries evicted", username, n);
        n
    }

    fn elapsed_ms(&self, since: chrono::DateTime<chrono::Utc>) -> u64 {
        let ms = self.clock.now().signed_duration_since(since).num_milliseconds();
        u64::try_from(ms).unwrap_or(0)
    }
}
