//! Scroll-to-stability loop for infinite-scroll pages.
//!
//! `ScrollTracker` is the pure state machine; `run_scroll_loop` drives a
//! `PageDriver` with it. Every call into the page and every pause is bounded
//! through the injected `Clock`, so a stuck page never stalls the harvest.

use crate::config::BrowserSettings;
use crate::errors::Result;
use crate::utils::Clock;
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    /// Content is still arriving.
    Scrolling,
    /// Item count unchanged for `n` consecutive iterations.
    Stable(u32),
    Done,
    MaxAttempts,
}

impl ScrollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScrollPhase::Done | ScrollPhase::MaxAttempts)
    }
}

/// One sample of the page: document height and visible review items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageMetrics {
    pub height: u64,
    pub items: u64,
}

#[derive(Debug, Clone)]
pub struct ScrollTracker {
    phase: ScrollPhase,
    attempts: u32,
    last: Option<PageMetrics>,
    stable: u32,
    idle: u32,
    stable_rounds: u32,
    idle_rounds: u32,
    max_attempts: u32,
}

impl ScrollTracker {
    pub fn new(stable_rounds: u32, idle_rounds: u32, max_attempts: u32) -> Self {
        Self {
            phase: ScrollPhase::Scrolling,
            attempts: 0,
            last: None,
            stable: 0,
            idle: 0,
            stable_rounds: stable_rounds.max(1),
            idle_rounds: idle_rounds.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_settings(settings: &BrowserSettings) -> Self {
        Self::new(
            settings.stable_rounds,
            settings.idle_rounds,
            settings.max_scroll_attempts,
        )
    }

    /// Sample taken before the first scroll. Not counted as an attempt.
    pub fn baseline(&mut self, metrics: PageMetrics) {
        self.last = Some(metrics);
    }

    pub fn phase(&self) -> ScrollPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last(&self) -> Option<PageMetrics> {
        self.last
    }

    /// Feed the metrics sampled at the end of one iteration.
    pub fn observe(&mut self, metrics: PageMetrics) -> ScrollPhase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        self.attempts += 1;

        match self.last {
            Some(prev) if prev.items == metrics.items => {
                self.stable += 1;
                if prev.height == metrics.height {
                    self.idle += 1;
                } else {
                    self.idle = 0;
                }
                self.phase = ScrollPhase::Stable(self.stable);
            }
            _ => {
                self.stable = 0;
                self.idle = 0;
                self.phase = ScrollPhase::Scrolling;
            }
        }
        self.last = Some(metrics);

        if self.stable >= self.stable_rounds || self.idle >= self.idle_rounds {
            self.phase = ScrollPhase::Done;
        } else if self.attempts >= self.max_attempts {
            self.phase = ScrollPhase::MaxAttempts;
        }
        self.phase
    }
}

// ── Page driver ───────────────────────────────────────────────────────────────

/// The handful of page operations the scroll loop needs.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn wait_for_marker(&self, selector: &str) -> Result<()>;
    async fn metrics(&self, item_selector: &str) -> Result<PageMetrics>;
    async fn scroll_by(&self, px: u32) -> Result<()>;
    /// Click a visible control whose label matches; `true` if one was clicked.
    async fn click_load_more(&self, labels: &[String]) -> Result<bool>;
    async fn scroll_to_top(&self) -> Result<()>;
    async fn content(&self) -> Result<String>;
}

/// Run `fut` for at most `limit` of clock time. `None` on timeout.
pub async fn bounded<F, T>(clock: &dyn Clock, limit: Duration, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        out = fut => Some(out),
        _ = clock.sleep(limit) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub phase: ScrollPhase,
    pub attempts: u32,
    pub metrics: PageMetrics,
}

/// Scroll until the item count settles or the attempt cap is hit, then
/// return to the top. Failures inside the loop are logged and skipped.
pub async fn run_scroll_loop(
    driver: &dyn PageDriver,
    clock: &dyn Clock,
    settings: &BrowserSettings,
) -> ScrollOutcome {
    let eval_limit = Duration::from_millis(settings.evaluate_timeout_ms);
    let step_pause = Duration::from_millis(settings.step_pause_ms);
    let settle = Duration::from_millis(settings.settle_ms);

    match bounded(
        clock,
        Duration::from_millis(settings.marker_timeout_ms),
        driver.wait_for_marker(&settings.item_selector),
    )
    .await
    {
        Some(Ok(())) => debug!("First review marker present"),
        Some(Err(e)) => debug!("Marker wait failed: {}", e),
        None => debug!("No review marker after {}ms, scrolling anyway", settings.marker_timeout_ms),
    }

    let mut tracker = ScrollTracker::from_settings(settings);
    let start = sample(driver, clock, eval_limit, &settings.item_selector)
        .await
        .unwrap_or_default();
    tracker.baseline(start);

    while !tracker.phase().is_terminal() {
        for _ in 0..settings.scroll_steps_per_iteration {
            if let Some(Err(e)) = bounded(clock, eval_limit, driver.scroll_by(settings.scroll_step_px)).await {
                debug!("Scroll step failed: {}", e);
            }
            clock.sleep(step_pause).await;
        }

        match bounded(clock, eval_limit, driver.click_load_more(&settings.load_more_labels)).await {
            Some(Ok(true)) => debug!("Clicked a load-more control"),
            Some(Err(e)) => debug!("Load-more lookup failed: {}", e),
            _ => {}
        }
        clock.sleep(settle).await;

        // A failed sample counts as "nothing changed"
        let metrics = match sample(driver, clock, eval_limit, &settings.item_selector).await {
            Some(m) => m,
            None => tracker.last().unwrap_or_default(),
        };
        let phase = tracker.observe(metrics);
        debug!(
            "Scroll #{}: height={} items={} → {:?}",
            tracker.attempts(),
            metrics.height,
            metrics.items,
            phase
        );
    }

    if tracker.phase() == ScrollPhase::MaxAttempts {
        warn!(
            "Scroll cap of {} iterations reached, capturing what loaded",
            settings.max_scroll_attempts
        );
    }

    if bounded(clock, eval_limit, driver.scroll_to_top()).await.is_none() {
        debug!("Scroll to top timed out");
    }
    clock.sleep(step_pause).await;

    ScrollOutcome {
        phase: tracker.phase(),
        attempts: tracker.attempts(),
        metrics: tracker.last().unwrap_or_default(),
    }
}

async fn sample(
    driver: &dyn PageDriver,
    clock: &dyn Clock,
    limit: Duration,
    selector: &str,
) -> Option<PageMetrics> {
    match bounded(clock, limit, driver.metrics(selector)).await {
        Some(Ok(m)) => Some(m),
        Some(Err(e)) => {
            debug!("Metrics sample failed: {}", e);
            None
        }
        None => {
            debug!("Metrics sample timed out");
            None
        }
    }
}
