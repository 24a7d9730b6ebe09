use crate::config::BrowserSettings;
use crate::errors::{HarvestError, Result};
use crate::scraper::scroll::{PageDriver, PageMetrics, bounded, run_scroll_loop};
use crate::utils::Clock;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MARKER_POLL: Duration = Duration::from_millis(250);

// ── Markup source ─────────────────────────────────────────────────────────────

/// Anything that can turn a URL into fully rendered markup.
#[async_trait]
pub trait MarkupSource: Send + Sync {
    async fn acquire(&self, url: &str) -> Result<String>;

    /// Like `acquire`, but a failure is logged and becomes empty markup.
    async fn acquire_or_empty(&self, url: &str) -> String {
        match self.acquire(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("{}", e);
                String::new()
            }
        }
    }
}

// ── Session guard ─────────────────────────────────────────────────────────────

/// One isolated browser process plus its CDP event loop.
///
/// `close` asks Chromium to exit and waits for it; `kill` does not ask.
/// Dropping the guard aborts the event loop.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings, user_agent: &str) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=fr-FR")
            .arg(format!("--user-agent={}", user_agent));
        if !settings.headless {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(|e| HarvestError::acquisition("about:blank", format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::acquisition("about:blank", format!("browser launch: {}", e)))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        debug!("Browser launched (headless={})", settings.headless);

        Ok(Self { browser, handler })
    }

    /// Unbounded: a wedged CDP connection never answers.
    pub async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait error: {}", e);
        }
    }

    pub async fn kill(&mut self) {
        if let Some(Err(e)) = self.browser.kill().await {
            warn!("Browser kill error: {}", e);
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

// ── Page driver ───────────────────────────────────────────────────────────────

/// `PageDriver` over a live chromiumoxide tab, via small evaluated scripts.
pub struct ChromiumDriver {
    page: Page,
    url: String,
    clock: Arc<dyn Clock>,
}

impl ChromiumDriver {
    pub fn new(page: Page, url: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            page,
            url: url.to_string(),
            clock,
        }
    }

    fn fail(&self, what: &str, e: impl std::fmt::Display) -> HarvestError {
        HarvestError::acquisition(&self.url, format!("{}: {}", what, e))
    }

    async fn eval<T: DeserializeOwned>(&self, what: &str, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| self.fail(what, e))?
            .into_value::<T>()
            .map_err(|e| self.fail(what, e))
    }

    fn js_string<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| self.fail("encode script argument", e))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn wait_for_marker(&self, selector: &str) -> Result<()> {
        let script = format!("document.querySelector({}) !== null", self.js_string(selector)?);
        loop {
            if self.eval::<bool>("marker check", script.clone()).await? {
                return Ok(());
            }
            self.clock.sleep(MARKER_POLL).await;
        }
    }

    async fn metrics(&self, item_selector: &str) -> Result<PageMetrics> {
        let script = format!(
            "({{ height: document.body ? document.body.scrollHeight : 0, \
                 items: document.querySelectorAll({}).length }})",
            self.js_string(item_selector)?
        );
        self.eval("sample metrics", script).await
    }

    async fn scroll_by(&self, px: u32) -> Result<()> {
        self.eval::<serde_json::Value>("scroll", format!("window.scrollBy(0, {}); true", px))
            .await
            .map(|_| ())
    }

    async fn click_load_more(&self, labels: &[String]) -> Result<bool> {
        let lowered: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
        let script = format!(
            r#"(() => {{
                const labels = {};
                const nodes = document.querySelectorAll('button, a, [role="button"]');
                for (const el of nodes) {{
                    const text = (el.innerText || el.textContent || '').trim().toLowerCase();
                    if (el.offsetParent !== null && labels.some(l => text.includes(l))) {{
                        el.click();
                        return true;
                    }}
                }}
                return false;
            }})()"#,
            self.js_string(&lowered)?
        );
        self.eval("load more", script).await
    }

    async fn scroll_to_top(&self) -> Result<()> {
        self.eval::<serde_json::Value>("scroll to top", "window.scrollTo(0, 0); true".to_string())
            .await
            .map(|_| ())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(|e| self.fail("capture", e))
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// The steps of one acquisition. `acquire_with` owns the ordering and the
/// teardown bounds.
#[async_trait]
pub trait BrowserLifecycle: Send + Sync {
    type Session: Send + Sync;

    async fn launch(&self) -> Result<Self::Session>;
    async fn capture(&self, session: &Self::Session, url: &str) -> Result<String>;
    async fn close(&self, session: &mut Self::Session);
    async fn kill(&self, session: &mut Self::Session);
}

/// Launch, capture, then close whatever the capture returned.
///
/// A close that overruns `close_limit` falls back to `kill`, itself bounded
/// by the same limit.
pub async fn acquire_with<L: BrowserLifecycle>(
    lifecycle: &L,
    clock: &dyn Clock,
    close_limit: Duration,
    url: &str,
) -> Result<String> {
    let mut session = lifecycle.launch().await?;
    let result = lifecycle.capture(&session, url).await;

    if bounded(clock, close_limit, lifecycle.close(&mut session)).await.is_none() {
        warn!("Browser did not close within {:?}, killing it", close_limit);
        if bounded(clock, close_limit, lifecycle.kill(&mut session)).await.is_none() {
            warn!("Browser kill timed out, leaving it to the drop guard");
        }
    }
    result
}

// ── Acquirer ──────────────────────────────────────────────────────────────────

/// Launch, navigate, scroll to stability, capture. One browser per call.
pub struct PageAcquirer {
    settings: BrowserSettings,
    user_agent: String,
    clock: Arc<dyn Clock>,
}

impl PageAcquirer {
    pub fn new(settings: BrowserSettings, user_agent: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            user_agent: user_agent.to_string(),
            clock,
        }
    }

    fn close_limit(&self) -> Duration {
        Duration::from_millis(self.settings.close_timeout_ms)
    }
}

#[async_trait]
impl BrowserLifecycle for PageAcquirer {
    type Session = BrowserSession;

    async fn launch(&self) -> Result<BrowserSession> {
        let limit = Duration::from_secs(self.settings.navigation_timeout_secs);
        bounded(
            self.clock.as_ref(),
            limit,
            BrowserSession::launch(&self.settings, &self.user_agent),
        )
        .await
        .ok_or_else(|| HarvestError::acquisition("about:blank", "browser launch timed out"))?
    }

    async fn capture(&self, session: &BrowserSession, url: &str) -> Result<String> {
        let clock = self.clock.as_ref();
        let nav_limit = Duration::from_secs(self.settings.navigation_timeout_secs);
        let eval_limit = Duration::from_millis(self.settings.evaluate_timeout_ms);

        let page = bounded(clock, nav_limit, session.browser.new_page(url))
            .await
            .ok_or_else(|| HarvestError::acquisition(url, "navigation timed out"))?
            .map_err(|e| HarvestError::acquisition(url, format!("open page: {}", e)))?;

        if bounded(clock, nav_limit, page.wait_for_navigation()).await.is_none() {
            debug!("Navigation still pending after {:?}, continuing", nav_limit);
        }

        let driver = ChromiumDriver::new(page.clone(), url, Arc::clone(&self.clock));
        let total = Duration::from_secs(self.settings.total_timeout_secs);

        match bounded(clock, total, run_scroll_loop(&driver, clock, &self.settings)).await {
            Some(outcome) => info!(
                "Scroll finished: {:?} after {} iterations, {} items",
                outcome.phase, outcome.attempts, outcome.metrics.items
            ),
            None => warn!("Scroll loop exceeded {:?}, capturing current page", total),
        }

        let html = bounded(clock, eval_limit, driver.content())
            .await
            .ok_or_else(|| HarvestError::acquisition(url, "capture timed out"))?;

        match bounded(clock, self.close_limit(), page.close()).await {
            Some(Err(e)) => debug!("Page close error: {}", e),
            None => debug!("Page close timed out, the browser goes with it"),
            Some(Ok(_)) => {}
        }
        html
    }

    async fn close(&self, session: &mut BrowserSession) {
        session.close().await;
    }

    async fn kill(&self, session: &mut BrowserSession) {
        session.kill().await;
    }
}

#[async_trait]
impl MarkupSource for PageAcquirer {
    async fn acquire(&self, url: &str) -> Result<String> {
        info!("Acquiring {}", url);
        let result = acquire_with(self, self.clock.as_ref(), self.close_limit(), url).await;

        if let Ok(html) = &result {
            debug!("Captured {} bytes from {}", html.len(), url);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeBrowser {
        fail_launch: bool,
        fail_capture: bool,
        hang_close: bool,
        launches: AtomicUsize,
        closes: AtomicUsize,
        kills: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLifecycle for FakeBrowser {
        type Session = ();

        async fn launch(&self) -> Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.fail_launch {
                return Err(HarvestError::acquisition("about:blank", "no chromium"));
            }
            Ok(())
        }

        async fn capture(&self, _session: &(), url: &str) -> Result<String> {
            if self.fail_capture {
                return Err(HarvestError::acquisition(url, "navigation timed out"));
            }
            Ok("<html></html>".to_string())
        }

        async fn close(&self, _session: &mut ()) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.hang_close {
                std::future::pending::<()>().await;
            }
        }

        async fn kill(&self, _session: &mut ()) {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap())
    }

    const URL: &str = "https://www.senscritique.com/KiMi_/critiques";
    const LIMIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_failed_capture_still_closes_browser() {
        let browser = FakeBrowser {
            fail_capture: true,
            ..FakeBrowser::default()
        };
        let clock = clock();

        let err = acquire_with(&browser, &clock, LIMIT, URL).await.unwrap_err();
        assert!(matches!(err, HarvestError::Acquisition { .. }));
        assert_eq!(browser.closes.load(Ordering::SeqCst), 1);
        assert_eq!(browser.kills.load(Ordering::SeqCst), 0);
        assert_eq!(clock.slept(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_hung_close_falls_back_to_kill() {
        let browser = FakeBrowser {
            hang_close: true,
            ..FakeBrowser::default()
        };
        let clock = clock();

        let html = acquire_with(&browser, &clock, LIMIT, URL).await.unwrap();
        assert_eq!(html, "<html></html>");
        assert_eq!(browser.closes.load(Ordering::SeqCst), 1);
        assert_eq!(browser.kills.load(Ordering::SeqCst), 1);
        assert_eq!(clock.slept(), LIMIT);
    }

    #[tokio::test]
    async fn test_failed_launch_has_nothing_to_close() {
        let browser = FakeBrowser {
            fail_launch: true,
            ..FakeBrowser::default()
        };

        assert!(acquire_with(&browser, &clock(), LIMIT, URL).await.is_err());
        assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
        assert_eq!(browser.closes.load(Ordering::SeqCst), 0);
    }
}
