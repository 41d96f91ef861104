//! Scripted browser fetches for pages that need JavaScript.
//!
//! Launches headless Chrome through chromiumoxide, scrolls the page in fixed
//! steps so lazy content materializes, and forces deferred image sources into
//! `src` before reading the page source. One browser process per fetch; the
//! process is closed on every exit path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;
use webpaper_core::{AppConfig, Error, PageContent};

use crate::debug::DebugSnapshots;

/// Errors raised by a scripted browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A page script failed or returned something unexpected.
    #[error("script failed: {0}")]
    Script(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),
}

impl From<BrowserError> for Error {
    fn from(err: BrowserError) -> Self {
        Error::BrowserFailed(err.to_string())
    }
}

/// Tuning for the scroll-and-wait loop.
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Wait after navigation before the first scroll.
    pub settle: Duration,
    /// Pixels per scroll step.
    pub step_px: u32,
    /// Pause after each step.
    pub pause: Duration,
    /// Hard ceiling on iterations.
    pub max_attempts: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl ScrollConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            settle: Duration::from_secs(5),
            step_px: config.scroll_step_px,
            pause: Duration::from_millis(config.scroll_pause_ms),
            max_attempts: config.max_scroll_attempts,
        }
    }
}

/// Forces lazy images to load. Returns `{changed, total, loaded}`.
const FORCE_LOAD_IMAGES_JS: &str = r#"(() => {
    let changed = false;
    let total = 0;
    let loaded = 0;

    const isRealUrl = (u) => u && u !== '' && !u.startsWith('data:') && !u.startsWith('blob:');

    document.querySelectorAll('figure[data-sources] img').forEach(img => {
        try {
            const entries = JSON.parse(img.closest('figure').getAttribute('data-sources'));
            if (Array.isArray(entries) && entries.length > 0) {
                const best = entries.reduce((a, b) => ((b.width || 0) >= (a.width || 0) ? b : a));
                if (best && best.url && img.src !== best.url) {
                    img.src = best.url;
                    changed = true;
                }
            }
        } catch (e) {}
    });

    document.querySelectorAll('img').forEach(img => {
        total++;
        if (img.loading === 'lazy') {
            img.loading = 'eager';
            changed = true;
        }
        for (const attr of ['data-src', 'data-original', 'data-load-src', 'data-lazy-src', 'data-original-src']) {
            const value = img.getAttribute(attr);
            if (isRealUrl(value) && img.getAttribute('src') !== value) {
                img.setAttribute('src', value);
                changed = true;
            }
        }
        if (img.complete && img.naturalWidth > 0) {
            loaded++;
        }
    });

    return { changed, total, loaded };
})()"#;

const PAGE_HEIGHT_JS: &str = "document.body ? document.body.scrollHeight : 0";

const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)";

/// Outcome of one image-forcing pass.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ImagePass {
    /// Whether any attribute was rewritten.
    pub changed: bool,
    /// Images on the page.
    pub total: u32,
    /// Images that finished loading.
    pub loaded: u32,
}

/// Whether the scroll loop has nothing left to wait for.
pub fn scroll_settled(last_height: i64, new_height: i64, pass: &ImagePass) -> bool {
    new_height == last_height && !pass.changed
}

/// Headless Chrome fetcher.
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    chrome_executable: Option<PathBuf>,
    scroll: ScrollConfig,
    snapshots: DebugSnapshots,
}

impl BrowserFetcher {
    pub fn new(chrome_executable: Option<PathBuf>, scroll: ScrollConfig, snapshots: DebugSnapshots) -> Self {
        Self { chrome_executable, scroll, snapshots }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self::new(
            config.chrome_executable.clone(),
            ScrollConfig::from_app(config),
            DebugSnapshots::new(config.debug, &config.debug_dir),
        )
    }

    /// Navigate to `url`, materialize lazy content and return the page source.
    pub async fn fetch_rendered(&self, url: &Url) -> Result<PageContent, BrowserError> {
        tracing::info!(%url, "loading page in headless browser");

        let (browser, handler) = launch_browser(self.chrome_executable.as_deref()).await?;
        let result = self.materialize(&browser, url).await;
        shutdown_browser(browser, handler).await;

        let (html, final_url) = result?;
        self.snapshots.save("debug_page.html", &html).await;

        Ok(PageContent::new(final_url, html))
    }

    async fn materialize(&self, browser: &Browser, url: &Url) -> Result<(String, Url), BrowserError> {
        let page = browser
            .new_page(url.as_str())
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;

        tokio::time::sleep(self.scroll.settle).await;

        let mut last_height = page_height(&page).await?;
        let step = format!("window.scrollBy(0, {})", self.scroll.step_px);

        for attempt in 0..self.scroll.max_attempts {
            run_script(&page, step.as_str()).await?;
            tokio::time::sleep(self.scroll.pause).await;

            let pass = force_load_images(&page).await?;
            tracing::debug!(attempt, total = pass.total, loaded = pass.loaded, changed = pass.changed, "image pass");
            if pass.changed {
                tokio::time::sleep(self.scroll.pause.saturating_mul(3)).await;
            }

            if attempt % 3 == 0 {
                run_script(&page, SCROLL_TO_BOTTOM_JS).await?;
                tokio::time::sleep(self.scroll.pause.saturating_mul(2)).await;

                let new_height = page_height(&page).await?;
                if scroll_settled(last_height, new_height, &pass) {
                    tracing::debug!(attempt, height = new_height, "page settled");
                    break;
                }
                last_height = new_height;
            }
        }

        let last = force_load_images(&page).await?;
        tracing::info!(total = last.total, loaded = last.loaded, "final image pass");

        let html = page
            .content()
            .await
            .map_err(|e| BrowserError::ContentRetrieval(e.to_string()))?;

        let final_url = page
            .url()
            .await
            .map_err(|e| BrowserError::ContentRetrieval(e.to_string()))?
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        page.close().await.ok();
        Ok((html, final_url))
    }
}

/// Launch headless Chrome and drive its CDP event loop on a background task.
///
/// The caller owns the returned browser and must close it; dropping `Browser`
/// also kills the child process.
pub(crate) async fn launch_browser(chrome: Option<&Path>) -> Result<(Browser, JoinHandle<()>), BrowserError> {
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(1920, 1080)
        .arg("--disable-dev-shm-usage")
        .arg("--disable-blink-features=AutomationControlled");

    if let Some(path) = chrome {
        builder = builder.chrome_executable(path);
    }

    let (browser, mut handler) = Browser::launch(builder.build().map_err(BrowserError::Launch)?)
        .await
        .map_err(|e| BrowserError::Launch(e.to_string()))?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
    });

    Ok((browser, handle))
}

/// Close the browser, reap the child process and stop the event loop.
pub(crate) async fn shutdown_browser(mut browser: Browser, handler: JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        tracing::debug!(error = %e, "browser close failed");
    }
    if let Err(e) = browser.wait().await {
        tracing::debug!(error = %e, "browser wait failed");
    }
    handler.abort();
}

async fn run_script(page: &Page, js: &str) -> Result<(), BrowserError> {
    page.evaluate(js)
        .await
        .map(|_| ())
        .map_err(|e| BrowserError::Script(e.to_string()))
}

async fn page_height(page: &Page) -> Result<i64, BrowserError> {
    let height: f64 = page
        .evaluate(PAGE_HEIGHT_JS)
        .await
        .map_err(|e| BrowserError::Script(e.to_string()))?
        .into_value()
        .map_err(|e| BrowserError::Script(e.to_string()))?;
    Ok(height.round() as i64)
}

async fn force_load_images(page: &Page) -> Result<ImagePass, BrowserError> {
    page.evaluate(FORCE_LOAD_IMAGES_JS)
        .await
        .map_err(|e| BrowserError::Script(e.to_string()))?
        .into_value()
        .map_err(|e| BrowserError::Script(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_config_from_app() {
        let app = AppConfig { scroll_step_px: 500, scroll_pause_ms: 250, max_scroll_attempts: 4, ..Default::default() };
        let scroll = ScrollConfig::from_app(&app);
        assert_eq!(scroll.step_px, 500);
        assert_eq!(scroll.pause, Duration::from_millis(250));
        assert_eq!(scroll.max_attempts, 4);
    }

    #[test]
    fn test_scroll_settled_requires_stable_height_and_no_rewrites() {
        let quiet = ImagePass { changed: false, total: 3, loaded: 3 };
        let busy = ImagePass { changed: true, total: 3, loaded: 1 };

        assert!(scroll_settled(2400, 2400, &quiet));
        assert!(!scroll_settled(2400, 2400, &busy));
        assert!(!scroll_settled(2400, 3100, &quiet));
    }

    #[test]
    fn test_image_pass_deserializes() {
        let pass: ImagePass = serde_json::from_str(r#"{"changed":true,"total":7,"loaded":2}"#).unwrap();
        assert!(pass.changed);
        assert_eq!(pass.total, 7);
        assert_eq!(pass.loaded, 2);
    }

    #[test]
    fn test_browser_error_converts() {
        let err: Error = BrowserError::Launch("no chrome".into()).into();
        assert!(matches!(err, Error::BrowserFailed(msg) if msg.contains("no chrome")));
    }

    #[tokio::test]
    #[ignore = "requires network and Chrome/Chromium"]
    async fn test_fetch_rendered_live() {
        let scroll = ScrollConfig { settle: Duration::from_millis(500), max_attempts: 2, ..Default::default() };
        let fetcher = BrowserFetcher::new(None, scroll, DebugSnapshots::disabled());
        let url = Url::parse("https://example.com").unwrap();

        let page = fetcher.fetch_rendered(&url).await.unwrap();
        assert!(page.html.contains("Example Domain"));
        assert_eq!(page.url.as_str(), "https://example.com/");
    }
}
