//! PDF output through headless Chrome.
//!
//! The HTML shell is loaded into a blank page with Fetch interception enabled,
//! so every request the layout makes passes through
//! [`secure_resource_url`]. After fonts and images settle, `Page.printToPDF`
//! produces the document using the stylesheet's `@page` geometry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::fetch::{ContinueRequestParams, EnableParams, EventRequestPaused};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures_util::StreamExt;
use serde::Deserialize;
use webpaper_core::{AppConfig, Error, NormalizedDocument};

use super::{DocumentRenderer, PdfError, RenderSpec, build_html_shell, secure_resource_url, write_atomically};
use crate::fetch::browser::{launch_browser, shutdown_browser};

/// Resolves once web fonts are ready and every image finished or failed, or
/// after `__TIMEOUT__` ms. Returns `{images, broken}`.
const WAIT_FOR_ASSETS_JS: &str = r#"(async () => {
    const pending = Array.from(document.images)
        .filter(img => !img.complete)
        .map(img => new Promise(resolve => {
            img.addEventListener('load', resolve, { once: true });
            img.addEventListener('error', resolve, { once: true });
        }));
    const timeout = new Promise(resolve => setTimeout(resolve, __TIMEOUT__));
    await Promise.race([Promise.all([document.fonts.ready, ...pending]), timeout]);
    const images = document.images.length;
    const broken = Array.from(document.images).filter(img => img.complete && img.naturalWidth === 0).length;
    return { images, broken };
})()"#;

#[derive(Debug, Default, Deserialize)]
struct AssetReport {
    images: u32,
    broken: u32,
}

fn read_asset_report<E: std::fmt::Display>(value: Result<AssetReport, E>) -> AssetReport {
    value.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "asset report unreadable");
        AssetReport::default()
    })
}

/// Renders documents to PDF with headless Chrome.
#[derive(Debug, Clone)]
pub struct ChromePdfRenderer {
    chrome_executable: Option<PathBuf>,
    asset_timeout: Duration,
}

impl Default for ChromePdfRenderer {
    fn default() -> Self {
        Self::new(None, Duration::from_secs(20))
    }
}

impl ChromePdfRenderer {
    pub fn new(chrome_executable: Option<PathBuf>, asset_timeout: Duration) -> Self {
        Self { chrome_executable, asset_timeout }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self::new(config.chrome_executable.clone(), config.timeout())
    }

    async fn print(&self, browser: &Browser, html: &str) -> Result<Vec<u8>, PdfError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PdfError::Load(e.to_string()))?;

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| PdfError::Load(e.to_string()))?;
        page.execute(EnableParams::default())
            .await
            .map_err(|e| PdfError::Load(e.to_string()))?;

        let interceptor = {
            let page = page.clone();
            tokio::spawn(async move {
                while let Some(event) = paused.next().await {
                    let mut params = ContinueRequestParams::new(event.request_id.clone());
                    let secured = secure_resource_url(&event.request.url);
                    if secured != event.request.url {
                        tracing::debug!(from = %event.request.url, to = %secured, "rewrote resource url");
                        params.url = Some(secured);
                    }
                    if let Err(e) = page.execute(params).await {
                        tracing::debug!(error = %e, "failed to continue intercepted request");
                    }
                }
            })
        };

        let result = self.load_and_print(&page, html).await;

        interceptor.abort();
        page.close().await.ok();
        result
    }

    async fn load_and_print(&self, page: &Page, html: &str) -> Result<Vec<u8>, PdfError> {
        page.set_content(html)
            .await
            .map_err(|e| PdfError::Load(e.to_string()))?;

        let script = WAIT_FOR_ASSETS_JS.replace("__TIMEOUT__", &self.asset_timeout.as_millis().to_string());
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(PdfError::Load)?;

        let evaluation = page
            .evaluate(params)
            .await
            .map_err(|e| PdfError::Load(e.to_string()))?;
        let report = read_asset_report(evaluation.into_value());
        if report.broken > 0 {
            tracing::warn!(images = report.images, broken = report.broken, "some images failed to load");
        } else {
            tracing::debug!(images = report.images, "assets loaded");
        }

        let params = PrintToPdfParams {
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            ..Default::default()
        };
        page.pdf(params).await.map_err(|e| PdfError::Print(e.to_string()))
    }
}

#[async_trait]
impl DocumentRenderer for ChromePdfRenderer {
    async fn render(&self, doc: &NormalizedDocument, spec: &RenderSpec, output: &Path) -> Result<(), Error> {
        tracing::info!(output = %output.display(), title = %doc.title, "rendering PDF");
        let html = build_html_shell(doc, spec);

        let (browser, handler) = launch_browser(self.chrome_executable.as_deref())
            .await
            .map_err(|e| PdfError::Launch(e.to_string()))?;

        let result = self.print(&browser, &html).await;
        shutdown_browser(browser, handler).await;

        let bytes = result?;
        write_atomically(output, &bytes).await?;

        tracing::info!(output = %output.display(), bytes = bytes.len(), "wrote PDF");
        Ok(())
    }
}
