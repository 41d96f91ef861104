//! Readability.js inside headless Chrome.
//!
//! The page markup is parsed with `DOMParser` in a blank tab, so none of the
//! page's own scripts run. Readability.js is injected into that tab, either
//! from a local file or by URL, and its `parse()` result is read back.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;
use webpaper_core::{AppConfig, Error, ExtractedArticle};

use super::{ReadabilityEngine, document_title, non_empty};
use crate::fetch::browser::{BrowserError, launch_browser, shutdown_browser};

/// Appends a `<script src>` for the given URL and resolves once it loads.
const LOAD_SCRIPT_JS: &str = r#"(src) => new Promise((resolve, reject) => {
    const script = document.createElement('script');
    script.src = src;
    script.onload = () => resolve(true);
    script.onerror = () => reject(new Error('failed to load ' + src));
    document.head.appendChild(script);
})"#;

/// Parses `html` detached from the live tab and runs Readability over it.
const PARSE_JS: &str = r#"(html, url) => {
    const doc = new DOMParser().parseFromString(html, 'text/html');
    const base = doc.createElement('base');
    base.href = url;
    doc.head.prepend(base);
    const article = new Readability(doc).parse();
    return { title: (article && article.title) || '', content: (article && article.content) || '' };
}"#;

/// Where Readability.js comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Local file, evaluated as-is.
    File(PathBuf),
    /// Loaded by the browser through a script tag.
    Url(String),
}

impl ScriptSource {
    pub fn from_app(config: &AppConfig) -> Self {
        match &config.readability_script {
            Some(path) => ScriptSource::File(path.clone()),
            None => ScriptSource::Url(config.readability_script_url.clone()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScriptArticle {
    title: String,
    content: String,
}

/// Mozilla's Readability.js, evaluated in headless Chrome.
#[derive(Debug, Clone)]
pub struct ScriptReadabilityEngine {
    chrome_executable: Option<PathBuf>,
    script: ScriptSource,
}

impl ScriptReadabilityEngine {
    pub fn new(chrome_executable: Option<PathBuf>, script: ScriptSource) -> Self {
        Self { chrome_executable, script }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self::new(config.chrome_executable.clone(), ScriptSource::from_app(config))
    }

    async fn parse(&self, browser: &Browser, html: &str, url: &Url) -> Result<ScriptArticle, BrowserError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;

        let result = self.parse_in(&page, html, url).await;
        page.close().await.ok();
        result
    }

    async fn parse_in(&self, page: &Page, html: &str, url: &Url) -> Result<ScriptArticle, BrowserError> {
        match &self.script {
            ScriptSource::File(path) => {
                let source = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| BrowserError::Script(format!("{}: {}", path.display(), e)))?;
                let _: bool = evaluate(page, format!("{source}\n;true")).await?;
            }
            ScriptSource::Url(src) => {
                let _: bool = evaluate(page, call_expression(LOAD_SCRIPT_JS, &[src.as_str()])?).await?;
            }
        }

        evaluate(page, call_expression(PARSE_JS, &[html, url.as_str()])?).await
    }
}

#[async_trait]
impl ReadabilityEngine for ScriptReadabilityEngine {
    fn name(&self) -> &'static str {
        "readability.js"
    }

    async fn extract(&self, html: &str, url: &Url) -> Result<ExtractedArticle, Error> {
        let (browser, handler) = launch_browser(self.chrome_executable.as_deref()).await?;
        let result = self.parse(&browser, html, url).await;
        shutdown_browser(browser, handler).await;

        let article = result?;
        let title = match article.title.trim() {
            "" => document_title(html).unwrap_or_else(|| "Untitled".to_string()),
            title => title.to_string(),
        };
        non_empty(title, article.content)
    }
}

/// `(function)(arg, ...)` with every argument as a JSON string literal.
fn call_expression(function: &str, args: &[&str]) -> Result<String, BrowserError> {
    let args = args
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BrowserError::Script(e.to_string()))?;
    Ok(format!("({})({})", function, args.join(", ")))
}

async fn evaluate<T: DeserializeOwned>(page: &Page, expression: String) -> Result<T, BrowserError> {
    let params = EvaluateParams::builder()
        .expression(expression)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(BrowserError::Script)?;

    page.evaluate(params)
        .await
        .map_err(|e| BrowserError::Script(e.to_string()))?
        .into_value()
        .map_err(|e| BrowserError::Script(e.to_string()))
}
