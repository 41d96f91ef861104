//! Article extraction.
//!
//! ### Strategy order
//! 1. Site rule (only for publishers with a [`SiteRule`]): render the page in
//!    the scripted browser and pick the first known content container.
//! 2. Readability: optionally render the page in the scripted browser (falling
//!    back to the already fetched markup), then run the readability engines in
//!    order until one returns content.
//!
//! ### Engines
//! - Readability.js in headless Chrome (only when the browser is enabled).
//! - Lectito (Readability.js-inspired, consults site configs).
//! - dom_smoothie (heuristic-only Readability port).
//!
//! All yield a title and an HTML fragment.

pub mod figures;
pub mod script;
pub mod site;

pub use figures::{best_srcset_candidate, srcset_candidates};
pub use script::{ScriptReadabilityEngine, ScriptSource};
pub use site::{ContentSelector, SiteRule};

use async_trait::async_trait;
use futures_util::FutureExt;
use lectito_core::{Document, ExtractConfig as LectitoConfig};
use scraper::{Html, Selector};
use tokio::sync::OnceCell;
use url::Url;
use webpaper_core::{AppConfig, Error, ExtractedArticle, PageContent};

use crate::chain::FallbackChain;
use crate::debug::DebugSnapshots;
use crate::fetch::PageSource;

/// Configuration for the Lectito engine.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Minimum character count for content (default: 200)
    pub char_threshold: Option<usize>,

    /// Maximum number of top candidates to consider (default: 5)
    pub max_top_candidates: Option<usize>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { char_threshold: Some(200), max_top_candidates: Some(5) }
    }
}

impl ExtractConfig {
    /// Convert to Lectito's config type.
    fn to_lectito_config(&self) -> LectitoConfig {
        let mut cfg = LectitoConfig::default();
        if let Some(threshold) = self.char_threshold {
            cfg.char_threshold = threshold;
        }
        if let Some(max) = self.max_top_candidates {
            cfg.max_top_candidates = max;
        }
        cfg
    }
}

/// A readability-style engine: whole page in, title and body fragment out.
#[async_trait]
pub trait ReadabilityEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Extract the main article from page markup.
    async fn extract(&self, html: &str, url: &Url) -> Result<ExtractedArticle, Error>;
}

/// Lectito-based engine.
#[derive(Debug, Clone, Default)]
pub struct LectitoEngine {
    config: ExtractConfig,
}

impl LectitoEngine {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReadabilityEngine for LectitoEngine {
    fn name(&self) -> &'static str {
        "lectito"
    }

    async fn extract(&self, html: &str, _url: &Url) -> Result<ExtractedArticle, Error> {
        let doc = Document::parse(html).map_err(|e| Error::ExtractFailed(format!("failed to parse HTML: {}", e)))?;

        let extracted = lectito_core::extract_content(&doc, &self.config.to_lectito_config())
            .map_err(|e| Error::ExtractFailed(format!("extraction failed: {}", e)))?;

        let title = doc
            .extract_metadata()
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| document_title(html))
            .unwrap_or_else(|| "Untitled".to_string());

        non_empty(title, extracted.content.to_string())
    }
}

/// dom_smoothie-based engine.
#[derive(Debug, Clone)]
pub struct SmoothieEngine {
    max_elements_to_parse: usize,
}

impl Default for SmoothieEngine {
    fn default() -> Self {
        Self { max_elements_to_parse: 9000 }
    }
}

#[async_trait]
impl ReadabilityEngine for SmoothieEngine {
    fn name(&self) -> &'static str {
        "dom_smoothie"
    }

    async fn extract(&self, html: &str, url: &Url) -> Result<ExtractedArticle, Error> {
        let cfg = dom_smoothie::Config { max_elements_to_parse: self.max_elements_to_parse, ..Default::default() };

        let mut readability = dom_smoothie::Readability::new(html, Some(url.as_str()), Some(cfg))
            .map_err(|e| Error::ExtractFailed(format!("failed to parse HTML: {}", e)))?;
        let article = readability
            .parse()
            .map_err(|e| Error::ExtractFailed(format!("extraction failed: {}", e)))?;

        let title = if article.title.trim().is_empty() {
            document_title(html).unwrap_or_else(|| "Untitled".to_string())
        } else {
            article.title.trim().to_string()
        };

        non_empty(title, article.content.to_string())
    }
}

fn non_empty(title: String, body: String) -> Result<ExtractedArticle, Error> {
    if body.trim().is_empty() {
        return Err(Error::ExtractFailed("engine returned no content".into()));
    }
    Ok(ExtractedArticle::new(title, body))
}

/// Text of the `<title>` element, whitespace-collapsed.
pub fn document_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = doc.select(&selector).next()?.text().collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

/// Extraction strategies, tried in the order returned by
/// [`ArticleExtractor::strategies_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Publisher-specific container lookup.
    Site(SiteRule),
    /// Generic readability engines.
    Readability,
}

impl ExtractionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractionStrategy::Site(_) => "site rule",
            ExtractionStrategy::Readability => "readability",
        }
    }
}

/// Runs the extraction strategies against a fetched page.
pub struct ArticleExtractor {
    engines: Vec<Box<dyn ReadabilityEngine>>,
    render_pages: bool,
    snapshots: DebugSnapshots,
}

impl ArticleExtractor {
    /// `render_pages` re-fetches every page in the scripted browser before
    /// readability runs.
    pub fn new(engines: Vec<Box<dyn ReadabilityEngine>>, render_pages: bool, snapshots: DebugSnapshots) -> Self {
        Self { engines, render_pages, snapshots }
    }

    /// Engines from [`engines_for`], browser rendering as configured.
    pub fn from_app(config: &AppConfig) -> Self {
        Self::new(
            engines_for(config),
            config.browser_enabled,
            DebugSnapshots::new(config.debug, &config.debug_dir),
        )
    }

    /// Strategies that apply to `url`, in the order they are tried.
    pub fn strategies_for(url: &Url) -> Vec<ExtractionStrategy> {
        let mut strategies = Vec::with_capacity(2);
        if let Some(rule) = SiteRule::for_url(url) {
            strategies.push(ExtractionStrategy::Site(rule));
        }
        strategies.push(ExtractionStrategy::Readability);
        strategies
    }

    /// Extract the article from `page`, using `source` for scripted re-fetches.
    pub async fn extract(&self, page: &PageContent, source: &dyn PageSource) -> Result<ExtractedArticle, Error> {
        // At most one browser session per extraction; a failed session is remembered.
        let rendered: OnceCell<Option<PageContent>> = OnceCell::new();

        let mut chain = FallbackChain::new();
        for strategy in Self::strategies_for(&page.url) {
            chain = chain.attempt(strategy.name(), self.run(strategy, page, source, &rendered).boxed());
        }

        chain.run().await
    }

    /// Run the readability engines over markup that is already in hand.
    pub async fn extract_markup(&self, html: &str, url: &Url) -> Result<ExtractedArticle, Error> {
        let mut last_err = None;
        for engine in &self.engines {
            match engine.extract(html, url).await {
                Ok(article) => {
                    tracing::info!(engine = engine.name(), title = %article.title, "extracted article");
                    return Ok(article);
                }
                Err(e) => {
                    tracing::warn!(engine = engine.name(), error = %e, "engine failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::ExtractFailed("no readability engines configured".into())))
    }

    async fn run(
        &self, strategy: ExtractionStrategy, page: &PageContent, source: &dyn PageSource,
        rendered: &OnceCell<Option<PageContent>>,
    ) -> Result<ExtractedArticle, Error> {
        match strategy {
            ExtractionStrategy::Site(rule) => {
                tracing::info!(site = rule.name(), "using site-specific extraction");
                let rendered = self
                    .rendered(page, source, rendered, true)
                    .await
                    .ok_or_else(|| Error::BrowserFailed(format!("{}: scripted page unavailable", rule.name())))?;

                let article = rule.extract(&rendered.html)?;
                self.snapshots.save("site_extracted.html", &article.body).await;
                Ok(article)
            }
            ExtractionStrategy::Readability => {
                let markup = match self.rendered(page, source, rendered, self.render_pages).await {
                    Some(rendered) => rendered,
                    None => page,
                };

                self.snapshots.save("before_readability.html", &markup.html).await;
                let article = self.extract_markup(&markup.html, &markup.url).await?;
                self.snapshots.save("after_readability.html", &article.body).await;
                Ok(article)
            }
        }
    }

    async fn rendered<'a>(
        &self, page: &PageContent, source: &dyn PageSource, cell: &'a OnceCell<Option<PageContent>>, wanted: bool,
    ) -> Option<&'a PageContent> {
        if !wanted {
            return cell.get().and_then(Option::as_ref);
        }

        cell.get_or_init(|| async {
            match source.fetch_rendered(&page.url).await {
                Ok(rendered) => Some(rendered),
                Err(e) => {
                    tracing::warn!(url = %page.url, error = %e, "scripted fetch failed, using plain markup");
                    None
                }
            }
        })
        .await
        .as_ref()
    }
}

/// Engines in preference order. Readability.js leads when the browser is
/// enabled.
pub fn engines_for(config: &AppConfig) -> Vec<Box<dyn ReadabilityEngine>> {
    let mut engines: Vec<Box<dyn ReadabilityEngine>> = Vec::with_capacity(3);
    if config.browser_enabled {
        engines.push(Box::new(ScriptReadabilityEngine::from_app(config)));
    }
    engines.push(Box::new(LectitoEngine::default()));
    engines.push(Box::new(SmoothieEngine::default()));
    engines
}
