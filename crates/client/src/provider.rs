//! HTML article provider.
//!
//! Orchestrates fetch -> extract -> normalize -> render for one article URL.
//! A provider instance remembers the last extracted article, so deriving the
//! filename and producing the document fetch and extract only once. Use a
//! fresh instance per conversion. [`HtmlProvider::run`] never overwrites an
//! existing file.

use std::path::{Path, PathBuf};

use url::Url;
use webpaper_core::{AppConfig, Error, ExtractedArticle};

use crate::debug::DebugSnapshots;
use crate::extract::ArticleExtractor;
use crate::fetch::{PageSource, WebPageSource, canonicalize, parse_absolute};
use crate::filename::{EXTENSION, filename_from_title};
use crate::normalize::MarkupNormalizer;
use crate::pdf::{ChromePdfRenderer, DocumentRenderer, RenderSpec};

/// Caller-tunable parts of a conversion.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Stylesheet and fonts for the output document.
    pub render: RenderSpec,
    /// Enables the text-level lazy image repair.
    pub experimental: bool,
    /// Where intermediate markup goes, if anywhere.
    pub snapshots: DebugSnapshots,
}

impl ProviderOptions {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self {
            render: RenderSpec::from_config(config)?,
            experimental: config.experimental,
            snapshots: DebugSnapshots::new(config.debug, &config.debug_dir),
        })
    }
}

#[derive(Debug, Clone)]
struct CachedArticle {
    /// URL the article was requested for.
    requested: Url,
    /// URL the markup came from; base for relative references.
    base: Url,
    article: ExtractedArticle,
}

/// Converts web articles into rendered documents.
pub struct HtmlProvider<S, R> {
    source: S,
    renderer: R,
    extractor: ArticleExtractor,
    normalizer: MarkupNormalizer,
    options: ProviderOptions,
    cached: Option<CachedArticle>,
}

impl HtmlProvider<WebPageSource, ChromePdfRenderer> {
    /// Network fetchers and the Chrome PDF renderer, configured from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self::new(
            WebPageSource::from_config(config)?,
            ChromePdfRenderer::from_app(config),
            ArticleExtractor::from_app(config),
            ProviderOptions::from_app(config)?,
        ))
    }
}

impl<S: PageSource, R: DocumentRenderer> HtmlProvider<S, R> {
    pub fn new(source: S, renderer: R, extractor: ArticleExtractor, options: ProviderOptions) -> Self {
        let normalizer = MarkupNormalizer::new(options.experimental);
        Self { source, renderer, extractor, normalizer, options, cached: None }
    }

    /// The article extracted by an earlier call, if any.
    pub fn cached_article(&self) -> Option<&ExtractedArticle> {
        self.cached.as_ref().map(|c| &c.article)
    }

    /// Output filename for the article at `url`, from its title.
    ///
    /// Fetches and extracts the article and keeps it for [`produce`](Self::produce).
    pub async fn derive_filename(&mut self, url: &str) -> Result<String, Error> {
        let url = parse_url(url)?;
        let article = self.article(&url).await?;

        let name = filename_from_title(&article.article.title);
        tracing::info!(%url, filename = %name, "derived filename");
        Ok(name)
    }

    /// Render the article at `url` into `output`.
    pub async fn produce(&mut self, url: &str, output: &Path) -> Result<(), Error> {
        let url = parse_url(url)?;
        let CachedArticle { base, article, .. } = self.article(&url).await?;

        let doc = self.normalizer.normalize(&article, &base)?;
        self.options.snapshots.save("paper.html", &doc.html).await;

        self.renderer.render(&doc, &self.options.render, output).await
    }

    /// Whether `url` is well-formed and served as HTML. Never fails; any probe
    /// error counts as `false`.
    pub async fn validate(&self, url: &str) -> bool {
        let url = match parse_absolute(url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(input = url, error = %e, "rejecting malformed url");
                return false;
            }
        };

        match self.source.content_type(&url).await {
            Ok(Some(content_type)) => is_html(&content_type),
            Ok(None) => {
                tracing::debug!(%url, "no content type reported");
                false
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "content type probe failed");
                false
            }
        }
    }

    /// Produce the document into `output_dir` and return the written path.
    ///
    /// The file is named `filename` when given, otherwise after the article
    /// title. While the name is taken, `_` is appended to the stem.
    pub async fn run(&mut self, url: &str, output_dir: &Path, filename: Option<&str>) -> Result<PathBuf, Error> {
        let name = match filename {
            Some(name) => name.to_string(),
            None => self.derive_filename(url).await?,
        };
        let output = free_path(output_dir.join(name)).await?;
        self.produce(url, &output).await?;
        Ok(output)
    }

    async fn article(&mut self, url: &Url) -> Result<CachedArticle, Error> {
        if let Some(cached) = self.cached.as_ref().filter(|c| &c.requested == url) {
            tracing::debug!(%url, "using cached article");
            return Ok(cached.clone());
        }

        let page = self.source.fetch(url).await?;
        let article = self.extractor.extract(&page, &self.source).await?;

        let cached = CachedArticle { requested: url.clone(), base: page.url, article };
        self.cached = Some(cached.clone());
        Ok(cached)
    }
}

/// First of `path`, `stem_.pdf`, `stem__.pdf`, ... that does not exist yet.
async fn free_path(mut path: PathBuf) -> Result<PathBuf, Error> {
    while tokio::fs::try_exists(&path).await? {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        tracing::debug!(taken = %path.display(), "output file exists");
        path.set_file_name(format!("{}_.{}", stem, EXTENSION));
    }
    Ok(path)
}

fn parse_url(input: &str) -> Result<Url, Error> {
    canonicalize(input).map_err(|e| Error::InvalidUrl(e.to_string()))
}

fn is_html(content_type: &str) -> bool {
    content_type.trim_start().to_ascii_lowercase().starts_with("text/html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ReadabilityEngine;
    use async_trait::async_trait;
    use regex::Regex;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use webpaper_core::{NormalizedDocument, PageContent};

    struct FakeSource {
        html: String,
        content_type: Result<Option<String>, ()>,
        fetches: AtomicUsize,
        probes: AtomicUsize,
    }

    impl FakeSource {
        fn new(html: &str) -> Self {
            Self {
                html: html.to_string(),
                content_type: Ok(Some("text/html; charset=utf-8".into())),
                fetches: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
            }
        }

        fn with_content_type(content_type: Result<Option<&str>, ()>) -> Self {
            Self { content_type: content_type.map(|ct| ct.map(str::to_string)), ..Self::new("") }
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch(&self, url: &Url) -> Result<PageContent, Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(PageContent::new(url.clone(), self.html.clone()))
        }

        async fn fetch_rendered(&self, _url: &Url) -> Result<PageContent, Error> {
            Err(Error::BrowserDisabled)
        }

        async fn content_type(&self, _url: &Url) -> Result<Option<String>, Error> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.content_type.clone().map_err(|_| Error::FetchTimeout("probe".into()))
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        received: Mutex<Vec<NormalizedDocument>>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentRenderer for RecordingRenderer {
        async fn render(&self, doc: &NormalizedDocument, _spec: &RenderSpec, output: &Path) -> Result<(), Error> {
            self.received.lock().unwrap().push(doc.clone());
            if self.fail {
                return Err(Error::RenderFailed("layout failed".into()));
            }
            std::fs::write(output, b"%PDF-1.4")?;
            Ok(())
        }
    }

    struct CannedEngine(ExtractedArticle);

    #[async_trait]
    impl ReadabilityEngine for CannedEngine {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn extract(&self, _html: &str, _url: &Url) -> Result<ExtractedArticle, Error> {
            Ok(self.0.clone())
        }
    }

    /// Titles each article after the last path segment of its URL.
    struct PathTitleEngine;

    #[async_trait]
    impl ReadabilityEngine for PathTitleEngine {
        fn name(&self) -> &'static str {
            "path-title"
        }

        async fn extract(&self, _html: &str, url: &Url) -> Result<ExtractedArticle, Error> {
            let segment = url.path().trim_start_matches('/');
            Ok(ExtractedArticle::new(format!("Page {segment}"), format!("<p>{segment}</p>")))
        }
    }

    fn provider(
        source: FakeSource, renderer: RecordingRenderer, article: ExtractedArticle,
    ) -> HtmlProvider<FakeSource, RecordingRenderer> {
        let extractor = ArticleExtractor::new(vec![Box::new(CannedEngine(article))], false, DebugSnapshots::disabled());
        HtmlProvider::new(source, renderer, extractor, ProviderOptions::default())
    }

    fn fixed_article() -> ExtractedArticle {
        ExtractedArticle::new("T", r#"<article><h1>T</h1><p>body</p><img src="img/x.png" alt="x"></article>"#)
    }

    #[tokio::test]
    async fn test_validate_rejects_malformed_url() {
        let p = provider(FakeSource::new(""), RecordingRenderer::default(), fixed_article());
        assert!(!p.validate("not a url").await);
        assert!(!p.validate("ftp://example.com/file").await);
        assert!(!p.validate("").await);
        assert_eq!(p.source.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validate_checks_content_type() {
        let html = provider(
            FakeSource::with_content_type(Ok(Some("text/html; charset=utf-8"))),
            RecordingRenderer::default(),
            fixed_article(),
        );
        assert!(html.validate("https://example.com/post").await);

        let pdf = provider(
            FakeSource::with_content_type(Ok(Some("application/pdf"))),
            RecordingRenderer::default(),
            fixed_article(),
        );
        assert!(!pdf.validate("https://example.com/paper.pdf").await);
    }

    #[tokio::test]
    async fn test_validate_probe_failure_is_false() {
        let failing =
            provider(FakeSource::with_content_type(Err(())), RecordingRenderer::default(), fixed_article());
        assert!(!failing.validate("https://example.com/post").await);

        let missing =
            provider(FakeSource::with_content_type(Ok(None)), RecordingRenderer::default(), fixed_article());
        assert!(!missing.validate("https://example.com/post").await);
    }

    #[tokio::test]
    async fn test_derive_filename() {
        let article = ExtractedArticle::new("A Study: Of Things", "<p>body</p>");
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), article);

        let name = p.derive_filename("https://example.com/study").await.unwrap();
        assert_eq!(name, "A_Study_Of_Things.pdf");
        assert!(p.renderer.received.lock().unwrap().is_empty());
        assert_eq!(p.cached_article().map(|a| a.title.as_str()), Some("A Study: Of Things"));
    }

    #[tokio::test]
    async fn test_produce_reuses_cached_article() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), fixed_article());

        p.derive_filename("https://x.test/").await.unwrap();
        p.produce("https://x.test/", &dir.path().join("T.pdf")).await.unwrap();

        assert_eq!(p.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_produce_other_url_extracts_again() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ArticleExtractor::new(vec![Box::new(PathTitleEngine)], false, DebugSnapshots::disabled());
        let mut p = HtmlProvider::new(
            FakeSource::new("<html></html>"),
            RecordingRenderer::default(),
            extractor,
            ProviderOptions::default(),
        );

        let name = p.derive_filename("https://x.test/alpha").await.unwrap();
        assert_eq!(name, "Page_Alpha.pdf");
        p.produce("https://x.test/beta", &dir.path().join("B.pdf")).await.unwrap();

        assert_eq!(p.source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(p.renderer.received.lock().unwrap()[0].title, "Page beta");
        assert_eq!(p.cached_article().map(|a| a.title.as_str()), Some("Page beta"));
    }

    #[tokio::test]
    async fn test_produce_without_cache_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), fixed_article());

        p.produce("https://x.test/", &dir.path().join("T.pdf")).await.unwrap();

        assert_eq!(p.source.fetches.load(Ordering::SeqCst), 1);
        assert!(p.cached_article().is_some());
    }

    #[tokio::test]
    async fn test_renderer_receives_absolute_urls_and_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), fixed_article());

        p.produce("https://x.test/", &dir.path().join("T.pdf")).await.unwrap();

        let received = p.renderer.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let doc = &received[0];
        assert!(doc.html.starts_with("<h1>T</h1>"), "got: {}", doc.html);

        let refs = Regex::new(r#"(?:src|href)="([^"]*)""#).unwrap();
        let found: Vec<_> = refs.captures_iter(&doc.html).map(|c| c[1].to_string()).collect();
        assert_eq!(found, vec!["https://x.test/img/x.png"]);
        for url in found {
            assert!(Url::parse(&url).is_ok(), "relative reference: {url}");
        }
    }

    #[tokio::test]
    async fn test_run_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let article = ExtractedArticle::new("A Study: Of Things", "<p>body</p>");
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), article);

        let path = p.run("https://example.com/study", dir.path(), None).await.unwrap();

        assert_eq!(path, dir.path().join("A_Study_Of_Things.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        assert_eq!(p.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_twice_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let article = ExtractedArticle::new("A Study: Of Things", "<p>body</p>");
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), article);

        let first = p.run("https://example.com/study", dir.path(), None).await.unwrap();
        let second = p.run("https://example.com/study", dir.path(), None).await.unwrap();
        let third = p.run("https://example.com/study", dir.path(), None).await.unwrap();

        assert_eq!(first, dir.path().join("A_Study_Of_Things.pdf"));
        assert_eq!(second, dir.path().join("A_Study_Of_Things_.pdf"));
        assert_eq!(third, dir.path().join("A_Study_Of_Things__.pdf"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_run_with_caller_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mine.pdf"), b"keep me").unwrap();
        let mut p = provider(FakeSource::new("<html></html>"), RecordingRenderer::default(), fixed_article());

        let path = p.run("https://x.test/", dir.path(), Some("mine.pdf")).await.unwrap();

        assert_eq!(path, dir.path().join("mine_.pdf"));
        assert_eq!(std::fs::read(dir.path().join("mine.pdf")).unwrap(), b"keep me");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        assert_eq!(p.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = RecordingRenderer { fail: true, ..Default::default() };
        let mut p = provider(FakeSource::new("<html></html>"), renderer, fixed_article());

        let output = dir.path().join("T.pdf");
        let err = p.produce("https://x.test/", &output).await.unwrap_err();

        assert_eq!(err.kind(), webpaper_core::ErrorKind::Render);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_invalid_url_is_input_error() {
        let mut p = provider(FakeSource::new(""), RecordingRenderer::default(), fixed_article());
        let err = p.derive_filename("ftp://example.com/x").await.unwrap_err();
        assert_eq!(err.kind(), webpaper_core::ErrorKind::Input);
        assert_eq!(p.source.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("Text/HTML; charset=UTF-8"));
        assert!(!is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
    }
}
