//! Document rendering.
//!
//! A [`DocumentRenderer`] turns a [`NormalizedDocument`] plus a [`RenderSpec`]
//! into a file on disk. The stylesheet and font list are replaced wholesale,
//! never merged with the defaults.

pub mod chrome;
pub mod resources;

pub use chrome::ChromePdfRenderer;
pub use resources::{rewrite_resource_urls, secure_resource_url};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use webpaper_core::{AppConfig, Error, NormalizedDocument};

/// Reading-device layout: fixed page geometry, serif body, monospace code.
pub const DEFAULT_CSS: &str = r#"
@page { size: 702px 936px; margin: 1in; }
a { color: black; }
img { display: block; margin: 0 auto; text-align: center; max-width: 70%; max-height: 300px; }
p, li { font-size: 10pt; font-family: 'EB Garamond'; hyphens: auto; text-align: justify; }
h1,h2,h3 { font-family: 'Noto Serif'; }
h1 { font-size: 26px; }
h2 { font-size: 18px; }
h3 { font-size: 14px; }
blockquote { font-style: italic; }
pre { font-family: 'Inconsolata'; padding-left: 2.5%; background: #efefef; }
code { font-family: 'Inconsolata'; font-size: .7rem; background: #efefef; }
"#;

/// Font stylesheets linked into every document.
pub const DEFAULT_FONT_URLS: &[&str] =
    &["https://fonts.googleapis.com/css2?family=EB+Garamond&family=Noto+Serif&family=Inconsolata"];

/// Errors raised while producing the output document.
#[derive(Debug, Error)]
pub enum PdfError {
    /// Failed to launch the rendering browser.
    #[error("renderer launch failed: {0}")]
    Launch(String),

    /// Document markup could not be loaded.
    #[error("document load failed: {0}")]
    Load(String),

    /// Printing to PDF failed.
    #[error("print failed: {0}")]
    Print(String),

    /// Writing the output file failed.
    #[error("output write failed: {0}")]
    Output(#[from] std::io::Error),
}

impl From<PdfError> for Error {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::Output(e) => Error::Io(e),
            other => Error::RenderFailed(other.to_string()),
        }
    }
}

/// Stylesheet and font resources for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSpec {
    /// Complete stylesheet, page geometry included.
    pub stylesheet: String,
    /// Font stylesheet URLs.
    pub font_urls: Vec<String>,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            stylesheet: DEFAULT_CSS.to_string(),
            font_urls: DEFAULT_FONT_URLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RenderSpec {
    /// Defaults, with `css_path` and `font_urls_path` replacing them when set.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut spec = Self::default();

        if let Some(path) = &config.css_path {
            spec.stylesheet = std::fs::read_to_string(path)?;
            tracing::info!(path = %path.display(), "using custom stylesheet");
        }

        if let Some(path) = &config.font_urls_path {
            spec.font_urls = parse_font_urls(&std::fs::read_to_string(path)?);
            tracing::info!(path = %path.display(), count = spec.font_urls.len(), "using custom font list");
        }

        Ok(spec)
    }
}

/// One URL per line; blank lines ignored.
pub fn parse_font_urls(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Full HTML document for `doc`: fonts linked, stylesheet inlined, resource
/// URLs secured.
pub fn build_html_shell(doc: &NormalizedDocument, spec: &RenderSpec) -> String {
    let mut html = String::with_capacity(doc.html.len() + spec.stylesheet.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", html_escape::encode_text(&doc.title)));
    for url in &spec.font_urls {
        let href = html_escape::encode_double_quoted_attribute(url);
        html.push_str(&format!("<link rel=\"stylesheet\" href=\"{}\">\n", href));
    }
    html.push_str("<style>\n");
    html.push_str(&spec.stylesheet);
    html.push_str("\n</style>\n</head>\n<body>\n");
    html.push_str(&doc.html);
    html.push_str("\n</body>\n</html>\n");

    rewrite_resource_urls(&html)
}

/// Produces the output document.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render `doc` with `spec` into `output`. Either the whole file is written
    /// or nothing is.
    async fn render(&self, doc: &NormalizedDocument, spec: &RenderSpec, output: &Path) -> Result<(), Error>;
}

/// Write `bytes` to a sibling temp file and rename it over `output`.
pub async fn write_atomically(output: &Path, bytes: &[u8]) -> Result<(), PdfError> {
    let tmp = partial_path(output);

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, output).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    output.with_file_name(format!(".{}.part", name))
}
