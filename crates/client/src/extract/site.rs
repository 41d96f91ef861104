//! Site-specific article extraction.
//!
//! Some publishers defeat generic readability scoring (script-rendered bodies,
//! lazy images inside `<figure>`). Each such publisher gets a [`SiteRule`] with
//! an ordered list of content containers; the first container found becomes
//! the article body and its figures are resolved with
//! [`figures`](super::figures).

use scraper::{ElementRef, Html, Selector};
use url::Url;
use webpaper_core::{Error, ExtractedArticle};

use super::figures::resolve_figures;

/// Where to look for the article body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSelector {
    /// A CSS selector; the first match wins.
    Css(&'static str),
    /// The first `tag` whose class attribute contains every needle,
    /// case-insensitively.
    ClassContainsAll { tag: &'static str, needles: &'static [&'static str] },
}

impl ContentSelector {
    fn find<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        match self {
            ContentSelector::Css(css) => {
                let selector = Selector::parse(css).ok()?;
                doc.select(&selector).next()
            }
            ContentSelector::ClassContainsAll { tag, needles } => {
                let selector = Selector::parse(tag).ok()?;
                doc.select(&selector).find(|el| {
                    el.value()
                        .attr("class")
                        .map(str::to_lowercase)
                        .is_some_and(|class| needles.iter().all(|n| class.contains(n)))
                })
            }
        }
    }
}

const WIRED_SELECTORS: &[ContentSelector] = &[
    ContentSelector::Css("div.body__inner-container"),
    ContentSelector::Css("article"),
    ContentSelector::Css("div.article-body"),
    ContentSelector::ClassContainsAll { tag: "div", needles: &["article", "body"] },
];

/// Publishers with bespoke extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteRule {
    Wired,
}

impl SiteRule {
    /// The rule that applies to `url`, if any.
    pub fn for_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_ascii_lowercase();
        if host == "wired.com" || host.ends_with(".wired.com") {
            return Some(SiteRule::Wired);
        }
        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            SiteRule::Wired => "wired",
        }
    }

    /// Content containers, most specific first.
    pub fn content_selectors(&self) -> &'static [ContentSelector] {
        match self {
            SiteRule::Wired => WIRED_SELECTORS,
        }
    }

    fn fallback_title(&self) -> &'static str {
        match self {
            SiteRule::Wired => "Wired Article",
        }
    }

    /// Extract the article from fully materialized page markup.
    ///
    /// The result is `<article><h1>title</h1>container</article>`, with figure
    /// images resolved inside the container.
    pub fn extract(&self, html: &str) -> Result<ExtractedArticle, Error> {
        let doc = Html::parse_document(html);

        let title = first_heading(&doc).unwrap_or_else(|| {
            tracing::info!(site = self.name(), "no title heading found");
            self.fallback_title().to_string()
        });

        let (idx, container) = self
            .content_selectors()
            .iter()
            .enumerate()
            .find_map(|(idx, selector)| selector.find(&doc).map(|el| (idx, el)))
            .ok_or_else(|| Error::ExtractFailed(format!("{}: no content container found", self.name())))?;

        tracing::info!(site = self.name(), selector = ?self.content_selectors()[idx], "found content container");

        if !has_content(container) {
            return Err(Error::ExtractFailed(format!("{}: content container is empty", self.name())));
        }

        let (container_html, fixed) = resolve_figures(&container.html());
        tracing::debug!(site = self.name(), fixed, "figures resolved");
        let body = format!("<article><h1>{}</h1>{}</article>", html_escape::encode_text(&title), container_html);

        Ok(ExtractedArticle::new(title, body))
    }
}

fn first_heading(doc: &Html) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;
    let heading = doc.select(&selector).next()?;
    let text = heading.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn has_content(el: ElementRef<'_>) -> bool {
    el.children()
        .any(|child| child.value().is_element() || child.value().as_text().is_some_and(|t| !t.trim().is_empty()))
}
