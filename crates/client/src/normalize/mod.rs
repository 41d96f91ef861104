//! Markup normalization.
//!
//! The extracted fragment goes HTML -> Markdown (htmd) -> HTML (pulldown-cmark).
//! The round trip limits the output to the tag vocabulary the Markdown renderer
//! emits; raw HTML blocks that survive into the Markdown are dropped on the
//! way back. Image and link destinations are resolved against the page URL.

pub mod lazy;

pub use lazy::fix_lazy_loading;

use htmd::HtmlToMarkdown;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use url::Url;
use webpaper_core::{Error, ExtractedArticle, NormalizedDocument};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe"];

/// Turns extracted fragments into sanitized, self-contained markup.
#[derive(Debug, Clone, Default)]
pub struct MarkupNormalizer {
    experimental: bool,
}

impl MarkupNormalizer {
    /// `experimental` enables the text-level lazy image repair.
    pub fn new(experimental: bool) -> Self {
        Self { experimental }
    }

    pub fn normalize(&self, article: &ExtractedArticle, base: &Url) -> Result<NormalizedDocument, Error> {
        let fragment = if self.experimental {
            let (fixed, count) = fix_lazy_loading(&article.body);
            if count > 0 {
                tracing::info!(count, "attempted to fix lazy image loading");
            }
            fixed
        } else {
            article.body.clone()
        };

        let text = to_markdown(&fragment)?;
        let markdown = with_title(&article.title, &text);
        let html = to_html(&markdown, base);

        Ok(NormalizedDocument { title: article.title.clone(), html })
    }
}

/// HTML fragment to Markdown. Links are kept inline on one line.
pub fn to_markdown(fragment: &str) -> Result<String, Error> {
    let converter = HtmlToMarkdown::builder().skip_tags(SKIPPED_TAGS.to_vec()).build();
    converter
        .convert(fragment)
        .map_err(|e| Error::RenderFailed(format!("markdown conversion failed: {}", e)))
}

/// Prefix `text` with a top-level heading holding `title`.
///
/// A leading heading that already equals the title is not repeated.
fn with_title(title: &str, text: &str) -> String {
    let title = title.trim();
    let text = text.trim_start();

    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    let body = match first.strip_prefix("# ") {
        Some(heading) if heading.trim() == title => rest.trim_start(),
        _ => text,
    };

    format!("# {}\n\n{}", title, body)
}

/// Markdown to HTML with destinations resolved against `base`.
pub fn to_html(markdown: &str, base: &Url) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let mut skipping_image = false;
    let events = Parser::new_ext(markdown, options).filter_map(|event| match event {
        Event::Html(_) | Event::InlineHtml(_) => None,
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => match resolve_image(base, &dest_url) {
            Some(resolved) => Some(Event::Start(Tag::Image { link_type, dest_url: resolved.into(), title, id })),
            None => {
                tracing::warn!(src = %dest_url, "dropping unresolvable image");
                skipping_image = true;
                None
            }
        },
        Event::End(TagEnd::Image) if skipping_image => {
            skipping_image = false;
            None
        }
        _ if skipping_image => None,
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => {
            let dest_url = resolve_link(base, dest_url);
            Some(Event::Start(Tag::Link { link_type, dest_url, title, id }))
        }
        other => Some(other),
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// Absolute form of an image reference, without a trailing `/`.
pub fn resolve_image(base: &Url, src: &str) -> Option<String> {
    let joined = base.join(src.trim()).ok()?;
    Some(joined.as_str().trim_end_matches('/').to_string())
}

fn resolve_link<'a>(base: &Url, href: CowStr<'a>) -> CowStr<'a> {
    match base.join(href.trim()) {
        Ok(url) => url.to_string().into(),
        Err(_) => href,
    }
}
