//! Data carried between pipeline stages.

use url::Url;

/// Raw page markup and the URL it was fetched from.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// URL the markup belongs to (after redirects).
    pub url: Url,
    /// Raw markup as served or as materialized by the browser.
    pub html: String,
}

impl PageContent {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self { url, html: html.into() }
    }
}

/// Title and body fragment of an article.
///
/// `body` is a markup fragment rooted at the detected article container, not a
/// full document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    /// Article title.
    pub title: String,
    /// Article body fragment.
    pub body: String,
}

impl ExtractedArticle {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into() }
    }
}

/// Sanitized markup ready for rendering.
///
/// Starts with a top-level heading holding the title, and every image source
/// is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    /// Article title, repeated from the leading heading.
    pub title: String,
    /// Sanitized markup.
    pub html: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_content_new() {
        let url = Url::parse("https://example.com/post").unwrap();
        let page = PageContent::new(url.clone(), "<html></html>");
        assert_eq!(page.url, url);
        assert_eq!(page.html, "<html></html>");
    }

    #[test]
    fn test_extracted_article_new() {
        let article = ExtractedArticle::new("Title", "<p>body</p>");
        assert_eq!(article.title, "Title");
        assert_eq!(article.body, "<p>body</p>");
    }
}
