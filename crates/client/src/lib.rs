//! Client code for webpaper.
//!
//! This crate provides the article conversion pipeline: page fetching, article
//! extraction, markup normalization and PDF rendering, tied together by
//! [`HtmlProvider`].

pub mod chain;
pub mod debug;
pub mod extract;
pub mod fetch;
pub mod filename;
pub mod normalize;
pub mod pdf;
pub mod provider;

pub use chain::FallbackChain;
pub use debug::DebugSnapshots;
pub use extract::{
    ArticleExtractor, ExtractionStrategy, LectitoEngine, ReadabilityEngine, ScriptReadabilityEngine, SiteRule,
    SmoothieEngine,
};
pub use fetch::{BrowserFetcher, FetchClient, FetchConfig, FetchResponse, PageSource, WebPageSource};
pub use filename::filename_from_title;
pub use normalize::MarkupNormalizer;
pub use pdf::{ChromePdfRenderer, DocumentRenderer, RenderSpec};
pub use provider::{HtmlProvider, ProviderOptions};
