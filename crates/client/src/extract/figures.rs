//! Image resolution inside `<figure>` elements.
//!
//! Publishers that lazy-load hide the real image in a JSON manifest, a
//! `<picture>` srcset or a `data-*` attribute. Each figure is resolved on its
//! own; a figure that cannot be resolved keeps its original markup.

use dom_query::{Document, Selection};
use serde::Deserialize;

/// Deferred-source attributes, in priority order.
const DEFERRED_SOURCE_ATTRS: &[&str] = &["data-src", "data-original-src", "src"];

/// Rewrite applied to one figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFix {
    /// Set the `src` attribute of the figure's first `<img>`.
    SetSrc(String),
    /// Replace the children of the figure's `<picture>` with a single `<img>`.
    ReplacePicture(String),
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    width: Option<u64>,
}

/// Pick the highest-resolution URL from a `data-sources` manifest.
///
/// Entries are ranked by declared `width`; without widths the last entry wins,
/// matching manifests ordered smallest first.
pub fn best_manifest_source(manifest: &str) -> Result<Option<String>, serde_json::Error> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(manifest)?;

    let best = entries
        .into_iter()
        .filter_map(|e| e.url.filter(|u| !u.trim().is_empty()).map(|u| (e.width.unwrap_or(0), u)))
        .enumerate()
        .max_by_key(|(idx, (width, _))| (*width, *idx))
        .map(|(_, (_, url))| url);

    Ok(best)
}

/// Parse `url width` candidates out of a `srcset` value.
///
/// Candidates without a `w` descriptor or with a non-numeric width are
/// skipped.
pub fn srcset_candidates(srcset: &str) -> impl Iterator<Item = (&str, u32)> {
    srcset.split(',').filter_map(|candidate| {
        let mut parts = candidate.split_whitespace();
        let url = parts.next()?;
        let descriptor = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let width = descriptor.strip_suffix('w')?.parse::<u32>().ok()?;
        Some((url, width))
    })
}

/// Widest candidate across one or more `srcset` values. Ties keep the first.
pub fn best_srcset_candidate<'a>(srcsets: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut best: Option<(&str, u32)> = None;
    for srcset in srcsets {
        for (url, width) in srcset_candidates(srcset) {
            if best.is_none_or(|(_, w)| width > w) {
                best = Some((url, width));
            }
        }
    }
    best.map(|(url, _)| url)
}

/// Decide how to fix the images of one figure.
///
/// Order: `data-sources` manifest on the figure, widest `<picture>` source,
/// first populated deferred-source attribute on the `<img>`.
pub fn resolve_figure(figure: &Selection<'_>) -> Option<ImageFix> {
    let img = figure.select("img").first();

    if let (Some(manifest), true) = (figure.attr("data-sources"), img.exists()) {
        match best_manifest_source(&manifest) {
            Ok(Some(url)) => return Some(ImageFix::SetSrc(url)),
            Ok(None) => tracing::debug!("image manifest has no usable entries"),
            Err(e) => tracing::warn!(error = %e, "failed to parse image manifest"),
        }
    }

    let picture = figure.select("picture").first();
    if picture.exists() {
        let srcsets: Vec<String> = picture
            .select("source[srcset]")
            .iter()
            .filter_map(|source| source.attr("srcset").map(|s| s.to_string()))
            .collect();
        if let Some(best) = best_srcset_candidate(srcsets.iter().map(String::as_str)) {
            return Some(ImageFix::ReplacePicture(best.to_string()));
        }
    }

    if !img.exists() {
        return None;
    }
    let current = img.attr("src").map(|s| s.trim().to_string()).unwrap_or_default();
    let (attr, value) = DEFERRED_SOURCE_ATTRS.iter().find_map(|attr| {
        img.attr(attr)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| (*attr, v))
    })?;

    if value == current {
        return None;
    }

    tracing::debug!(attr, "image source taken from deferred attribute");
    Some(ImageFix::SetSrc(value))
}

fn apply_fix(figure: &Selection<'_>, fix: &ImageFix) {
    match fix {
        ImageFix::SetSrc(src) => figure.select("img").first().set_attr("src", src),
        ImageFix::ReplacePicture(src) => {
            let picture = figure.select("picture").first();
            picture.set_html("<img>");
            picture.select("img").set_attr("src", src);
        }
    }
}

/// Resolve every figure in an HTML fragment and return the rewritten
/// fragment with the number of figures changed.
pub fn resolve_figures(fragment: &str) -> (String, usize) {
    let doc = Document::from(fragment);
    let figures = doc.select("figure");
    tracing::info!(count = figures.length(), "resolving figures");

    let mut fixed = 0;
    for figure in figures.iter() {
        match resolve_figure(&figure) {
            Some(fix) => {
                apply_fix(&figure, &fix);
                fixed += 1;
            }
            None => tracing::debug!("figure left unresolved"),
        }
    }

    (doc.select("body").inner_html().to_string(), fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_first(html: &str) -> Option<ImageFix> {
        let doc = Document::from(html);
        let figure = doc.select("figure").first();
        resolve_figure(&figure)
    }

    #[test]
    fn test_best_srcset_candidate_picks_widest() {
        let candidates = ["a.jpg 320w", "b.jpg 1280w", "c.jpg 640w"];
        assert_eq!(best_srcset_candidate(candidates), Some("b.jpg"));
    }

    #[test]
    fn test_best_srcset_candidate_single_srcset() {
        let srcset = "a.jpg 320w, b.jpg 1280w, c.jpg 640w";
        assert_eq!(best_srcset_candidate([srcset]), Some("b.jpg"));
    }

    #[test]
    fn test_srcset_skips_malformed_widths() {
        let srcset = "a.jpg widew, b.jpg 2x, c.jpg 800w, d.jpg, e.jpg 900w extra";
        let parsed: Vec<_> = srcset_candidates(srcset).collect();
        assert_eq!(parsed, vec![("c.jpg", 800)]);
    }

    #[test]
    fn test_best_srcset_candidate_none() {
        assert_eq!(best_srcset_candidate(["", "x.jpg 1.5x"]), None);
    }

    #[test]
    fn test_manifest_prefers_widest() {
        let manifest = r#"[{"url":"big.jpg","width":2000},{"url":"small.jpg","width":320}]"#;
        assert_eq!(best_manifest_source(manifest).unwrap(), Some("big.jpg".to_string()));
    }

    #[test]
    fn test_manifest_without_widths_takes_last() {
        let manifest = r#"[{"url":"one.jpg"},{"url":"two.jpg"},{"url":""}]"#;
        assert_eq!(best_manifest_source(manifest).unwrap(), Some("two.jpg".to_string()));
    }

    #[test]
    fn test_manifest_malformed() {
        assert!(best_manifest_source("{not json").is_err());
        assert_eq!(best_manifest_source("[]").unwrap(), None);
    }

    #[test]
    fn test_resolve_figure_manifest_first() {
        let fix = resolve_first(
            r#"<figure data-sources='[{"url":"https://cdn.test/hi.jpg","width":1600}]'>
                <picture><source srcset="p.jpg 800w"><img src="placeholder.gif"></picture>
            </figure>"#,
        );
        assert_eq!(fix, Some(ImageFix::SetSrc("https://cdn.test/hi.jpg".into())));
    }

    #[test]
    fn test_resolve_figure_bad_manifest_falls_through() {
        let fix = resolve_first(r#"<figure data-sources="oops"><img src="x.gif" data-src="real.jpg"></figure>"#);
        assert_eq!(fix, Some(ImageFix::SetSrc("real.jpg".into())));
    }

    #[test]
    fn test_resolve_figure_picture() {
        let fix = resolve_first(
            r#"<figure><picture>
                <source srcset="s.jpg 320w, m.jpg 640w">
                <source srcset="l.jpg 1280w">
                <img src="blank.gif">
            </picture></figure>"#,
        );
        assert_eq!(fix, Some(ImageFix::ReplacePicture("l.jpg".into())));
    }

    #[test]
    fn test_resolve_figure_deferred_attr_priority() {
        let fix =
            resolve_first(r#"<figure><img src="blank.gif" data-original-src="orig.jpg" data-src="lazy.jpg"></figure>"#);
        assert_eq!(fix, Some(ImageFix::SetSrc("lazy.jpg".into())));
    }

    #[test]
    fn test_resolve_figure_nothing_to_do() {
        assert!(resolve_first(r#"<figure><img src="plain.jpg"></figure>"#).is_none());
        assert!(resolve_first(r#"<figure><figcaption>no image</figcaption></figure>"#).is_none());
    }

    #[test]
    fn test_resolve_figures_rewrites_fragment() {
        let (html, fixed) = resolve_figures(
            r#"<div id="body"><p>A &amp; B</p><figure><img data-src="real.jpg" alt="x"></figure>
               <figure><picture><source srcset="a.jpg 100w, b.jpg 900w"></picture></figure></div>"#,
        );
        assert_eq!(fixed, 2);
        assert!(html.starts_with(r#"<div id="body">"#));
        assert!(html.contains("<p>A &amp; B</p>"));
        assert!(html.contains(r#"<picture><img src="b.jpg"></picture>"#));
        assert!(!html.contains("<source"));
        assert!(html.ends_with("</div>"));

        let reparsed = Document::from(html.as_str());
        let img = reparsed.select("img[alt]");
        assert_eq!(img.attr("src").as_deref(), Some("real.jpg"));
        assert_eq!(img.attr("alt").as_deref(), Some("x"));
    }

    #[test]
    fn test_resolve_figures_replaces_existing_src() {
        let (html, fixed) = resolve_figures(r#"<figure><img src="blank.gif" data-src="real.jpg"></figure>"#);
        assert_eq!(fixed, 1);
        assert_eq!(html.matches("src=\"real.jpg\"").count(), 1);
        assert!(!html.contains("blank.gif"));
        assert!(html.starts_with("<figure><img ") && html.ends_with("></figure>"));
    }

    #[test]
    fn test_resolve_figures_keeps_foreign_attributes() {
        let (html, _) = resolve_figures(
            r##"<div><svg viewBox="0 0 10 10"><use xlink:href="#icon"></use></svg>
               <figure><img src="blank.gif" data-src="real.jpg"></figure>
               <p>fish &amp; chips &lt;3</p></div>"##,
        );
        assert!(html.contains(r##"xlink:href="#icon""##), "{html}");
        assert!(html.contains(r#"viewBox="0 0 10 10""#), "{html}");
        assert!(html.contains("fish &amp; chips &lt;3"));
    }
}
