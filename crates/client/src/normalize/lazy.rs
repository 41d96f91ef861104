//! Text-level repair of lazily loaded images.
//!
//! Rewrites `<img src="placeholder" ... data-src="real" ...>` into
//! `<img src="real" ...>`. This is a pattern substitution over the fragment
//! text, not a tree edit, so it can miss tags with unusual attribute order or
//! quoting. Attribute runs stop at `>` and never span two tags.

use regex::Regex;
use std::sync::LazyLock;

static LAZY_IMG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img src="(?P<src>[^"]*)"(?P<rest1>[^>]*?) data-src="(?P<datasrc>[^"]*)"(?P<rest2>[^>]*)>"#)
        .expect("valid regex")
});

/// Apply the repair; returns the rewritten markup and the number of tags
/// rewritten.
pub fn fix_lazy_loading(html: &str) -> (String, usize) {
    let count = LAZY_IMG.find_iter(html).count();
    if count == 0 {
        return (html.to_string(), 0);
    }

    let fixed = LAZY_IMG.replace_all(html, r#"<img src="${datasrc}"${rest1}${rest2}>"#);
    (fixed.into_owned(), count)
}
