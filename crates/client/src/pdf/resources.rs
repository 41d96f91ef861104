//! Resource URL hook.
//!
//! Protocol-relative references (`//host/path`) and local file references
//! (`file:///host/path`) are redirected to `https://` before the renderer
//! fetches them.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static RESOURCE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<lead>\s)(?P<attr>src|href|srcset)\s*=\s*"(?P<value>[^"]*)""#).expect("valid regex")
});

/// Secure form of a resource URL; other URLs are returned unchanged.
pub fn secure_resource_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("file:///") {
        format!("https://{}", rest)
    } else {
        url.to_string()
    }
}

/// Apply [`secure_resource_url`] to every `src`, `href` and `srcset`
/// attribute in `html`.
pub fn rewrite_resource_urls(html: &str) -> String {
    RESOURCE_ATTR
        .replace_all(html, |caps: &Captures<'_>| {
            let attr = &caps["attr"];
            let value = &caps["value"];
            let value = if attr == "srcset" { rewrite_srcset(value) } else { secure_resource_url(value) };
            format!(r#"{}{}="{}""#, &caps["lead"], attr, value)
        })
        .into_owned()
}

fn rewrite_srcset(srcset: &str) -> String {
    srcset
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            match candidate.split_once(char::is_whitespace) {
                Some((url, descriptor)) => format!("{} {}", secure_resource_url(url), descriptor.trim()),
                None => secure_resource_url(candidate),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
