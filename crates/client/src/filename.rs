//! Output filenames from article titles.

use unicode_normalization::UnicodeNormalization;

/// Extension of rendered documents.
pub const EXTENSION: &str = "pdf";

const FALLBACK_STEM: &str = "Untitled";

/// Words left lowercase inside a title.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "nor", "of", "on", "or", "per", "the", "to", "v",
    "via", "vs",
];

/// `A Study: Of Things` -> `A_Study_Of_Things.pdf`.
///
/// ASCII only, title-cased, underscore-joined.
pub fn filename_from_title(title: &str) -> String {
    let ascii = transliterate(title);
    let titled = titlecase(&ascii);

    let cleaned: String = titled
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ' ') { c } else { ' ' })
        .collect();

    let stem = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let stem = stem.trim_matches(|c| c == '_' || c == '.');

    if stem.is_empty() {
        format!("{}.{}", FALLBACK_STEM, EXTENSION)
    } else {
        format!("{}.{}", stem, EXTENSION)
    }
}

/// Compatibility decomposition, then drop everything outside ASCII.
fn transliterate(text: &str) -> String {
    text.nfkd().filter(char::is_ascii).collect()
}

/// Capitalize each word; small words stay lowercase except at the start and
/// right after a colon.
fn titlecase(text: &str) -> String {
    let mut out = Vec::new();
    let mut force = true;

    for word in text.split_whitespace() {
        let bare = word.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_ascii_lowercase();
        let small = SMALL_WORDS.contains(&bare.as_str());

        let titled = if small && !force { word.to_ascii_lowercase() } else { capitalize(word) };
        out.push(titled);

        force = word.ends_with(':');
    }

    out.join(" ")
}

/// Uppercase the first letter; words with inner capitals (`iPhone`) are kept.
fn capitalize(word: &str) -> String {
    if word.chars().skip(1).any(|c| c.is_ascii_uppercase()) {
        return word.to_string();
    }

    let mut chars = word.chars();
    let mut out = String::with_capacity(word.len());
    for c in chars.by_ref() {
        if c.is_ascii_alphabetic() {
            out.push(c.to_ascii_uppercase());
            break;
        }
        out.push(c);
    }
    out.extend(chars);
    out
}
