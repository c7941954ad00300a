//! URL helper functions

use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

lazy_static! {
    static ref SCHEME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap();
}

/// Characters escaped in generated link targets
const LINK_TARGET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`');

/// Prefix a path with the base URL. An empty base URL leaves the path as is.
///
/// # Examples
/// ```ignore
/// with_base_url("/wiki", "/css/style.css") // -> "/wiki/css/style.css"
/// with_base_url("", "css/style.css")       // -> "css/style.css"
/// ```
pub fn with_base_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.is_empty() {
        return path.to_string();
    }
    if path == base || path.starts_with(&format!("{}/", base)) {
        return path.to_string();
    }
    format!("{}/{}", base, path.trim_start_matches('/'))
}

/// Whether a link target must be left untouched by rewriting: it carries a
/// scheme (`https:`, `mailto:`), is protocol-relative, or is a bare fragment.
pub fn is_absolute_url(target: &str) -> bool {
    target.starts_with("//") || target.starts_with('#') || SCHEME.is_match(target)
}

/// Split a link target into (path, suffix) where suffix is the `?query`
/// and/or `#fragment` part, if any
pub fn split_suffix(target: &str) -> (&str, &str) {
    match target.find(['?', '#']) {
        Some(pos) => (&target[..pos], &target[pos..]),
        None => (target, ""),
    }
}

/// Escape characters that are not valid inside a link target
pub fn encode_link_target(target: &str) -> String {
    utf8_percent_encode(target, LINK_TARGET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_url() {
        assert_eq!(with_base_url("/wiki", "/css/style.css"), "/wiki/css/style.css");
        assert_eq!(with_base_url("/wiki/", "about.html"), "/wiki/about.html");
        assert_eq!(with_base_url("", "/about.html"), "/about.html");
        assert_eq!(with_base_url("/wiki", "/wiki/about.html"), "/wiki/about.html");
    }

    #[test]
    fn test_is_absolute_url() {
        assert!(is_absolute_url("https://example.com"));
        assert!(is_absolute_url("mailto:me@example.com"));
        assert!(is_absolute_url("//cdn.example.com/x.js"));
        assert!(is_absolute_url("#top"));
        assert!(!is_absolute_url("/docs/setup.html"));
        assert!(!is_absolute_url("setup.md"));
    }

    #[test]
    fn test_split_suffix() {
        assert_eq!(split_suffix("a.md#intro"), ("a.md", "#intro"));
        assert_eq!(split_suffix("a.md?x=1#y"), ("a.md", "?x=1#y"));
        assert_eq!(split_suffix("a.md"), ("a.md", ""));
    }

    #[test]
    fn test_encode_link_target() {
        assert_eq!(encode_link_target("My Page.md"), "My%20Page.md");
    }
}
