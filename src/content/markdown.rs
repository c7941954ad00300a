//! Markdown rendering with inline page links and syntax highlighting
//!
//! On top of standard Markdown the converter understands `[[target]]` and
//! `[[target|label]]` page links, and rewrites every relative link target so
//! that it points at the published page: the source extension is swapped for
//! the published one and the site base URL is prefixed.

use lazy_static::lazy_static;
use pulldown_cmark::{
    html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use regex::Regex;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::helpers::{encode_link_target, is_absolute_url, split_suffix, with_base_url};

lazy_static! {
    static ref PAGE_LINK: Regex =
        Regex::new(r"\[\[([^\[\]|\n]+?)(?:\|([^\[\]\n]+?))?\]\]").unwrap();
}

/// Settings that make the conversion deterministic
#[derive(Debug, Clone)]
pub struct MarkupOptions {
    /// Prefix for rewritten link targets; empty for none
    pub base_url: String,
    /// Source extensions recognized in link targets; the first one is
    /// appended to `[[target]]` links that carry no extension
    pub source_extensions: Vec<String>,
    /// Extension of the published pages
    pub published_extension: String,
    /// Highlight fenced code blocks
    pub highlight: bool,
    pub theme: String,
    pub line_numbers: bool,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            source_extensions: vec!["md".to_string(), "markdown".to_string()],
            published_extension: "html".to_string(),
            highlight: true,
            theme: "base16-ocean.dark".to_string(),
            line_numbers: false,
        }
    }
}

/// Markdown to HTML converter
pub struct MarkupConverter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    options: MarkupOptions,
}

impl MarkupConverter {
    /// Create a converter with the given options
    pub fn new(options: MarkupOptions) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            options,
        }
    }

    /// Render arbitrary bytes; invalid UTF-8 is replaced rather than rejected
    pub fn render_bytes(&self, bytes: &[u8]) -> String {
        self.render(&String::from_utf8_lossy(bytes))
    }

    /// Render markdown to HTML. Never fails: anything the parser does not
    /// understand comes out as text.
    pub fn render(&self, markdown: &str) -> String {
        // Front matter is handled by the header parser, so no metadata blocks here
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES
            | Options::ENABLE_DEFINITION_LIST
            | Options::ENABLE_GFM;
        let parser = TextMergeStream::new(Parser::new_ext(markdown, options));

        let mut events: Vec<Event> = Vec::new();
        let mut code_block: Option<(Option<String>, String)> = None;
        let mut in_plain_code = false;
        let mut link_depth = 0usize;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    if self.options.highlight {
                        let lang = match kind {
                            CodeBlockKind::Fenced(lang) => {
                                let lang = lang.split_whitespace().next().unwrap_or("").to_string();
                                (!lang.is_empty()).then_some(lang)
                            }
                            CodeBlockKind::Indented => None,
                        };
                        code_block = Some((lang, String::new()));
                    } else {
                        in_plain_code = true;
                        events.push(Event::Start(Tag::CodeBlock(kind)));
                    }
                }
                Event::End(TagEnd::CodeBlock) => match code_block.take() {
                    Some((lang, code)) => {
                        let highlighted = self.highlight_code(&code, lang.as_deref());
                        events.push(Event::Html(CowStr::from(highlighted)));
                    }
                    None => {
                        in_plain_code = false;
                        events.push(Event::End(TagEnd::CodeBlock));
                    }
                },
                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, code)) = code_block.as_mut() {
                        code.push_str(&text);
                    }
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    link_depth += 1;
                    events.push(Event::Start(Tag::Link {
                        link_type,
                        dest_url: CowStr::from(self.rewrite_target(&dest_url)),
                        title,
                        id,
                    }));
                }
                Event::End(TagEnd::Link) => {
                    link_depth = link_depth.saturating_sub(1);
                    events.push(Event::End(TagEnd::Link));
                }
                Event::Text(text) if link_depth == 0 && !in_plain_code => {
                    self.expand_page_links(text, &mut events);
                }
                other => events.push(other),
            }
        }

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    /// Replace `[[target|label]]` occurrences in a text run with links
    fn expand_page_links<'a>(&self, text: CowStr<'a>, events: &mut Vec<Event<'a>>) {
        if !text.contains("[[") {
            events.push(Event::Text(text));
            return;
        }

        let mut last = 0;
        for caps in PAGE_LINK.captures_iter(&text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let target = caps[1].trim();
            if target.is_empty() {
                continue;
            }
            if whole.start() > last {
                events.push(Event::Text(CowStr::from(text[last..whole.start()].to_string())));
            }

            let label = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| default_label(target));

            events.push(Event::Start(Tag::Link {
                link_type: LinkType::Inline,
                dest_url: CowStr::from(self.resolve_page_link(target)),
                title: CowStr::Borrowed(""),
                id: CowStr::Borrowed(""),
            }));
            events.push(Event::Text(CowStr::from(label)));
            events.push(Event::End(TagEnd::Link));
            last = whole.end();
        }

        if last == 0 {
            events.push(Event::Text(text));
        } else if last < text.len() {
            events.push(Event::Text(CowStr::from(text[last..].to_string())));
        }
    }

    /// Resolve a `[[target]]` against source files, then rewrite it like any
    /// other link
    fn resolve_page_link(&self, target: &str) -> String {
        let (path, suffix) = split_suffix(target);
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        let source_ext = self.options.source_extensions.first();

        let path = match source_ext {
            Some(ext) if !path.is_empty() && !last_segment.contains('.') => {
                format!("{}.{}", path, ext)
            }
            _ => path.to_string(),
        };
        self.rewrite_target(&encode_link_target(&format!("{}{}", path, suffix)))
    }

    /// Point a link at the published page: swap a source extension for the
    /// published one and prefix the base URL. Absolute targets are untouched.
    pub fn rewrite_target(&self, target: &str) -> String {
        if target.is_empty() || is_absolute_url(target) {
            return target.to_string();
        }
        let (path, suffix) = split_suffix(target);
        if path.is_empty() {
            return target.to_string();
        }

        let lower = path.to_ascii_lowercase();
        let published = self
            .options
            .source_extensions
            .iter()
            .find(|ext| lower.ends_with(&format!(".{}", ext.to_ascii_lowercase())))
            .map(|ext| {
                format!(
                    "{}.{}",
                    &path[..path.len() - ext.len() - 1],
                    self.options.published_extension
                )
            })
            .unwrap_or_else(|| path.to_string());

        format!("{}{}", with_base_url(&self.options.base_url, &published), suffix)
    }

    /// Highlight a code block
    fn highlight_code(&self, code: &str, lang: Option<&str>) -> String {
        let lang = lang.unwrap_or("text");

        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let theme = self
            .theme_set
            .themes
            .get(&self.options.theme)
            .or_else(|| self.theme_set.themes.values().next());

        let highlighted = theme.and_then(|theme| {
            highlighted_html_for_string(code, &self.syntax_set, syntax, theme).ok()
        });

        match highlighted {
            Some(highlighted) if self.options.line_numbers => {
                self.add_line_numbers(&highlighted, lang)
            }
            Some(highlighted) => format!(
                r#"<figure class="highlight {}">{}</figure>"#,
                lang, highlighted
            ),
            None => format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                lang,
                html_escape(code)
            ),
        }
    }

    /// Add line numbers to highlighted code
    fn add_line_numbers(&self, code: &str, lang: &str) -> String {
        let lines: Vec<&str> = code.lines().collect();
        let gutter = (1..=lines.len())
            .map(|i| format!(r#"<span class="line-number">{}</span>"#, i))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<figure class="highlight {}"><table><tr><td class="gutter"><pre>{}</pre></td><td class="code"><pre>{}</pre></td></tr></table></figure>"#,
            lang,
            gutter,
            lines.join("\n")
        )
    }
}

impl Default for MarkupConverter {
    fn default() -> Self {
        Self::new(MarkupOptions::default())
    }
}

/// Last path segment of a link target, fragment and query removed
fn default_label(target: &str) -> String {
    let (path, _) = split_suffix(target);
    let path = path.trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Simple HTML escaping
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(base_url: &str) -> MarkupConverter {
        MarkupConverter::new(MarkupOptions {
            base_url: base_url.to_string(),
            highlight: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_render_basic_markdown() {
        let html = converter("").render("# Hello World\n\nThis is a test.");
        assert!(html.contains("<h1>Hello World</h1>"));
        assert!(html.contains("<p>This is a test.</p>"));
    }

    #[test]
    fn test_render_code_block() {
        let renderer = MarkupConverter::default();
        let html = renderer.render("```rust\nfn main() {}\n```");
        assert!(html.contains("highlight"));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_page_link_uses_trailing_segment_as_label() {
        let html = converter("").render("See [[docs/setup#install]].");
        assert!(
            html.contains(r#"<a href="docs/setup.html#install">setup</a>"#),
            "{}",
            html
        );
    }

    #[test]
    fn test_page_link_with_label() {
        let html = converter("/wiki").render("Go [[guide|the guide]] now");
        assert!(
            html.contains(r#"<a href="/wiki/guide.html">the guide</a>"#),
            "{}",
            html
        );
        assert!(html.contains("Go "));
        assert!(html.contains(" now"));
    }

    #[test]
    fn test_page_link_keeps_explicit_extension() {
        let html = converter("").render("[[files/report.pdf]]");
        assert!(html.contains(r#"href="files/report.pdf""#), "{}", html);
        assert!(html.contains(">report.pdf</a>"));
    }

    #[test]
    fn test_page_link_encodes_spaces() {
        let html = converter("").render("[[My Page]]");
        assert!(html.contains(r#"href="My%20Page.html""#), "{}", html);
        assert!(html.contains(">My Page</a>"));
    }

    #[test]
    fn test_page_links_ignored_in_code() {
        let html = converter("").render("`[[not a link]]`\n\n```\n[[nor this]]\n```\n");
        assert!(!html.contains("<a "), "{}", html);
        assert!(html.contains("[[not a link]]"));
        assert!(html.contains("[[nor this]]"));
    }

    #[test]
    fn test_standard_links_are_rewritten() {
        let html = converter("/base").render("[a](other.md#top) [b](https://x.org/a.md) [c](#here)");
        assert!(html.contains(r#"href="/base/other.html#top""#), "{}", html);
        assert!(html.contains(r#"href="https://x.org/a.md""#));
        assert!(html.contains(r##"href="#here""##));
    }

    #[test]
    fn test_rewrite_without_base_url_is_extension_only() {
        let c = converter("");
        assert_eq!(c.rewrite_target("/docs/a.MD"), "/docs/a.html");
        assert_eq!(c.rewrite_target("img/logo.png"), "img/logo.png");
        assert_eq!(c.rewrite_target("notes.markdown?v=1"), "notes.html?v=1");
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let c = converter("/b");
        let alphabet = b"[]|#*_`<>&\n\r\t -:!()\\{}abc\xff\xfe\xc3";
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        for len in 0..200usize {
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    alphabet[(state % alphabet.len() as u64) as usize]
                })
                .collect();
            let _ = c.render_bytes(&bytes);
        }
    }

    #[test]
    fn test_plain_text_passes_through() {
        let html = converter("").render("just words");
        assert_eq!(html, "<p>just words</p>\n");
    }
}
