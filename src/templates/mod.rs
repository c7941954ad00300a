//! Template rendering with Tera
//!
//! Every render builds a fresh Tera instance holding the page template and
//! the includes it references, so rendering never depends on shared mutable
//! state. Three roots are visible to templates: `page` (the header fields of
//! the page being rendered), `site` (configuration plus the data namespace)
//! and, inside layouts, `layout` (the layout's own header fields). Member
//! access ignores case on every variable.

mod includes;
pub mod layout;

pub use layout::{Layout, LayoutComposer, MAX_LAYOUT_DEPTH};

use std::collections::HashMap;
use std::sync::Arc;
use tera::{Context, Tera};

use crate::error::{Error, Result};
use crate::helpers::with_base_url;
use crate::storage::{Storage, INCLUDES_DIR};
use crate::value::{Fields, Value};

/// Evaluation state for a single render.
///
/// A context belongs to exactly one render call; layouts get a fresh one
/// built with [`RenderContext::for_layout`].
#[derive(Debug, Clone)]
pub struct RenderContext {
    page: Fields,
    site: Arc<Value>,
    layout: Option<Fields>,
    body: Option<String>,
}

impl RenderContext {
    /// Context for rendering a page body
    pub fn new(page: Fields, site: Arc<Value>) -> Self {
        Self {
            page,
            site,
            layout: None,
            body: None,
        }
    }

    /// Header fields of the page being rendered
    pub fn page(&self) -> &Fields {
        &self.page
    }

    pub fn site(&self) -> &Arc<Value> {
        &self.site
    }

    /// Header fields of the layout being rendered, if any
    pub fn layout(&self) -> Option<&Fields> {
        self.layout.as_ref()
    }

    /// Body exposed through `render_body()`, set only for layouts
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Fresh context for one layout level: same page and site, the layout's
    /// own fields, and the text rendered so far as the body
    pub fn for_layout(&self, layout: Fields, body: String) -> Self {
        Self {
            page: self.page.clone(),
            site: Arc::clone(&self.site),
            layout: Some(layout),
            body: Some(body),
        }
    }

    fn to_tera(&self) -> Context {
        let mut context = Context::new();
        context.insert("page", &self.page.to_template_json());
        context.insert("site", &self.site.to_template_json());
        if let Some(layout) = &self.layout {
            context.insert("layout", &layout.to_template_json());
        }
        context
    }
}

/// Renders page, layout and include templates against a [`RenderContext`]
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    storage: Storage,
    base_url: String,
}

impl TemplateRenderer {
    pub fn new(storage: Storage, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            base_url: base_url.into(),
        }
    }

    /// Render `content` with the page's header fields and the site namespace.
    ///
    /// Returns the rendered text together with the context it was rendered
    /// in, which later pipeline steps (layout composition) build upon.
    pub async fn render(
        &self,
        name: &str,
        content: &str,
        fields: Fields,
        site: Arc<Value>,
    ) -> Result<(String, RenderContext)> {
        let context = RenderContext::new(fields, site);
        let text = self.render_with(name, content, &context).await?;
        Ok((text, context))
    }

    /// Render `content` in an existing context. `name` identifies the
    /// template in error messages.
    pub async fn render_with(
        &self,
        name: &str,
        content: &str,
        context: &RenderContext,
    ) -> Result<String> {
        if !has_template_syntax(content) {
            return Ok(content.to_string());
        }

        let source = includes::prepare_source(content);
        let includes = includes::load_includes(&self.storage, &source).await?;

        let mut tera = Tera::default();
        // Output is HTML written by the site author; nothing is escaped
        tera.autoescape_on(vec![]);

        for (include, text) in &includes {
            tera.add_raw_template(include, text)
                .map_err(|e| Error::TemplateSyntax {
                    name: format!("{}/{}", INCLUDES_DIR, include),
                    message: describe_tera_error(&e),
                })?;
        }

        // Include names are relative, so a leading slash keeps the page
        // template from colliding with one of them
        let template_name = format!("/{}", name.trim_start_matches('/'));
        tera.add_raw_template(&template_name, &source)
            .map_err(|e| Error::TemplateSyntax {
                name: name.to_string(),
                message: describe_tera_error(&e),
            })?;

        tera.register_filter("relative_url", relative_url_filter(self.base_url.clone()));
        tera.register_filter("strip_html", strip_html_filter);
        tera.register_filter("truncate_chars", truncate_chars_filter);
        tera.register_filter("date_format", date_format_filter);
        tera.register_function("render_body", render_body_function(context.body.clone()));

        tracing::debug!("Rendering template {}", name);
        tera.render(&template_name, &context.to_tera())
            .map_err(|e| Error::Template {
                name: name.to_string(),
                message: describe_tera_error(&e),
            })
    }
}

/// Whether the text contains any Tera delimiters at all
fn has_template_syntax(content: &str) -> bool {
    content.contains("{{") || content.contains("{%") || content.contains("{#")
}

/// Flatten a Tera error and its source chain into one message
fn describe_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// `render_body()` yields the content being wrapped. Outside a layout there
/// is nothing to wrap, which is an error.
fn render_body_function(body: Option<String>) -> impl tera::Function {
    move |_args: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
        match &body {
            Some(body) => Ok(tera::Value::String(body.clone())),
            None => Err(tera::Error::msg(
                "render_body() can only be used inside a layout",
            )),
        }
    }
}

/// Tera filter: prefix a site path with the base URL
fn relative_url_filter(base_url: String) -> impl tera::Filter {
    move |value: &tera::Value, _args: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
        let path = tera::try_get_value!("relative_url", "value", String, value);
        Ok(tera::Value::String(with_base_url(&base_url, &path)))
    }
}

/// Tera filter: strip HTML tags
fn strip_html_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("strip_html", "value", String, value);
    let mut result = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    Ok(tera::Value::String(result))
}

/// Tera filter: truncate by character count
fn truncate_chars_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("truncate_chars", "value", String, value);
    let length = match args.get("length") {
        Some(val) => tera::try_get_value!("truncate_chars", "length", usize, val),
        None => 150,
    };
    let omission = match args.get("omission") {
        Some(val) => tera::try_get_value!("truncate_chars", "omission", String, val),
        None => "...".to_string(),
    };

    if s.chars().count() <= length {
        Ok(tera::Value::String(s))
    } else {
        let truncated: String = s.chars().take(length).collect();
        Ok(tera::Value::String(format!(
            "{}{}",
            truncated.trim_end(),
            omission
        )))
    }
}

/// Tera filter: reformat a date string from a header field.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`. `format` is a
/// strftime pattern; `LL` is shorthand for `%B %d, %Y`. Unparseable input is
/// returned as is.
fn date_format_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("date_format", "value", String, value);
    let format = match args.get("format") {
        Some(val) => tera::try_get_value!("date_format", "format", String, val),
        None => "%Y-%m-%d".to_string(),
    };
    let format = if format == "LL" { "%B %d, %Y" } else { format.as_str() };

    let parsed = chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.naive_local())
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        });

    match parsed {
        Ok(date) => Ok(tera::Value::String(date.format(format).to_string())),
        Err(_) => Ok(tera::Value::String(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    fn site() -> Arc<Value> {
        let mut data = Fields::new();
        data.insert(
            "menu",
            Value::List(vec![Value::from("Home"), Value::from("Docs")]),
        );
        let mut site = Fields::new();
        site.insert("title", Value::from("Quire"));
        site.insert("data", Value::Map(data));
        Arc::new(Value::Map(site))
    }

    fn renderer(dir: &TempDir, base_url: &str) -> TemplateRenderer {
        TemplateRenderer::new(Storage::new(dir.path()), base_url)
    }

    #[tokio::test]
    async fn test_render_page_fields_ignoring_case() {
        let dir = TempDir::new().unwrap();
        let (text, context) = renderer(&dir, "")
            .render(
                "about.md",
                "# {{ Page.Title }} on {{ site.TITLE }}",
                fields(&[("title", "About")]),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, "# About on Quire");
        assert_eq!(context.page().get_str("title"), Some("About"));
        assert!(context.layout().is_none());
    }

    #[tokio::test]
    async fn test_render_data_namespace() {
        let dir = TempDir::new().unwrap();
        let (text, _) = renderer(&dir, "")
            .render(
                "index.html",
                "{% for item in site.data.menu %}[{{ item }}]{% endfor %}",
                Fields::new(),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, "[Home][Docs]");
    }

    #[tokio::test]
    async fn test_plain_text_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let (text, _) = renderer(&dir, "")
            .render("a.md", "No tags { here }", Fields::new(), site())
            .await
            .unwrap();
        assert_eq!(text, "No tags { here }");
    }

    #[tokio::test]
    async fn test_relative_url_filter() {
        let dir = TempDir::new().unwrap();
        let (text, _) = renderer(&dir, "/wiki")
            .render(
                "a.html",
                r#"<link href="{{ "/css/site.css" | relative_url }}">"#,
                Fields::new(),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, r#"<link href="/wiki/css/site.css">"#);
    }

    #[tokio::test]
    async fn test_render_body_outside_layout_fails() {
        let dir = TempDir::new().unwrap();
        let err = renderer(&dir, "")
            .render("a.html", "{{ render_body() }}", Fields::new(), site())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Template { ref name, .. } if name == "a.html"));
    }

    #[tokio::test]
    async fn test_render_body_in_layout_context() {
        let dir = TempDir::new().unwrap();
        let page = RenderContext::new(fields(&[("title", "T")]), site());
        let layout = page.for_layout(fields(&[("name", "main")]), "<p>body</p>".to_string());
        let text = renderer(&dir, "")
            .render_with(
                "_layouts/main.html",
                "<main data-layout=\"{{ layout.Name }}\">{{ render_body() }}</main>",
                &layout,
            )
            .await
            .unwrap();
        assert_eq!(text, "<main data-layout=\"main\"><p>body</p></main>");
    }

    #[tokio::test]
    async fn test_syntax_error() {
        let dir = TempDir::new().unwrap();
        let err = renderer(&dir, "")
            .render("bad.html", "{% if %}", Fields::new(), site())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TemplateSyntax { ref name, .. } if name == "bad.html"));
    }

    #[tokio::test]
    async fn test_includes_are_rendered() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INCLUDES_DIR)).unwrap();
        fs::write(
            dir.path().join(INCLUDES_DIR).join("nav.html"),
            "<nav>{{ Site.Title }}</nav>",
        )
        .unwrap();

        let (text, _) = renderer(&dir, "")
            .render(
                "index.html",
                r#"{% include "nav.html" %}<p>x</p>"#,
                Fields::new(),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, "<nav>Quire</nav><p>x</p>");
    }

    #[tokio::test]
    async fn test_missing_include() {
        let dir = TempDir::new().unwrap();
        let err = renderer(&dir, "")
            .render("a.html", r#"{% include "gone.html" %}"#, Fields::new(), site())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IncludeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_include_cycle_fails_to_render() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INCLUDES_DIR)).unwrap();
        fs::write(
            dir.path().join(INCLUDES_DIR).join("a.html"),
            r#"<a>{% include "b.html" %}</a>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(INCLUDES_DIR).join("b.html"),
            r#"<b>{% include "a.html" %}</b>"#,
        )
        .unwrap();

        let err = renderer(&dir, "")
            .render("p.md", r#"{% include "a.html" %}"#, Fields::new(), site())
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::TemplateSyntax { ref name, .. } if name == "_includes/a.html"),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_loop_variable_members_ignore_case() {
        let dir = TempDir::new().unwrap();
        let mut ada = Fields::new();
        ada.insert("Name", Value::from("Ada"));
        let mut grace = Fields::new();
        grace.insert("NAME", Value::from("Grace"));
        let mut data = Fields::new();
        data.insert(
            "Authors",
            Value::List(vec![Value::Map(ada), Value::Map(grace)]),
        );
        let mut site = Fields::new();
        site.insert("data", Value::Map(data));

        let (text, _) = renderer(&dir, "")
            .render(
                "authors.html",
                "{% for a in site.data.Authors %}[{{ a.Name }}]{% endfor %}{% set lead = site.data.authors | first %}{{ lead.name }}",
                Fields::new(),
                Arc::new(Value::Map(site)),
            )
            .await
            .unwrap();
        assert_eq!(text, "[Ada][Grace]Ada");
    }

    #[tokio::test]
    async fn test_heading_attribute_is_not_a_comment() {
        let dir = TempDir::new().unwrap();
        let (text, _) = renderer(&dir, "")
            .render(
                "a.md",
                "# Install {#install}\n\nText {{ page.title }}{# hidden #}",
                fields(&[("title", "Guide")]),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, "# Install {#install}\n\nText Guide");
    }

    #[tokio::test]
    async fn test_raw_block_is_literal() {
        let dir = TempDir::new().unwrap();
        let (text, _) = renderer(&dir, "")
            .render(
                "a.html",
                "{% raw %}{{ Page.Title }}{% endraw %} {{ Page.Title }}",
                fields(&[("title", "T")]),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, "{{ Page.Title }} T");
    }

    #[tokio::test]
    async fn test_date_format_filter() {
        let dir = TempDir::new().unwrap();
        let (text, _) = renderer(&dir, "")
            .render(
                "a.html",
                r#"{{ page.date | date_format(format="LL") }}"#,
                fields(&[("date", "2024-01-15")]),
                site(),
            )
            .await
            .unwrap();
        assert_eq!(text, "January 15, 2024");
    }

    #[test]
    fn test_strip_html_filter() {
        let value = tera::Value::String("<p>Hello <b>world</b></p>".to_string());
        let result = strip_html_filter(&value, &HashMap::new()).unwrap();
        assert_eq!(result, tera::Value::String("Hello world".to_string()));
    }

    #[test]
    fn test_truncate_chars_filter() {
        let value = tera::Value::String("abcdefghij".to_string());
        let mut args = HashMap::new();
        args.insert("length".to_string(), tera::Value::from(4));
        let result = truncate_chars_filter(&value, &args).unwrap();
        assert_eq!(result, tera::Value::String("abcd...".to_string()));
    }
}
