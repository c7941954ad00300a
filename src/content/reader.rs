//! Content readers
//!
//! A reader maps between request paths and disk files for one kind of
//! source file, and runs the render pipeline for it. The registry tries
//! readers in registration order, so readers with more specific suffixes
//! must be registered first.

use async_trait::async_trait;
use std::sync::Arc;

use super::frontmatter::{has_header, parse_header};
use super::markdown::MarkupConverter;
use crate::error::{Error, Result};
use crate::storage::{content_type_for, Storage, StorageItem};
use crate::templates::{LayoutComposer, RenderContext, TemplateRenderer};
use crate::value::{Fields, Value};

/// Output of a reader
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub content: String,
    pub fields: Fields,
    pub content_type: &'static str,
}

/// Strategy for one kind of source file
#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Map a request item to the disk item this reader would render, if any.
    /// Only touches the filesystem to check for existence.
    async fn accept_request(&self, storage: &Storage, request: &StorageItem) -> Option<StorageItem>;

    /// Map a disk item back to its canonical request item
    fn accept_file_as_request(&self, disk: &StorageItem) -> Option<StorageItem>;

    /// Header fields of a disk item, without rendering it
    async fn read_header(&self, pipeline: &Pipeline, disk: &StorageItem) -> Result<Fields> {
        pipeline.load(disk).await.map(|(fields, _)| fields)
    }

    /// Render a disk item
    async fn read(
        &self,
        pipeline: &Pipeline,
        disk: &StorageItem,
        site: Arc<Value>,
    ) -> Result<ReadResult>;
}

/// The shared render stages readers compose
pub struct Pipeline {
    storage: Storage,
    renderer: TemplateRenderer,
    layouts: LayoutComposer,
    markup: MarkupConverter,
}

impl Pipeline {
    pub fn new(
        storage: Storage,
        renderer: TemplateRenderer,
        layouts: LayoutComposer,
        markup: MarkupConverter,
    ) -> Self {
        Self {
            storage,
            renderer,
            layouts,
            markup,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn layouts(&self) -> &LayoutComposer {
        &self.layouts
    }

    pub fn markup(&self) -> &MarkupConverter {
        &self.markup
    }

    /// Read a file and split off its header
    pub async fn load(&self, disk: &StorageItem) -> Result<(Fields, String)> {
        let text = self.storage.read_text(disk).await?;
        let (fields, body) = parse_header(&text).map_err(|source| Error::HeaderSyntax {
            path: disk.relative_path().to_string(),
            source,
        })?;
        Ok((fields, body.to_string()))
    }

    /// Evaluate the body of `disk` as a template
    pub async fn render_template(
        &self,
        disk: &StorageItem,
        body: &str,
        fields: Fields,
        site: Arc<Value>,
    ) -> Result<(String, RenderContext)> {
        self.renderer
            .render(disk.relative_path(), body, fields, site)
            .await
    }

    pub async fn apply_layout(&self, text: String, context: &RenderContext) -> Result<String> {
        self.layouts.apply_layout(&self.renderer, text, context).await
    }
}

/// `name.tpl.ext` on disk, served as `name.ext`. Rendered as a template and
/// wrapped in its layout; no markup conversion.
#[derive(Debug, Clone)]
pub struct TemplateFileReader {
    marker: String,
}

impl TemplateFileReader {
    pub fn new() -> Self {
        Self {
            marker: "tpl".to_string(),
        }
    }
}

impl Default for TemplateFileReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentReader for TemplateFileReader {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn accept_request(&self, storage: &Storage, request: &StorageItem) -> Option<StorageItem> {
        let ext = request.extension();
        if ext.is_empty() {
            return None;
        }
        let candidate = request.with_name(&format!("{}.{}.{}", request.stem(), self.marker, ext));
        storage.file_exists(&candidate).await.then_some(candidate)
    }

    fn accept_file_as_request(&self, disk: &StorageItem) -> Option<StorageItem> {
        let ext = disk.extension();
        if ext.is_empty() {
            return None;
        }
        let stem = disk.stem();
        let (base, marker) = stem.rsplit_once('.')?;
        if base.is_empty() || !marker.eq_ignore_ascii_case(&self.marker) {
            return None;
        }
        Some(disk.with_name(&format!("{}.{}", base, ext)))
    }

    async fn read(
        &self,
        pipeline: &Pipeline,
        disk: &StorageItem,
        site: Arc<Value>,
    ) -> Result<ReadResult> {
        let (fields, body) = pipeline.load(disk).await?;
        let (text, context) = pipeline.render_template(disk, &body, fields, site).await?;
        let content = pipeline.apply_layout(text, &context).await?;
        Ok(ReadResult {
            content,
            fields: context.page().clone(),
            content_type: disk.content_type(),
        })
    }
}

/// Markdown sources (`name.md`) served under the published extension
/// (`name.html`). A physical file at the published path wins.
#[derive(Debug, Clone)]
pub struct MarkdownReader {
    extensions: Vec<String>,
    published_extension: String,
}

impl MarkdownReader {
    pub fn new(extensions: Vec<String>, published_extension: impl Into<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            published_extension: published_extension.into().to_ascii_lowercase(),
        }
    }
}

#[async_trait]
impl ContentReader for MarkdownReader {
    fn name(&self) -> &'static str {
        "markdown"
    }

    async fn accept_request(&self, storage: &Storage, request: &StorageItem) -> Option<StorageItem> {
        if request.extension() != self.published_extension || storage.file_exists(request).await {
            return None;
        }
        for ext in &self.extensions {
            let candidate = request.with_extension(ext);
            if storage.file_exists(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    fn accept_file_as_request(&self, disk: &StorageItem) -> Option<StorageItem> {
        let ext = disk.extension();
        self.extensions
            .iter()
            .any(|e| *e == ext)
            .then(|| disk.with_extension(&self.published_extension))
    }

    async fn read(
        &self,
        pipeline: &Pipeline,
        disk: &StorageItem,
        site: Arc<Value>,
    ) -> Result<ReadResult> {
        let (fields, body) = pipeline.load(disk).await?;
        let (text, context) = pipeline.render_template(disk, &body, fields, site).await?;
        let html = pipeline.markup().render(&text);
        let content = pipeline.apply_layout(html, &context).await?;
        Ok(ReadResult {
            content,
            fields: context.page().clone(),
            content_type: content_type_for(&self.published_extension),
        })
    }
}

/// Plain HTML pages, served at their own path. Pages without a header are
/// returned byte for byte.
#[derive(Debug, Clone, Default)]
pub struct HtmlReader;

impl HtmlReader {
    fn is_html(item: &StorageItem) -> bool {
        matches!(item.extension().as_str(), "html" | "htm")
    }
}

#[async_trait]
impl ContentReader for HtmlReader {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn accept_request(&self, storage: &Storage, request: &StorageItem) -> Option<StorageItem> {
        if Self::is_html(request) && storage.file_exists(request).await {
            Some(request.clone())
        } else {
            None
        }
    }

    fn accept_file_as_request(&self, disk: &StorageItem) -> Option<StorageItem> {
        Self::is_html(disk).then(|| disk.clone())
    }

    async fn read(
        &self,
        pipeline: &Pipeline,
        disk: &StorageItem,
        site: Arc<Value>,
    ) -> Result<ReadResult> {
        let text = pipeline.storage().read_text(disk).await?;
        if !has_header(&text) {
            return Ok(ReadResult {
                content: text,
                fields: Fields::new(),
                content_type: disk.content_type(),
            });
        }

        let (fields, body) = pipeline.load(disk).await?;
        let (text, context) = pipeline.render_template(disk, &body, fields, site).await?;
        let content = pipeline.apply_layout(text, &context).await?;
        Ok(ReadResult {
            content,
            fields: context.page().clone(),
            content_type: disk.content_type(),
        })
    }
}
