//! Layout composition
//!
//! A page names its layout in the `layout` header field. The layout is a
//! template in the layouts folder which wraps the page via `render_body()`,
//! and it may name a layout of its own. Chains stop at the first layout
//! without a `layout` field.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{RenderContext, TemplateRenderer};
use crate::content::parse_header;
use crate::error::{Error, Result};
use crate::storage::{Storage, LAYOUTS_DIR};
use crate::value::{Fields, Value};

/// Deepest allowed layout chain. A page whose chain goes further (in
/// practice a cycle) fails to render.
pub const MAX_LAYOUT_DEPTH: usize = 5;

/// A parsed layout file
#[derive(Debug, Clone)]
pub struct Layout {
    /// Path relative to the source root
    pub path: String,
    /// The layout's own header fields
    pub fields: Fields,
    /// Template text following the header
    pub template: String,
}

/// Wraps rendered content in its layout chain
#[derive(Debug)]
pub struct LayoutComposer {
    storage: Storage,
    extension: String,
    cache: Option<RwLock<HashMap<String, Arc<Layout>>>>,
}

impl LayoutComposer {
    /// `extension` is appended to layout names given without one
    pub fn new(storage: Storage, extension: impl Into<String>) -> Self {
        Self {
            storage,
            extension: extension.into(),
            cache: None,
        }
    }

    /// Keep parsed layouts in memory until [`LayoutComposer::clear_cache`]
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(RwLock::new(HashMap::new()));
        self
    }

    /// Drop every cached layout
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }

    /// Apply the layout chain named by the page in `context` to `source`.
    ///
    /// Text from a page without a layout is returned unchanged. Each level is
    /// rendered in a fresh context holding the unchanged page fields, the
    /// layout's fields and the text produced by the level below as its body.
    pub async fn apply_layout(
        &self,
        renderer: &TemplateRenderer,
        source: String,
        context: &RenderContext,
    ) -> Result<String> {
        let mut body = source;
        let mut next = layout_name(context.page());
        let mut depth = 0;

        while let Some(name) = next {
            depth += 1;
            if depth > MAX_LAYOUT_DEPTH {
                return Err(Error::RecursionLimit {
                    layout: name,
                    depth: MAX_LAYOUT_DEPTH,
                });
            }

            let layout = self.load(&name).await?;
            tracing::debug!("Applying layout {} at depth {}", layout.path, depth);

            let level = context.for_layout(layout.fields.clone(), body);
            body = renderer
                .render_with(&layout.path, &layout.template, &level)
                .await?;
            next = layout_name(&layout.fields);
        }

        Ok(body)
    }

    /// Load and parse a layout by name
    pub async fn load(&self, name: &str) -> Result<Arc<Layout>> {
        let file_name = self.file_name(name);

        if let Some(cache) = &self.cache {
            let cached = cache
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&file_name)
                .cloned();
            if let Some(layout) = cached {
                return Ok(layout);
            }
        }

        let not_found = || Error::LayoutNotFound {
            name: name.to_string(),
            path: self.storage.root().join(LAYOUTS_DIR).join(&file_name),
        };
        let item = self
            .storage
            .get_item(&format!("{}/{}", LAYOUTS_DIR, file_name))
            .ok_or_else(not_found)?;
        if !self.storage.file_exists(&item).await {
            return Err(not_found());
        }

        let text = self.storage.read_text(&item).await?;
        let (fields, template) = parse_header(&text).map_err(|source| Error::HeaderSyntax {
            path: item.relative_path().to_string(),
            source,
        })?;

        let layout = Arc::new(Layout {
            path: item.relative_path().to_string(),
            fields,
            template: template.to_string(),
        });

        if let Some(cache) = &self.cache {
            cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(file_name, Arc::clone(&layout));
        }
        Ok(layout)
    }

    fn file_name(&self, name: &str) -> String {
        let last = name.rsplit('/').next().unwrap_or(name);
        if last.contains('.') || self.extension.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, self.extension)
        }
    }
}

/// Layout named by a set of header fields. Absent, empty or non-string
/// values end the chain.
fn layout_name(fields: &Fields) -> Option<String> {
    match fields.get("layout") {
        Some(Value::String(name)) if !name.trim().is_empty() => Some(name.trim().to_string()),
        _ => None,
    }
}
