//! Storage items - immutable handles to paths under the source root

use std::fmt;
use std::path::{Path, PathBuf};

/// Reserved folders recognized by convention at the top of the source root
pub const LAYOUTS_DIR: &str = "_layouts";
pub const INCLUDES_DIR: &str = "_includes";
pub const TEMPLATES_DIR: &str = "_templates";
pub const DATA_DIR: &str = "_data";

/// Role of the top-level folder an item lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyFolder {
    Layouts,
    Includes,
    Templates,
    Data,
    None,
}

impl FamilyFolder {
    /// Classify by the first segment of a relative path
    fn classify(relative_path: &str) -> Self {
        match relative_path.split('/').next().unwrap_or("") {
            LAYOUTS_DIR => FamilyFolder::Layouts,
            INCLUDES_DIR => FamilyFolder::Includes,
            TEMPLATES_DIR => FamilyFolder::Templates,
            DATA_DIR => FamilyFolder::Data,
            _ => FamilyFolder::None,
        }
    }
}

/// A path under the source root. Items are cheap values built on demand
/// and say nothing about whether the path exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageItem {
    root: PathBuf,
    relative_path: String,
}

impl StorageItem {
    /// Build an item from an already normalized relative path
    pub(crate) fn new(root: &Path, relative_path: String) -> Self {
        Self {
            root: root.to_path_buf(),
            relative_path,
        }
    }

    /// File or directory name (last segment); empty for the root itself
    pub fn name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Path relative to the source root, `/`-separated, no leading slash
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Absolute path on disk
    pub fn full_path(&self) -> PathBuf {
        if self.relative_path.is_empty() {
            return self.root.clone();
        }
        self.relative_path
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Lowercase extension of the name without the dot, or empty
    pub fn extension(&self) -> String {
        split_extension(self.name())
            .1
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    /// Name without its last extension
    pub fn stem(&self) -> &str {
        split_extension(self.name()).0
    }

    /// Top-level reserved folder this item belongs to
    pub fn family(&self) -> FamilyFolder {
        FamilyFolder::classify(&self.relative_path)
    }

    /// Whether any segment is hidden (`.`) or reserved (`_`)
    pub fn is_reserved(&self) -> bool {
        self.relative_path
            .split('/')
            .any(|s| s.starts_with('_') || s.starts_with('.'))
    }

    pub fn is_root(&self) -> bool {
        self.relative_path.is_empty()
    }

    /// Containing directory, `None` for the root
    pub fn parent(&self) -> Option<StorageItem> {
        if self.is_root() {
            return None;
        }
        let parent = match self.relative_path.rfind('/') {
            Some(pos) => self.relative_path[..pos].to_string(),
            None => String::new(),
        };
        Some(StorageItem::new(&self.root, parent))
    }

    /// Child of this item (treated as a directory)
    pub fn join(&self, name: &str) -> StorageItem {
        let relative = if self.is_root() {
            name.to_string()
        } else {
            format!("{}/{}", self.relative_path, name)
        };
        StorageItem::new(&self.root, relative)
    }

    /// Sibling with a different file name
    pub fn with_name(&self, name: &str) -> StorageItem {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => StorageItem::new(&self.root, name.to_string()),
        }
    }

    /// Sibling with the last extension replaced (or added when `ext` is non-empty
    /// and the name has none). An empty `ext` removes the extension.
    pub fn with_extension(&self, ext: &str) -> StorageItem {
        let stem = self.stem();
        if ext.is_empty() {
            self.with_name(stem)
        } else {
            self.with_name(&format!("{}.{}", stem, ext))
        }
    }

    /// MIME type derived from the extension
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.extension())
    }
}

impl fmt::Display for StorageItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.relative_path)
    }
}

/// Split `name.ext` at the last dot. Leading dots (hidden files) are not
/// treated as an extension separator.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

/// MIME type for a lowercase extension
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "xml" => "application/xml",
        "rss" => "application/rss+xml",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
