//! Filesystem access rooted at the site source directory

mod item;

pub use item::{
    content_type_for, FamilyFolder, StorageItem, DATA_DIR, INCLUDES_DIR, LAYOUTS_DIR,
    TEMPLATES_DIR,
};

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Filesystem provider for one source root
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a provider for a source root
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The source root itself
    pub fn root_item(&self) -> StorageItem {
        StorageItem::new(&self.root, String::new())
    }

    /// Item for a `/`-separated path relative to the root.
    ///
    /// Leading slashes, empty and `.` segments are dropped; backslashes are
    /// treated as separators. Returns `None` if the path tries to escape the
    /// root with `..`.
    pub fn get_item(&self, path: &str) -> Option<StorageItem> {
        let normalized = path.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s => segments.push(s),
            }
        }
        Some(StorageItem::new(&self.root, segments.join("/")))
    }

    /// Item for an absolute path below the root
    pub fn item_for_path(&self, full_path: &Path) -> Option<StorageItem> {
        let relative = full_path.strip_prefix(&self.root).ok()?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.get_item(&relative)
    }

    pub async fn file_exists(&self, item: &StorageItem) -> bool {
        tokio::fs::metadata(item.full_path())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    pub async fn directory_exists(&self, item: &StorageItem) -> bool {
        tokio::fs::metadata(item.full_path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Read a file as UTF-8 text
    pub async fn read_text(&self, item: &StorageItem) -> Result<String> {
        let path = item.full_path();
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(path, e))
    }

    /// Open a file for streaming reads
    pub async fn open_read(&self, item: &StorageItem) -> Result<tokio::fs::File> {
        let path = item.full_path();
        tokio::fs::File::open(&path)
            .await
            .map_err(|e| Error::io(path, e))
    }

    /// Files directly inside `dir`, sorted by name
    pub async fn files(
        &self,
        dir: &StorageItem,
        include_dot: bool,
        include_underscore: bool,
    ) -> Result<Vec<StorageItem>> {
        self.children(dir, include_dot, include_underscore, false)
            .await
    }

    /// Subdirectories directly inside `dir`, sorted by name
    pub async fn subdirectories(
        &self,
        dir: &StorageItem,
        include_dot: bool,
        include_underscore: bool,
    ) -> Result<Vec<StorageItem>> {
        self.children(dir, include_dot, include_underscore, true)
            .await
    }

    async fn children(
        &self,
        dir: &StorageItem,
        include_dot: bool,
        include_underscore: bool,
        directories: bool,
    ) -> Result<Vec<StorageItem>> {
        let path = dir.full_path();
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if (!include_dot && name.starts_with('.'))
                || (!include_underscore && name.starts_with('_'))
            {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::io(entry.path(), e))?;
            if file_type.is_dir() == directories {
                items.push(dir.join(&name));
            }
        }
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_item_normalizes() {
        let storage = Storage::new("/site");
        let item = storage.get_item("/docs//./guide.md").unwrap();
        assert_eq!(item.relative_path(), "docs/guide.md");
        assert!(storage.get_item("").unwrap().is_root());
        assert_eq!(
            storage.get_item("docs\\win.md").unwrap().relative_path(),
            "docs/win.md"
        );
    }

    #[test]
    fn test_get_item_rejects_parent_segments() {
        let storage = Storage::new("/site");
        assert!(storage.get_item("../etc/passwd").is_none());
        assert!(storage.get_item("docs/../../x").is_none());
    }

    #[tokio::test]
    async fn test_listing_filters_prefixed_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::write(dir.path().join("_draft.md"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::create_dir(dir.path().join("_layouts")).unwrap();

        let storage = Storage::new(dir.path());
        let root = storage.root_item();

        let files = storage.files(&root, false, false).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["a.md", "b.md"]);

        let all = storage.files(&root, true, true).await.unwrap();
        assert_eq!(all.len(), 4);

        let dirs = storage.subdirectories(&root, false, true).await.unwrap();
        let names: Vec<_> = dirs.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["_layouts", "sub"]);
    }

    #[tokio::test]
    async fn test_exists_and_read() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/guide.md"), "# Guide").unwrap();

        let storage = Storage::new(dir.path());
        let guide = storage.get_item("docs/guide.md").unwrap();
        let docs = storage.get_item("docs").unwrap();

        assert!(storage.file_exists(&guide).await);
        assert!(!storage.directory_exists(&guide).await);
        assert!(storage.directory_exists(&docs).await);
        assert_eq!(storage.read_text(&guide).await.unwrap(), "# Guide");
        assert!(storage
            .read_text(&docs.join("missing.md"))
            .await
            .is_err());
    }

    #[test]
    fn test_item_for_path() {
        let storage = Storage::new("/site");
        let item = storage
            .item_for_path(Path::new("/site/docs/guide.md"))
            .unwrap();
        assert_eq!(item.relative_path(), "docs/guide.md");
        assert!(storage.item_for_path(Path::new("/other/x")).is_none());
    }
}
