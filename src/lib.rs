//! quire: content resolution and rendering for file-based sites
//!
//! Given a directory of content files, optionally under git, the engine maps
//! request paths to source files, renders them through front matter,
//! templates, Markdown and layouts, reports the commit that last touched
//! them, and exposes a data namespace built from structured data files.

pub mod commands;
pub mod config;
pub mod content;
pub mod data;
pub mod error;
pub mod helpers;
pub mod history;
pub mod storage;
pub mod templates;
pub mod value;

pub use error::{Error, Result};

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use content::{
    HtmlReader, MarkdownReader, MarkupConverter, Pipeline, Registry, Resolution,
    TemplateFileReader,
};
use data::DataStore;
use history::{Commit, GitRepository};
use storage::{Storage, StorageItem, DATA_DIR};
use templates::{LayoutComposer, TemplateRenderer};
use value::{Fields, Value};

/// The assembled engine for one source root
pub struct Site {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Source root
    pub base_dir: PathBuf,
    registry: Registry,
    data: DataStore,
    /// `site` template object, rebuilt whenever the data namespace is
    site: ArcSwap<Value>,
    git: Option<GitRepository>,
}

impl Site {
    /// Open a source root: read its configuration, register the readers and,
    /// when history is enabled, attach the git repository containing it.
    ///
    /// The data namespace starts empty; call [`Site::load_data`] to build it.
    pub async fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config = config::SiteConfig::load_from_root(&base_dir)?;
        let storage = Storage::new(&base_dir);

        let pipeline = Pipeline::new(
            storage.clone(),
            TemplateRenderer::new(storage.clone(), config.base_url.clone()),
            LayoutComposer::new(storage.clone(), config.layout_extension.clone()).with_cache(),
            MarkupConverter::new(config.markup_options()),
        );
        let mut registry = Registry::new(
            pipeline,
            config.default_document.clone(),
            config.base_url.clone(),
        );
        registry
            .register(Box::new(TemplateFileReader::new()))
            .register(Box::new(MarkdownReader::new(
                config.markdown_extensions.clone(),
                config.published_extension.clone(),
            )))
            .register(Box::new(HtmlReader));

        let git = if config.history.enable {
            match GitRepository::open(&base_dir).await {
                Ok(repo) => Some(repo),
                Err(e) => {
                    tracing::warn!("History unavailable for {:?}: {}", base_dir, e);
                    None
                }
            }
        } else {
            None
        };

        let data = DataStore::new(base_dir.join(DATA_DIR));
        let site = ArcSwap::from_pointee(config.site_namespace(&data.snapshot()));

        Ok(Self {
            config,
            base_dir,
            registry,
            data,
            site,
            git,
        })
    }

    /// Rebuild the data namespace and the `site` object templates see.
    /// Both are swapped under the same rebuild lock.
    pub async fn load_data(&self) -> Result<Arc<Value>> {
        self.data
            .load_and_publish(|namespace| {
                self.site
                    .store(Arc::new(self.config.site_namespace(namespace)));
            })
            .await
    }

    /// Current data namespace
    pub fn data(&self) -> Arc<Value> {
        self.data.snapshot()
    }

    /// Current `site` template object
    pub fn site_namespace(&self) -> Arc<Value> {
        self.site.load_full()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn git(&self) -> Option<&GitRepository> {
        self.git.as_ref()
    }

    /// Forget parsed layouts so edits to layout files are picked up
    pub fn clear_layout_cache(&self) {
        self.registry.pipeline().layouts().clear_cache();
    }

    /// Resolve and render a request path
    pub async fn resolve(&self, path: &str) -> Result<Resolution> {
        let mut resolution = self.registry.resolve(path, self.site_namespace()).await?;
        if let Resolution::Rendered(page) = &mut resolution {
            page.last_modified = self.file_last_modified(&page.source).await;
        }
        Ok(resolution)
    }

    /// Header fields of a source file, without rendering it
    pub async fn read_header(&self, path: &str) -> Result<Option<Fields>> {
        self.registry.read_header(path).await
    }

    /// Public URL a source file is served under
    pub fn editor_path(&self, path: &str) -> Option<String> {
        let disk = self.registry.pipeline().storage().get_item(path)?;
        self.registry
            .editor_path(&disk)
            .map(|request| self.registry.url_for(&request))
    }

    /// Last-modifying commit for each of `names` inside directory `parent`.
    /// Without a repository nothing is known and the map is empty.
    pub async fn last_modified(
        &self,
        parent: &str,
        names: &HashSet<String>,
    ) -> Result<HashMap<String, Commit>> {
        match &self.git {
            Some(repo) => repo.last_modified(parent, names).await,
            None => Ok(HashMap::new()),
        }
    }

    async fn file_last_modified(&self, item: &StorageItem) -> Option<Commit> {
        let parent = item.parent()?;
        let names: HashSet<String> = [item.name().to_string()].into_iter().collect();
        match self.last_modified(parent.relative_path(), &names).await {
            Ok(mut found) => found.remove(item.name()),
            Err(e) => {
                tracing::warn!("History unavailable for {}: {}", item, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, path: &str, text: &str) {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, text).unwrap();
    }

    #[tokio::test]
    async fn test_site_renders_with_data_and_layout() {
        let dir = TempDir::new().unwrap();
        write(&dir, "_config.yml", "title: Handbook\nbase_url: /hb\nhistory:\n  enable: false\n");
        write(&dir, "_data/nav.yml", "- Home\n- Guide\n");
        write(
            &dir,
            "_layouts/default.html",
            "<title>{{ site.title }}</title><nav>{{ site.data.nav | join(sep=\",\") }}</nav>{{ render_body() }}",
        );
        write(
            &dir,
            "guide.md",
            "---\nlayout: default\n---\nSee [[setup|the setup page]].\n",
        );

        let site = Site::open(dir.path()).await.unwrap();
        site.load_data().await.unwrap();

        match site.resolve("/guide.html").await.unwrap() {
            Resolution::Rendered(page) => {
                assert_eq!(
                    page.html,
                    "<title>Handbook</title><nav>Home,Guide</nav><p>See <a href=\"/hb/setup.html\">the setup page</a>.</p>\n"
                );
                assert!(page.last_modified.is_none());
            }
            other => panic!("expected a rendered page, got {:?}", other),
        }

        assert_eq!(site.editor_path("guide.md").as_deref(), Some("/hb/guide.html"));
    }

    #[tokio::test]
    async fn test_data_is_empty_until_loaded() {
        let dir = TempDir::new().unwrap();
        write(&dir, "_config.yml", "history:\n  enable: false\n");
        write(&dir, "_data/a.yml", "x: 1");

        let site = Site::open(dir.path()).await.unwrap();
        assert_eq!(site.data().as_map().map(Fields::len), Some(0));

        site.load_data().await.unwrap();
        assert_eq!(site.data().as_map().map(Fields::len), Some(1));
        let namespace = site.site_namespace();
        assert!(namespace
            .as_map()
            .and_then(|m| m.get("data"))
            .and_then(Value::as_map)
            .is_some_and(|d| d.contains_key("a")));
    }

    #[tokio::test]
    async fn test_concurrent_loads_keep_site_and_data_in_step() {
        let dir = TempDir::new().unwrap();
        write(&dir, "_config.yml", "history:\n  enable: false\n");
        write(&dir, "_data/a.yml", "x: 1");

        let site = Site::open(dir.path()).await.unwrap();
        let (first, second) = tokio::join!(site.load_data(), site.load_data());
        first.unwrap();
        second.unwrap();

        let namespace = site.site_namespace();
        let published = namespace.as_map().and_then(|m| m.get("data")).unwrap();
        assert_eq!(published, site.data().as_ref());
    }

    #[tokio::test]
    async fn test_rendered_page_carries_last_commit() {
        let git_available = std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !git_available {
            return;
        }
        let dir = TempDir::new().unwrap();
        let init = std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        assert!(init.success());
        write(&dir, "docs/about.md", "# About");

        let site = Site::open(dir.path()).await.unwrap();
        let ada = history::Signature::new("Ada", "ada@example.com");
        let repo = site.git().unwrap();
        repo.commit(&ada, &ada, "docs/about.md", "add about", false)
            .await
            .unwrap();
        write(&dir, "docs/about.md", "# About us");
        repo.commit(&ada, &ada, "docs/about.md", "reword about", false)
            .await
            .unwrap();

        match site.resolve("/docs/about.html").await.unwrap() {
            Resolution::Rendered(page) => {
                let commit = page.last_modified.unwrap();
                assert_eq!(commit.message, "reword about");
                assert_eq!(commit.author, "Ada");
            }
            other => panic!("expected a rendered page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_repository_means_unknown_history() {
        let dir = TempDir::new().unwrap();
        write(&dir, "index.md", "# Home");

        let site = Site::open(dir.path()).await.unwrap();
        let names: HashSet<String> = ["index.md".to_string()].into_iter().collect();
        assert!(site.last_modified("", &names).await.unwrap().is_empty());
    }
}
