//! Site configuration (_config.yml)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::content::MarkupOptions;
use crate::error::{Error, Result};
use crate::value::{Fields, Value};

/// Configuration file name at the source root
pub const CONFIG_FILE: &str = "_config.yml";

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub description: String,

    // URL
    pub url: String,
    /// Prefix for generated links and redirects, empty for none
    pub base_url: String,
    /// Document served for directory requests
    pub default_document: String,

    // Content
    pub markdown_extensions: Vec<String>,
    pub published_extension: String,
    /// Appended to layout names given without an extension
    pub layout_extension: String,
    #[serde(default)]
    pub highlight: HighlightConfig,
    #[serde(default)]
    pub history: HistoryConfig,

    // Store any additional fields
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml::Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),

            url: String::new(),
            base_url: String::new(),
            default_document: "index.html".to_string(),

            markdown_extensions: vec!["md".to_string(), "markdown".to_string()],
            published_extension: "html".to_string(),
            layout_extension: "html".to_string(),
            highlight: HighlightConfig::default(),
            history: HistoryConfig::default(),

            extra: IndexMap::new(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: SiteConfig = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `_config.yml` from a source root, falling back to the defaults
    /// when the file does not exist
    pub fn load_from_root<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().join(CONFIG_FILE);
        if path.is_file() {
            tracing::debug!("Loading config from {:?}", path);
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.default_document.is_empty() || self.default_document.contains('/') {
            return Err(Error::Config(format!(
                "default_document must be a plain file name, got '{}'",
                self.default_document
            )));
        }
        if self.published_extension.trim_start_matches('.').is_empty() {
            return Err(Error::Config("published_extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// Options for the markup converter
    pub fn markup_options(&self) -> MarkupOptions {
        MarkupOptions {
            base_url: self.base_url.clone(),
            source_extensions: self.markdown_extensions.clone(),
            published_extension: self.published_extension.clone(),
            highlight: self.highlight.enable,
            theme: self.highlight.theme.clone(),
            line_numbers: self.highlight.line_number,
        }
    }

    /// The `site` object seen by templates: the configured fields, every
    /// extra key, and the data namespace under `data`
    pub fn site_namespace(&self, data: &Value) -> Value {
        let mut site = Fields::new();
        for (key, value) in &self.extra {
            site.insert(key.clone(), Value::from_yaml(value.clone()));
        }
        site.insert("title", Value::from(self.title.as_str()));
        site.insert("description", Value::from(self.description.as_str()));
        site.insert("url", Value::from(self.url.as_str()));
        site.insert("base_url", Value::from(self.base_url.as_str()));
        site.insert("data", data.clone());
        Value::Map(site)
    }
}

/// Code highlighting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub enable: bool,
    /// syntect theme name
    pub theme: String,
    pub line_number: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            enable: true,
            theme: "base16-ocean.dark".to_string(),
            line_number: false,
        }
    }
}

/// Version-control history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Attach last-modified commits to rendered pages
    pub enable: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}
