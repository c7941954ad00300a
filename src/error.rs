//! Error types for content resolution and rendering

use std::path::PathBuf;
use thiserror::Error;

use crate::content::HeaderError;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving and rendering content
#[derive(Debug, Error)]
pub enum Error {
    /// The request does not map to any content
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed front matter in a source file
    #[error("invalid front matter in {path}: {source}")]
    HeaderSyntax {
        path: String,
        #[source]
        source: HeaderError,
    },

    /// A template, layout or include failed to compile
    #[error("template syntax error in {name}: {message}")]
    TemplateSyntax { name: String, message: String },

    /// A template compiled but failed to render
    #[error("failed to render {name}: {message}")]
    Template { name: String, message: String },

    /// `{% include %}` referenced a file missing from the includes folder
    #[error("include '{name}' not found (looked for {path:?})")]
    IncludeNotFound { name: String, path: PathBuf },

    /// A page or layout referenced a layout that does not exist
    #[error("layout '{name}' not found (looked for {path:?})")]
    LayoutNotFound { name: String, path: PathBuf },

    /// Layout chain deeper than the allowed maximum, usually a cycle
    #[error("layout '{layout}' exceeds the maximum layout depth of {depth}")]
    RecursionLimit { layout: String, depth: usize },

    /// A data file could not be parsed or merged into the namespace
    #[error("data file {path:?}: {message}")]
    DataMerge { path: PathBuf, message: String },

    /// A git command failed
    #[error("git {command} failed: {message}")]
    Vcs { command: String, message: String },

    /// Invalid site configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem failure with the path involved
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
