//! Request resolution over an ordered list of content readers

use percent_encoding::percent_decode_str;
use std::path::PathBuf;
use std::sync::Arc;

use super::reader::{ContentReader, Pipeline};
use crate::error::Result;
use crate::helpers::with_base_url;
use crate::history::Commit;
use crate::storage::{Storage, StorageItem};
use crate::value::{Fields, Value};

/// A rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub fields: Fields,
    /// Site-relative request path the page is published under, e.g. `/about.html`
    pub canonical_path: String,
    /// Commit that last touched the source file, when known
    pub last_modified: Option<Commit>,
    pub content_type: &'static str,
    /// Source file the page was rendered from
    pub source: StorageItem,
}

/// Outcome of resolving a request path
#[derive(Debug, Clone)]
pub enum Resolution {
    NotFound,
    /// The content lives under another URL
    Redirect(String),
    /// A file served as is
    StaticFile {
        path: PathBuf,
        content_type: &'static str,
    },
    Rendered(RenderedPage),
}

/// Maps request paths to readers and disk files
pub struct Registry {
    pipeline: Pipeline,
    readers: Vec<Box<dyn ContentReader>>,
    default_document: String,
    base_url: String,
}

impl Registry {
    /// A registry with no readers; add them with [`Registry::register`]
    pub fn new(
        pipeline: Pipeline,
        default_document: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            readers: Vec::new(),
            default_document: default_document.into(),
            base_url: base_url.into(),
        }
    }

    /// Append a reader. Readers registered earlier take priority.
    pub fn register(&mut self, reader: Box<dyn ContentReader>) -> &mut Self {
        self.readers.push(reader);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn storage(&self) -> &Storage {
        self.pipeline.storage()
    }

    /// First reader that accepts the request, with the disk item it maps to
    pub async fn resolve_for_request(
        &self,
        request: &StorageItem,
    ) -> Option<(&dyn ContentReader, StorageItem)> {
        for reader in &self.readers {
            if let Some(disk) = reader.accept_request(self.storage(), request).await {
                tracing::debug!("{} -> {} via {} reader", request, disk, reader.name());
                return Some((reader.as_ref(), disk));
            }
        }
        None
    }

    /// Canonical request item for a disk file, from the first reader that
    /// claims it
    pub fn editor_path(&self, disk: &StorageItem) -> Option<StorageItem> {
        self.reader_for_file(disk).map(|(_, request)| request)
    }

    fn reader_for_file(&self, disk: &StorageItem) -> Option<(&dyn ContentReader, StorageItem)> {
        self.readers.iter().find_map(|reader| {
            reader
                .accept_file_as_request(disk)
                .map(|request| (reader.as_ref(), request))
        })
    }

    /// Public URL of a request item
    pub fn url_for(&self, request: &StorageItem) -> String {
        with_base_url(&self.base_url, &request.to_string())
    }

    /// Resolve a request path (as received, possibly percent-encoded) and
    /// render the content it maps to
    pub async fn resolve(&self, path: &str, site: Arc<Value>) -> Result<Resolution> {
        let Ok(decoded) = percent_decode_str(path).decode_utf8() else {
            return Ok(Resolution::NotFound);
        };
        let Some(mut request) = self.storage().get_item(&decoded) else {
            return Ok(Resolution::NotFound);
        };
        if request.is_reserved() {
            tracing::debug!("Rejecting reserved path {}", request);
            return Ok(Resolution::NotFound);
        }
        if request.is_root() || self.storage().directory_exists(&request).await {
            request = request.join(&self.default_document);
        }

        if let Some((reader, disk)) = self.resolve_for_request(&request).await {
            if let Some(canonical) = self.editor_path(&disk) {
                if canonical != request {
                    return Ok(Resolution::Redirect(self.url_for(&canonical)));
                }
            }

            let result = reader.read(&self.pipeline, &disk, site).await?;
            return Ok(Resolution::Rendered(RenderedPage {
                html: result.content,
                fields: result.fields,
                canonical_path: request.to_string(),
                last_modified: None,
                content_type: result.content_type,
                source: disk,
            }));
        }

        if self.storage().file_exists(&request).await {
            if let Some(canonical) = self.editor_path(&request) {
                if canonical != request {
                    return Ok(Resolution::Redirect(self.url_for(&canonical)));
                }
            }
            return Ok(Resolution::StaticFile {
                path: request.full_path(),
                content_type: request.content_type(),
            });
        }

        Ok(Resolution::NotFound)
    }

    /// Header fields of a source file without rendering it. `None` when the
    /// file does not exist or no reader handles it.
    pub async fn read_header(&self, path: &str) -> Result<Option<Fields>> {
        let Some(disk) = self.storage().get_item(path) else {
            return Ok(None);
        };
        let Some((reader, _)) = self.reader_for_file(&disk) else {
            return Ok(None);
        };
        if !self.storage().file_exists(&disk).await {
            return Ok(None);
        }
        reader.read_header(&self.pipeline, &disk).await.map(Some)
    }
}
