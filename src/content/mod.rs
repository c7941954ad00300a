//! Content module - header parsing, markup conversion, readers and request
//! resolution

mod frontmatter;
mod markdown;
pub mod reader;
pub mod registry;

pub use frontmatter::{has_header, parse_header, HeaderError};
pub use markdown::{MarkupConverter, MarkupOptions};
pub use reader::{
    ContentReader, HtmlReader, MarkdownReader, Pipeline, ReadResult, TemplateFileReader,
};
pub use registry::{Registry, RenderedPage, Resolution};
