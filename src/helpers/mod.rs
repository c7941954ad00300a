//! Helper functions shared by templates and the markup converter

mod url;

pub use url::*;
