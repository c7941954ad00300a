//! Configuration module

mod site;

pub use site::HighlightConfig;
pub use site::HistoryConfig;
pub use site::SiteConfig;
pub use site::CONFIG_FILE;
