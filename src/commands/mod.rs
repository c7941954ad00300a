//! CLI command implementations

pub mod data;
pub mod header;
pub mod history;
pub mod resolve;
