//! Print the header fields of a source file

use anyhow::{bail, Result};

use crate::Site;

/// Print the header fields of `file` as JSON
pub async fn run(site: &Site, file: &str) -> Result<()> {
    let Some(fields) = site.read_header(file).await? else {
        bail!("{} does not exist or is not a content file", file);
    };
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}
