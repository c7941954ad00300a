//! Resolve a request path and print the result

use anyhow::{bail, Result};

use crate::content::Resolution;
use crate::Site;

/// Print rendered HTML to stdout, or a one-line summary for anything else
pub async fn run(site: &Site, path: &str) -> Result<()> {
    match site.resolve(path).await? {
        Resolution::NotFound => bail!("not found: {}", path),
        Resolution::Redirect(url) => println!("Redirect: {}", url),
        Resolution::StaticFile { path, content_type } => {
            println!("Static file: {} ({})", path.display(), content_type)
        }
        Resolution::Rendered(page) => {
            tracing::info!(
                "Rendered {} from {} ({})",
                page.canonical_path,
                page.source,
                page.content_type
            );
            if let Some(commit) = &page.last_modified {
                tracing::info!(
                    "Last modified {} by {} in {}",
                    commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    commit.author,
                    commit.sha
                );
            }
            print!("{}", page.html);
        }
    }
    Ok(())
}
