//! Show the last-modifying commit of files in a directory

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::Site;

/// Print one line per name: the commit that last modified it, or `unknown`
pub async fn run(site: &Site, dir: &str, names: &[String]) -> Result<()> {
    if site.git().is_none() {
        bail!("{:?} is not inside a git work tree", site.base_dir);
    }

    let wanted: HashSet<String> = names.iter().cloned().collect();
    let found = site.last_modified(dir, &wanted).await?;

    let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
    for name in names {
        match found.get(name) {
            Some(commit) => println!(
                "{:width$}  {}  {}  {}  {}",
                name,
                commit.sha.get(..8).unwrap_or(&commit.sha),
                commit.timestamp.format("%Y-%m-%d"),
                commit.author,
                commit.message,
                width = width
            ),
            None => println!("{:width$}  unknown", name, width = width),
        }
    }
    Ok(())
}
