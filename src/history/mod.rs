//! Last-modified provenance from version-control history
//!
//! The resolver walks the commits that touched a directory from newest to
//! oldest and compares consecutive trees of that directory. The first time a
//! pending entry differs between a commit and its predecessor, the newer
//! commit is the one that last modified it. Commits where the directory
//! does not exist are passed over; if it is already gone at the newest
//! commit, nothing in it has a last-modifying commit.

pub mod git;

pub use git::{GitRepository, Signature};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::Result;

/// A commit as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
    /// Authored time
    pub timestamp: DateTime<Utc>,
}

/// Entries of one directory at one commit: entry name -> content hash
pub type TreeEntries = HashMap<String, String>;

/// Read access to a commit graph
#[async_trait]
pub trait CommitGraph: Send + Sync {
    /// Commits that touched `parent` (a `/`-separated directory relative to
    /// the source root, empty for the root), newest first
    async fn commits(&self, parent: &str) -> Result<Vec<Commit>>;

    /// Entries directly inside `parent` at `commit`, or `None` when the
    /// directory does not exist in that commit
    async fn entries(&self, commit: &Commit, parent: &str) -> Result<Option<TreeEntries>>;
}

/// Find the commit that last modified each of `names` inside `parent`.
///
/// Names without an answer are absent from the result and callers treat them
/// as unknown. That covers names never committed, names deleted by the newest
/// commit, and names unchanged since the oldest commit that has the directory.
pub async fn resolve_last_modified<G>(
    graph: &G,
    parent: &str,
    names: &HashSet<String>,
) -> Result<HashMap<String, Commit>>
where
    G: CommitGraph + ?Sized,
{
    let parent = normalize_parent(parent);
    let mut pending: HashSet<String> = names.clone();
    let mut found = HashMap::new();
    let mut newer: Option<(Commit, TreeEntries)> = None;

    for commit in graph.commits(&parent).await? {
        if pending.is_empty() {
            break;
        }

        // A commit without the directory contributes nothing; the newer tree
        // is compared against the next commit that has it
        let Some(tree) = graph.entries(&commit, &parent).await? else {
            if newer.is_none() {
                // Gone at the newest commit: every entry has been deleted
                pending.clear();
            }
            continue;
        };
        match &newer {
            Some((newer_commit, newer_tree)) => {
                attribute(newer_commit, newer_tree, &tree, &mut pending, &mut found);
            }
            // Names missing from the latest tree have been deleted
            None => pending.retain(|name| tree.contains_key(name)),
        }
        newer = Some((commit, tree));
    }

    tracing::debug!(
        "Resolved {} of {} names under '{}'",
        found.len(),
        names.len(),
        parent
    );
    Ok(found)
}

/// Assign `commit` to every pending name whose entry in `newer` is missing
/// from or different in `older`
fn attribute(
    commit: &Commit,
    newer: &TreeEntries,
    older: &TreeEntries,
    pending: &mut HashSet<String>,
    found: &mut HashMap<String, Commit>,
) {
    let changed: Vec<String> = pending
        .iter()
        .filter(|name| match newer.get(*name) {
            Some(hash) => older.get(*name) != Some(hash),
            None => false,
        })
        .cloned()
        .collect();

    for name in changed {
        pending.remove(&name);
        found.insert(name, commit.clone());
    }
}

/// `/`-separated directory without leading, trailing or `.` segments
fn normalize_parent(parent: &str) -> String {
    parent
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}
