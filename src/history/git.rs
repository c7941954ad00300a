//! Git repository access through the `git` command line
//!
//! Every operation, reads included, runs under one repository-wide lock:
//! the index and working copy are shared mutable state.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::{resolve_last_modified, Commit, CommitGraph, TreeEntries};
use crate::error::{Error, Result};

/// Field and record separators used in `git log` output
const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%at%x1f%an%x1f%s%x1e";

/// Name and email recorded on a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A git work tree containing the source root
#[derive(Debug)]
pub struct GitRepository {
    toplevel: PathBuf,
    /// Source root relative to the top level, `/`-terminated or empty
    prefix: String,
    lock: Mutex<()>,
}

impl GitRepository {
    /// Open the repository that contains `source_root`
    pub async fn open(source_root: impl AsRef<Path>) -> Result<Self> {
        let dir = source_root.as_ref();
        let toplevel = run_git(dir, &["rev-parse", "--show-toplevel"], &[]).await?;
        let prefix = run_git(dir, &["rev-parse", "--show-prefix"], &[]).await?;
        tracing::debug!("Opened git repository at {}", toplevel.trim());
        Ok(Self {
            toplevel: PathBuf::from(toplevel.trim()),
            prefix: prefix.trim().to_string(),
            lock: Mutex::new(()),
        })
    }

    /// Top-level directory of the work tree
    pub fn toplevel(&self) -> &Path {
        &self.toplevel
    }

    /// Last-modifying commit for each of `names` inside `parent`. The whole
    /// walk holds the repository lock.
    pub async fn last_modified(
        &self,
        parent: &str,
        names: &HashSet<String>,
    ) -> Result<HashMap<String, Commit>> {
        let _guard = self.lock.lock().await;
        resolve_last_modified(&Unlocked(self), parent, names).await
    }

    /// Up to `max_count` commits that touched `path`, newest first
    pub async fn log_file(&self, path: &str, max_count: usize) -> Result<Vec<Commit>> {
        let _guard = self.lock.lock().await;
        self.log(path, Some(max_count)).await
    }

    /// Stage `path` (or its removal) and commit it
    pub async fn commit(
        &self,
        author: &Signature,
        committer: &Signature,
        path: &str,
        message: &str,
        remove: bool,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let full = self.repo_path(path);

        if remove {
            self.git(&["rm", "-q", "--ignore-unmatch", "--", &full], &[])
                .await?;
        } else {
            self.git(&["add", "--", &full], &[]).await?;
        }

        let author_arg = format!("--author={} <{}>", author.name, author.email);
        self.git(
            &[
                "-c",
                "commit.gpgsign=false",
                "commit",
                "-q",
                "-m",
                message,
                &author_arg,
            ],
            &committer_env(committer),
        )
        .await?;
        tracing::info!("Committed {} as {}", path, author.name);
        Ok(())
    }

    /// Rebase onto the upstream branch and push
    pub async fn pull_push(&self, user: &Signature) -> Result<()> {
        let _guard = self.lock.lock().await;
        let env = committer_env(user);
        self.git(&["pull", "--rebase", "-q"], &env).await?;
        self.git(&["push", "-q"], &env).await?;
        Ok(())
    }

    async fn log(&self, path: &str, max_count: Option<usize>) -> Result<Vec<Commit>> {
        let full = self.repo_path(path);
        let pathspec = if full.is_empty() { ".".to_string() } else { full };
        let mut args = vec!["--literal-pathspecs".to_string(), "log".to_string()];
        if let Some(n) = max_count {
            args.push(format!("-n{}", n));
        }
        args.push(LOG_FORMAT.to_string());
        args.push("--".to_string());
        args.push(pathspec);

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.git(&args, &[]).await?;
        Ok(parse_log(&output))
    }

    async fn ls_tree(&self, sha: &str, parent: &str) -> Result<Option<TreeEntries>> {
        let dir = self.repo_path(parent);
        let output = if dir.is_empty() {
            self.git(&["ls-tree", "-z", sha], &[]).await?
        } else {
            let spec = format!("{}/", dir);
            self.git(&["--literal-pathspecs", "ls-tree", "-z", sha, "--", &spec], &[])
                .await?
        };

        let entries = parse_ls_tree(&output, &dir);
        Ok((!entries.is_empty()).then_some(entries))
    }

    /// Path relative to the top level for a path relative to the source root
    fn repo_path(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        let path = if path == "." { "" } else { path };
        format!("{}{}", self.prefix, path)
            .trim_end_matches('/')
            .to_string()
    }

    async fn git(&self, args: &[&str], env: &[(&str, &str)]) -> Result<String> {
        run_git(&self.toplevel, args, env).await
    }
}

/// Graph view for use while the caller already holds the lock
struct Unlocked<'a>(&'a GitRepository);

#[async_trait]
impl CommitGraph for Unlocked<'_> {
    async fn commits(&self, parent: &str) -> Result<Vec<Commit>> {
        self.0.log(parent, None).await
    }

    async fn entries(&self, commit: &Commit, parent: &str) -> Result<Option<TreeEntries>> {
        self.0.ls_tree(&commit.sha, parent).await
    }
}

fn committer_env(user: &Signature) -> [(&'static str, &str); 2] {
    [
        ("GIT_COMMITTER_NAME", user.name.as_str()),
        ("GIT_COMMITTER_EMAIL", user.email.as_str()),
    ]
}

/// Run git in `dir`, returning stdout. A non-zero exit becomes
/// [`Error::Vcs`] carrying stderr.
async fn run_git(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> Result<String> {
    let operation = args
        .iter()
        .find(|a| !a.starts_with('-') && !a.contains('='))
        .copied()
        .unwrap_or("git")
        .to_string();
    tracing::debug!(target: "git", "Executing command: git -C {} {}", dir.display(), args.join(" "));

    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = cmd.output().await.map_err(|e| Error::Vcs {
        command: operation.clone(),
        message: format!("failed to run git: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(target: "git", "Command failed with exit code: {:?}", output.status.code());
        return Err(Error::Vcs {
            command: operation,
            message: stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse records written with [`LOG_FORMAT`]
fn parse_log(output: &str) -> Vec<Commit> {
    output
        .split(RECORD_SEP)
        .map(|record| record.trim_matches(['\n', '\r']))
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let mut fields = record.splitn(4, FIELD_SEP);
            let sha = fields.next()?.to_string();
            let secs: i64 = fields.next()?.parse().ok()?;
            let author = fields.next()?.to_string();
            let message = fields.next().unwrap_or_default().to_string();
            Some(Commit {
                sha,
                message,
                author,
                timestamp: Utc.timestamp_opt(secs, 0).single()?,
            })
        })
        .collect()
}

/// Parse `ls-tree -z` output (`<mode> <type> <oid>\t<path>\0`) into entry
/// names relative to `dir`
fn parse_ls_tree(output: &str, dir: &str) -> TreeEntries {
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    };

    output
        .split('\0')
        .filter_map(|line| {
            let (meta, path) = line.split_once('\t')?;
            let oid = meta.split_whitespace().nth(2)?;
            let name = path.strip_prefix(prefix.as_str()).unwrap_or(path);
            Some((name.to_string(), oid.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn init_repo(dir: &Path) {
        run_git(dir, &["init", "-q"], &[]).await.unwrap();
    }

    fn ada() -> Signature {
        Signature::new("Ada", "ada@example.com")
    }

    #[test]
    fn test_parse_log() {
        let output = "abc\u{1f}1700000000\u{1f}Ada\u{1f}Fix typo\u{1e}\ndef\u{1f}1600000000\u{1f}Bob\u{1f}\u{1e}\n";
        let commits = parse_log(output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "abc");
        assert_eq!(commits[0].message, "Fix typo");
        assert_eq!(commits[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(commits[1].author, "Bob");
        assert_eq!(commits[1].message, "");
    }

    #[test]
    fn test_parse_ls_tree() {
        let output = "100644 blob aaa\tdocs/a.md\0040000 tree bbb\tdocs/sub\0";
        let entries = parse_ls_tree(output, "docs");
        assert_eq!(entries.get("a.md").map(String::as_str), Some("aaa"));
        assert_eq!(entries.get("sub").map(String::as_str), Some("bbb"));

        let root = parse_ls_tree("100644 blob ccc\tREADME\0", "");
        assert_eq!(root.get("README").map(String::as_str), Some("ccc"));
    }

    #[tokio::test]
    async fn test_commit_and_resolve_last_modified() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path()).await;
        let repo = GitRepository::open(dir.path()).await.unwrap();

        fs::write(dir.path().join("a.txt"), "one").unwrap();
        repo.commit(&ada(), &ada(), "a.txt", "add a", false).await.unwrap();
        fs::write(dir.path().join("a.txt"), "two").unwrap();
        repo.commit(&ada(), &ada(), "a.txt", "edit a", false).await.unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        repo.commit(&ada(), &ada(), "b.txt", "add b", false).await.unwrap();

        let names: HashSet<String> = ["a.txt", "b.txt", "c.txt"].iter().map(|s| s.to_string()).collect();
        let found = repo.last_modified(".", &names).await.unwrap();

        assert_eq!(found["a.txt"].message, "edit a");
        assert_eq!(found["a.txt"].author, "Ada");
        assert_eq!(found["b.txt"].message, "add b");
        assert!(!found.contains_key("c.txt"));

        let log = repo.log_file("a.txt", 10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sha, found["a.txt"].sha);
    }

    #[tokio::test]
    async fn test_source_root_in_subdirectory() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path()).await;
        let site = dir.path().join("site");
        fs::create_dir_all(site.join("docs")).unwrap();

        let repo = GitRepository::open(&site).await.unwrap();
        fs::write(site.join("docs/guide.md"), "# Guide").unwrap();
        repo.commit(&ada(), &ada(), "docs/guide.md", "add guide", false)
            .await
            .unwrap();
        fs::write(site.join("docs/guide.md"), "# Guide\n\nSteps").unwrap();
        repo.commit(&ada(), &ada(), "docs/guide.md", "expand guide", false)
            .await
            .unwrap();

        let names: HashSet<String> = ["guide.md".to_string()].into_iter().collect();
        let found = repo.last_modified("docs", &names).await.unwrap();
        assert_eq!(found["guide.md"].message, "expand guide");
    }

    #[tokio::test]
    async fn test_remove_commits_deletion() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path()).await;
        let repo = GitRepository::open(dir.path()).await.unwrap();

        fs::write(dir.path().join("old.md"), "x").unwrap();
        fs::write(dir.path().join("keep.md"), "k").unwrap();
        repo.commit(&ada(), &ada(), "old.md", "add old", false).await.unwrap();
        repo.commit(&ada(), &ada(), "keep.md", "add keep", false).await.unwrap();
        repo.commit(&ada(), &ada(), "old.md", "remove old", true).await.unwrap();

        assert!(!dir.path().join("old.md").exists());
        let names: HashSet<String> = ["old.md".to_string()].into_iter().collect();
        let found = repo.last_modified("", &names).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_open_outside_repository_fails() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let err = GitRepository::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Vcs { .. }));
    }
}
