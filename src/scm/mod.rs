//! SCM (Source Control Management) abstraction layer.
//!
//! The archive root is a git working tree. Everything that touches history or
//! a remote goes through [`Scm`], so sync, migration and backend switching can
//! be exercised against an in-memory fake in tests.

mod git;

use anyhow::{anyhow, Result};
use std::path::Path;

pub use git::GitScm;

/// Trait for source control management operations.
pub trait Scm: Send + Sync {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Get the current branch name.
    fn current_branch(&self) -> Result<String>;

    /// Get the current commit hash. Fails on a repository with no commits.
    fn current_commit_hash(&self) -> Result<String>;

    /// Stage all changes (add and remove).
    fn stage_all(&self) -> Result<()>;

    /// Commit staged changes with a message.
    fn commit(&self, message: &str) -> Result<()>;

    /// Check if there are uncommitted changes, untracked files included.
    fn has_changes(&self) -> Result<bool>;

    /// Add a remote repository.
    fn add_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Check if a remote exists.
    fn has_remote(&self, name: &str) -> bool;

    /// Get the URL for a remote.
    fn get_remote_url(&self, name: &str) -> Result<String>;

    /// Set or update the URL for a remote.
    fn set_remote_url(&self, name: &str, url: &str) -> Result<()>;

    /// Remove a remote.
    fn remove_remote(&self, name: &str) -> Result<()>;

    /// Push to a remote repository.
    fn push(&self, remote: &str, branch: &str) -> Result<()>;

    /// Fetch and rebase local commits on top of `remote/branch`.
    ///
    /// A rebase that stops on conflicts is aborted before the error is
    /// returned, so the working tree is never left mid-rebase.
    fn pull_rebase(&self, remote: &str, branch: &str) -> Result<()>;

    /// Check that `url` answers as a git remote without changing anything.
    fn probe_remote(&self, url: &str) -> Result<()>;

    /// Opportunistic housekeeping (`git gc --auto`).
    fn gc(&self) -> Result<()>;

    /// Throw away every uncommitted change, untracked files included.
    fn discard_changes(&self) -> Result<()>;

    /// Record a new commit undoing HEAD.
    fn revert_head(&self) -> Result<()>;

    /// Point `name` at `url`, adding the remote if it does not exist yet.
    fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        if self.has_remote(name) {
            if self.get_remote_url(name)? != url {
                self.set_remote_url(name, url)?;
            }
            Ok(())
        } else {
            self.add_remote(name, url)
        }
    }
}

/// Check if a directory is a Git repository.
pub fn is_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Open an existing Git repository.
pub fn open(path: &Path) -> Result<Box<dyn Scm>> {
    if is_repo(path) {
        Ok(Box::new(GitScm::open(path)?))
    } else {
        Err(anyhow!(
            "No Git repository found at '{}'. Expected .git directory.",
            path.display()
        ))
    }
}

/// Initialize a new Git repository, or open the one already there.
pub fn init(path: &Path) -> Result<Box<dyn Scm>> {
    if is_repo(path) {
        return open(path);
    }
    Ok(Box::new(GitScm::init(path)?))
}

/// Whether a usable `git` binary is on PATH.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
