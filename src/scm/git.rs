//! Git SCM backend using CLI commands.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::Scm;

/// Git SCM implementation using the git CLI.
pub struct GitScm {
    workdir: PathBuf,
}

/// Build a git command that never stops to ask for credentials.
fn git_command() -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

impl GitScm {
    /// Open an existing Git repository.
    pub fn open(path: &Path) -> Result<Self> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if !path.join(".git").exists() {
            return Err(anyhow!(
                "Not a git repository: '{}' (no .git directory)",
                path.display()
            ));
        }

        Ok(Self { workdir: path })
    }

    /// Initialize a new Git repository.
    pub fn init(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory '{}'", path.display()))?;

        let output = git_command()
            .args(["init"])
            .current_dir(path)
            .output()
            .context("Failed to run 'git init'")?;

        if !output.status.success() {
            return Err(anyhow!(
                "git init failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let scm = Self::open(path)?;
        scm.configure_identity();
        Ok(scm)
    }

    /// Give the repository a committer identity if the user has none configured.
    fn configure_identity(&self) {
        if !self.git_succeeds(&["config", "user.name"]) {
            let _ = self.run_git(&["config", "user.name", "Claude Code Archive"]);
        }
        if !self.git_succeeds(&["config", "user.email"]) {
            let _ = self.run_git(&["config", "user.email", "claude-code-archive@local"]);
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        git_command()
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("Failed to run 'git {}'", args.join(" ")))
    }

    /// Run a git command and return stdout as a string.
    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;

        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a git command, returning Ok if it succeeds (ignoring stdout).
    fn run_git_ok(&self, args: &[&str]) -> Result<()> {
        self.run_git(args)?;
        Ok(())
    }

    /// Check if a git command succeeds (exit code 0).
    fn git_succeeds(&self, args: &[&str]) -> bool {
        self.output(args)
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn has_head(&self) -> bool {
        self.git_succeeds(&["rev-parse", "--verify", "--quiet", "HEAD"])
    }

    fn rebase_in_progress(&self) -> bool {
        let git_dir = self.workdir.join(".git");
        git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
    }

    fn remote_has_branch(&self, remote: &str, branch: &str) -> Result<bool> {
        let heads = self.run_git(&["ls-remote", "--heads", remote, branch])?;
        Ok(!heads.is_empty())
    }
}

impl Scm for GitScm {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn current_branch(&self) -> Result<String> {
        self.run_git(&["branch", "--show-current"])
    }

    fn current_commit_hash(&self) -> Result<String> {
        self.run_git(&["rev-parse", "HEAD"])
    }

    fn stage_all(&self) -> Result<()> {
        self.run_git_ok(&["add", "-A"])
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.run_git_ok(&["commit", "--quiet", "-m", message])
    }

    fn has_changes(&self) -> Result<bool> {
        let output = self.run_git(&["status", "--porcelain"])?;
        Ok(!output.is_empty())
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.run_git_ok(&["remote", "add", name, url])
    }

    fn has_remote(&self, name: &str) -> bool {
        self.git_succeeds(&["remote", "get-url", name])
    }

    fn get_remote_url(&self, name: &str) -> Result<String> {
        self.run_git(&["remote", "get-url", name])
    }

    fn set_remote_url(&self, name: &str, url: &str) -> Result<()> {
        self.run_git_ok(&["remote", "set-url", name, url])
    }

    fn remove_remote(&self, name: &str) -> Result<()> {
        self.run_git_ok(&["remote", "remove", name])
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        let output = self.output(&["push", "--quiet", "-u", remote, branch])?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "Failed to push to remote '{}': {}\n\n\
                Possible causes:\n\
                1. Authentication failed - ensure credentials are configured\n\
                2. No permission to push to this repository\n\
                3. Network connectivity issues\n\n\
                For HTTPS: Run 'git config --global credential.helper store' and try again\n\
                For SSH: Ensure SSH keys are set up with 'ssh -T git@github.com'",
                remote,
                stderr.trim()
            ));
        }

        Ok(())
    }

    fn pull_rebase(&self, remote: &str, branch: &str) -> Result<()> {
        // A brand-new remote has nothing to rebase onto yet
        if !self.remote_has_branch(remote, branch)? {
            log::debug!("Remote '{}' has no branch '{}' yet, skipping pull", remote, branch);
            return Ok(());
        }

        let output = self.output(&["pull", "--rebase", "--quiet", remote, branch])?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if self.rebase_in_progress() {
            if let Err(e) = self.run_git_ok(&["rebase", "--abort"]) {
                log::error!("Failed to abort rebase: {e:#}");
            }
        }

        Err(anyhow!(
            "Failed to rebase onto '{}/{}': {}",
            remote,
            branch,
            stderr
        ))
    }

    fn probe_remote(&self, url: &str) -> Result<()> {
        self.run_git(&["ls-remote", "--quiet", url])
            .map(|_| ())
            .with_context(|| format!("Remote '{}' is not reachable", url))
    }

    fn gc(&self) -> Result<()> {
        self.run_git_ok(&["gc", "--auto", "--quiet"])
    }

    fn discard_changes(&self) -> Result<()> {
        if self.has_head() {
            self.run_git_ok(&["reset", "--hard", "--quiet", "HEAD"])?;
        } else {
            // Nothing committed yet: just empty the index
            let _ = self.run_git(&["rm", "-r", "--cached", "--quiet", "--ignore-unmatch", "."]);
        }
        self.run_git_ok(&["clean", "-fd", "--quiet"])
    }

    fn revert_head(&self) -> Result<()> {
        self.run_git_ok(&["revert", "--no-edit", "HEAD"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm::git_available;
    use tempfile::TempDir;

    fn repo() -> Option<(TempDir, GitScm)> {
        if !git_available() {
            return None;
        }
        let temp = TempDir::new().unwrap();
        let scm = GitScm::init(temp.path()).unwrap();
        Some((temp, scm))
    }

    #[test]
    fn test_git_init_and_open() {
        let Some((temp, scm)) = repo() else { return };

        assert!(temp.path().join(".git").exists());
        assert_eq!(scm.workdir(), temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_git_stage_commit() {
        let Some((temp, scm)) = repo() else { return };

        assert!(!scm.has_changes().unwrap());

        std::fs::write(temp.path().join("test.txt"), "hello").unwrap();
        assert!(scm.has_changes().unwrap());

        scm.stage_all().unwrap();
        scm.commit("Initial commit").unwrap();
        assert!(!scm.has_changes().unwrap());

        let hash = scm.current_commit_hash().unwrap();
        assert_eq!(hash.len(), 40);
    }

    #[test]
    fn test_git_remote() {
        let Some((_temp, scm)) = repo() else { return };

        assert!(!scm.has_remote("origin"));
        scm.ensure_remote("origin", "https://example.invalid/a.git").unwrap();
        assert!(scm.has_remote("origin"));
        scm.ensure_remote("origin", "https://example.invalid/b.git").unwrap();
        assert_eq!(
            scm.get_remote_url("origin").unwrap(),
            "https://example.invalid/b.git"
        );
        assert!(!scm.has_remote("upstream"));
    }

    #[test]
    fn test_discard_changes_removes_untracked_and_restores_tracked() {
        let Some((temp, scm)) = repo() else { return };
        let tracked = temp.path().join("kept.txt");
        std::fs::write(&tracked, "v1").unwrap();
        scm.stage_all().unwrap();
        scm.commit("base").unwrap();

        std::fs::write(&tracked, "v2").unwrap();
        std::fs::create_dir_all(temp.path().join("new")).unwrap();
        std::fs::write(temp.path().join("new/file.txt"), "x").unwrap();

        scm.discard_changes().unwrap();
        assert_eq!(std::fs::read_to_string(&tracked).unwrap(), "v1");
        assert!(!temp.path().join("new").exists());
        assert!(!scm.has_changes().unwrap());
    }

    #[test]
    fn test_revert_head() {
        let Some((temp, scm)) = repo() else { return };
        let file = temp.path().join("a.txt");
        std::fs::write(&file, "one").unwrap();
        scm.stage_all().unwrap();
        scm.commit("one").unwrap();
        std::fs::write(&file, "two").unwrap();
        scm.stage_all().unwrap();
        scm.commit("two").unwrap();

        scm.revert_head().unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "one");
    }

    #[test]
    fn test_push_and_pull_rebase_against_bare_remote() {
        let Some((temp, scm)) = repo() else { return };
        let bare = TempDir::new().unwrap();
        let status = Command::new("git")
            .args(["init", "--bare", "--quiet"])
            .current_dir(bare.path())
            .status()
            .unwrap();
        assert!(status.success());
        let url = bare.path().to_string_lossy().to_string();

        scm.probe_remote(&url).unwrap();
        scm.ensure_remote("origin", &url).unwrap();

        std::fs::write(temp.path().join("a.txt"), "one").unwrap();
        scm.stage_all().unwrap();
        scm.commit("one").unwrap();
        let branch = scm.current_branch().unwrap();

        // Empty remote: nothing to rebase onto
        scm.pull_rebase("origin", &branch).unwrap();
        scm.push("origin", &branch).unwrap();
        scm.pull_rebase("origin", &branch).unwrap();
    }

    #[test]
    fn test_probe_missing_remote_fails() {
        let Some((temp, scm)) = repo() else { return };
        let missing = temp.path().join("does-not-exist.git");
        assert!(scm.probe_remote(&missing.to_string_lossy()).is_err());
    }
}
