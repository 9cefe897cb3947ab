//! Hosted repository provisioning through the GitHub CLI (`gh`).

use anyhow::{anyhow, bail, Context, Result};
use std::process::{Command, Output};

use super::RepoProvisioner;

/// Provisions private repositories with the `gh` command line tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct GhProvisioner;

impl GhProvisioner {
    pub fn new() -> Self {
        GhProvisioner
    }

    fn gh(&self, args: &[&str]) -> Result<Output> {
        Command::new("gh")
            .args(args)
            .env("GH_PROMPT_DISABLED", "1")
            .output()
            .with_context(|| format!("Failed to run 'gh {}'", args.join(" ")))
    }

    fn repo_url(&self, name: &str) -> Result<Option<String>> {
        let output = self.gh(&["repo", "view", name, "--json", "url", "--jq", ".url"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if url.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}.git", url.trim_end_matches(".git"))))
    }
}

/// Check if the GitHub CLI is installed on the system.
pub fn is_installed() -> bool {
    Command::new("gh")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

impl RepoProvisioner for GhProvisioner {
    fn check_ready(&self) -> Result<()> {
        if !is_installed() {
            bail!("GitHub CLI 'gh' is not installed. See https://cli.github.com/");
        }

        let output = self.gh(&["auth", "status"])?;
        if !output.status.success() {
            bail!(
                "GitHub CLI is not authenticated. Run 'gh auth login' first.\n{}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn ensure_private_repo(&self, name: &str) -> Result<String> {
        if let Some(url) = self.repo_url(name)? {
            log::debug!("Hosted repository {} already exists", name);
            return Ok(url);
        }

        log::info!("Creating private repository {}", name);
        let output = self.gh(&["repo", "create", name, "--private"])?;
        if !output.status.success() {
            return Err(anyhow!(
                "gh repo create failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        self.repo_url(name)?
            .ok_or_else(|| anyhow!("Repository '{}' was created but cannot be viewed", name))
    }
}
