//! Remote storage modes and the pull/push cycle that runs after every commit.
//!
//! The archive is always a local git repository. A backend mode decides what
//! happens to commits afterwards:
//!
//! - `none`: commits stay local
//! - `hosted`: a private repository provisioned through [`RepoProvisioner`]
//! - `custom`: any git remote the user supplies
//!
//! Mode changes go through [`BackendAdapter`], which validates the target
//! before anything is persisted. A failed validation leaves both the manifest
//! and the git remote configuration as they were.

mod hosted;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use walkdir::WalkDir;

use crate::config::ArchiveConfig;
use crate::device::DeviceIdentity;
use crate::error::ArchiveError;
use crate::layout::ArchiveLayout;
use crate::manifest::ManifestWriter;
use crate::scm::Scm;

pub use hosted::{is_installed as gh_installed, GhProvisioner};

/// Repository name used for the hosted backend when none is given
pub const DEFAULT_HOSTED_REPO: &str = "claude-code-archive";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    None,
    #[default]
    Hosted,
    Custom,
}

impl BackendMode {
    pub fn is_remote(self) -> bool {
        !matches!(self, BackendMode::None)
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendMode::None => "none",
            BackendMode::Hosted => "hosted",
            BackendMode::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Backend mode plus the remote address it pushes to, as stored in the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub mode: BackendMode,
    pub remote: Option<String>,
}

impl BackendConfig {
    pub fn none() -> Self {
        BackendConfig {
            mode: BackendMode::None,
            remote: None,
        }
    }

    pub fn with_remote(mode: BackendMode, remote: impl Into<String>) -> Self {
        BackendConfig {
            mode,
            remote: Some(remote.into()),
        }
    }
}

/// Creates and authenticates against hosted repositories.
pub trait RepoProvisioner: Send + Sync {
    /// The provisioning tool is installed and logged in.
    fn check_ready(&self) -> Result<()>;

    /// Make sure a private repository called `name` exists; return its git URL.
    fn ensure_private_repo(&self, name: &str) -> Result<String>;
}

/// Result of the remote half of a sync
#[derive(Debug)]
pub enum RemoteOutcome {
    /// Backend mode is `none`
    Disabled,
    /// Pushing was turned off for this run
    NotPushed,
    /// Rebased onto the remote and pushed
    Pushed { remote: String, branch: String },
    /// The remote could not be reached; the local commit is kept
    Unavailable(ArchiveError),
}

impl RemoteOutcome {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteOutcome::Unavailable(_))
    }
}

/// Archive size compared with the configured ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageWarning {
    pub size_bytes: u64,
    pub threshold_bytes: u64,
}

pub struct BackendAdapter<'a> {
    scm: &'a dyn Scm,
    layout: &'a ArchiveLayout,
    remote_name: &'a str,
    branch: Option<&'a str>,
}

impl<'a> BackendAdapter<'a> {
    pub fn new(scm: &'a dyn Scm, layout: &'a ArchiveLayout, config: &'a ArchiveConfig) -> Self {
        BackendAdapter {
            scm,
            layout,
            remote_name: config.remote_name.as_str(),
            branch: config.branch.as_deref(),
        }
    }

    /// Branch to pull and push: the configured override or the checked-out branch
    pub fn branch(&self) -> Result<String> {
        if let Some(branch) = self.branch {
            return Ok(branch.to_string());
        }
        let branch = self.scm.current_branch()?;
        if branch.is_empty() {
            return Err(anyhow!("Repository is in detached HEAD state; set 'branch' in config"));
        }
        Ok(branch)
    }

    /// Backend currently recorded for this device
    pub fn current(&self, identity: &DeviceIdentity) -> Result<BackendConfig> {
        ManifestWriter::new(self.layout).resolve_backend(&identity.slug, None)
    }

    /// Switch to local-only mode, dropping the configured remote.
    pub fn switch_to_none(&self, identity: &DeviceIdentity) -> Result<BackendConfig> {
        if self.scm.has_remote(self.remote_name) {
            self.scm
                .remove_remote(self.remote_name)
                .with_context(|| format!("Failed to remove remote '{}'", self.remote_name))?;
        }
        let backend = BackendConfig::none();
        self.persist(identity, &backend)?;
        Ok(backend)
    }

    /// Provision (or reuse) a private hosted repository and push to it.
    pub fn switch_to_hosted(
        &self,
        identity: &DeviceIdentity,
        provisioner: &dyn RepoProvisioner,
        repo_name: &str,
    ) -> Result<BackendConfig> {
        let target = BackendMode::Hosted;
        provisioner
            .check_ready()
            .map_err(|e| invalid(target, format!("{e:#}")))?;
        let url = provisioner
            .ensure_private_repo(repo_name)
            .map_err(|e| invalid(target, format!("{e:#}")))?;

        self.attach_remote(target, &url)?;

        let backend = BackendConfig::with_remote(target, url);
        self.persist(identity, &backend)?;
        Ok(backend)
    }

    /// Point the archive at a user supplied git remote.
    pub fn switch_to_custom(&self, identity: &DeviceIdentity, url: &str) -> Result<BackendConfig> {
        let target = BackendMode::Custom;
        validate_remote_url(url).map_err(|reason| invalid(target, reason))?;
        self.scm
            .probe_remote(url)
            .map_err(|e| invalid(target, format!("{e:#}")))?;

        self.attach_remote(target, url)?;

        let backend = BackendConfig::with_remote(target, url);
        self.persist(identity, &backend)?;
        Ok(backend)
    }

    /// Set the remote and test-push; on failure put the previous remote back.
    fn attach_remote(&self, target: BackendMode, url: &str) -> Result<()> {
        let previous = self.scm.get_remote_url(self.remote_name).ok();

        let attempt = self
            .scm
            .ensure_remote(self.remote_name, url)
            .and_then(|_| self.branch())
            .and_then(|branch| self.scm.push(self.remote_name, &branch));

        if let Err(e) = attempt {
            let restored = match previous {
                Some(old) => self.scm.set_remote_url(self.remote_name, &old),
                None if self.scm.has_remote(self.remote_name) => {
                    self.scm.remove_remote(self.remote_name)
                }
                None => Ok(()),
            };
            if let Err(restore_err) = restored {
                log::error!("Failed to restore previous remote: {restore_err:#}");
            }
            return Err(invalid(target, format!("test push failed: {e:#}")));
        }
        Ok(())
    }

    /// Record the new mode in the manifests and commit it.
    fn persist(&self, identity: &DeviceIdentity, backend: &BackendConfig) -> Result<()> {
        ManifestWriter::new(self.layout).write(identity, Some(backend), None)?;
        if self.scm.has_changes()? {
            self.scm.stage_all()?;
            self.scm
                .commit(&format!("Switch backend to {}", backend.mode))?;
        }
        log::info!("Backend mode is now {}", backend.mode);
        Ok(())
    }

    /// Pull-rebase, push, then housekeeping. Never fails: remote problems are reported.
    pub fn sync_remote(&self, backend: &BackendConfig, push: bool) -> RemoteOutcome {
        if !backend.mode.is_remote() {
            return RemoteOutcome::Disabled;
        }
        if !push {
            return RemoteOutcome::NotPushed;
        }

        match self.pull_and_push(backend) {
            Ok(branch) => {
                if let Err(e) = self.scm.gc() {
                    log::warn!("git gc failed: {e:#}");
                }
                RemoteOutcome::Pushed {
                    remote: self.remote_name.to_string(),
                    branch,
                }
            }
            Err(e) => {
                log::warn!("Remote sync failed: {e:#}");
                RemoteOutcome::Unavailable(ArchiveError::RemoteUnavailable {
                    remote: self.remote_name.to_string(),
                    reason: format!("{e:#}"),
                })
            }
        }
    }

    fn pull_and_push(&self, backend: &BackendConfig) -> Result<String> {
        if !self.scm.has_remote(self.remote_name) {
            match &backend.remote {
                Some(url) => self.scm.add_remote(self.remote_name, url)?,
                None => {
                    return Err(anyhow!(
                        "no remote '{}' configured; run 'claude-code-archive backend'",
                        self.remote_name
                    ))
                }
            }
        }

        let branch = self.branch()?;
        self.scm.pull_rebase(self.remote_name, &branch)?;
        self.scm.push(self.remote_name, &branch)?;
        Ok(branch)
    }

    /// Warn when the archive has grown past `threshold` bytes.
    pub fn storage_check(&self, threshold: u64) -> Result<Option<StorageWarning>> {
        let size_bytes = archive_size(self.layout)?;
        if size_bytes > threshold {
            return Ok(Some(StorageWarning {
                size_bytes,
                threshold_bytes: threshold,
            }));
        }
        Ok(None)
    }
}

fn invalid(target: BackendMode, reason: impl Into<String>) -> anyhow::Error {
    ArchiveError::InvalidTransition {
        target: target.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Accept the URL forms git understands for a remote
fn validate_remote_url(url: &str) -> std::result::Result<(), String> {
    const SCHEMES: [&str; 5] = ["https://", "http://", "ssh://", "git@", "file://"];
    if SCHEMES.iter().any(|s| url.starts_with(s)) || std::path::Path::new(url).is_absolute() {
        Ok(())
    } else {
        Err(format!(
            "invalid remote URL '{url}'; expected https://, ssh://, git@host:path, file:// or an absolute path"
        ))
    }
}

/// Bytes used by everything in the archive except git's own object store
pub fn archive_size(layout: &ArchiveLayout) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(layout.root())
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
