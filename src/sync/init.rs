use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::BackendConfig;
use crate::config::ArchiveConfig;
use crate::device::DeviceIdentity;
use crate::layout::{ignored_entries, ArchiveLayout};
use crate::manifest::ManifestWriter;
use crate::scm::{self, Scm};

/// What `init_archive` did
#[derive(Debug)]
pub struct InitReport {
    pub archive_root: PathBuf,
    pub created_repo: bool,
    pub device: DeviceIdentity,
    pub config_path: PathBuf,
}

/// Create (or adopt) the archive repository and save the configuration.
///
/// Re-running on an initialized archive only refreshes `.gitignore` and the
/// saved config; it never rewrites history or resets the backend mode.
pub fn init_archive(config: &ArchiveConfig, config_path: &Path) -> Result<InitReport> {
    let root = &config.archive_root;
    let created_repo = !scm::is_repo(root);
    let repo = scm::init(root)
        .with_context(|| format!("Failed to initialize archive at {}", root.display()))?;
    let layout = ArchiveLayout::new(root);

    ensure_gitignore(&layout)?;

    let device = DeviceIdentity::load_or_create(
        &config.device_state_path(),
        config.device_name.as_deref(),
    )?;

    // New archives start local-only until a backend is chosen
    let writer = ManifestWriter::new(&layout);
    if !layout.has_legacy_layout() && writer.read_device(&device.slug)?.is_none() {
        writer.write(&device, Some(&BackendConfig::none()), None)?;
    }

    commit_if_changed(repo.as_ref(), "Initialize claude-code-archive")?;

    config.save_to(config_path)?;
    log::info!(
        "Archive initialized at {} for device {}",
        root.display(),
        device.slug
    );

    Ok(InitReport {
        archive_root: root.clone(),
        created_repo,
        device,
        config_path: config_path.to_path_buf(),
    })
}

/// Make sure `.gitignore` lists the index and lock files. Returns true if it changed.
pub fn ensure_gitignore(layout: &ArchiveLayout) -> Result<bool> {
    let path = layout.gitignore_path();
    let mut contents = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let missing: Vec<&str> = ignored_entries()
        .into_iter()
        .filter(|entry| !contents.lines().any(|line| line.trim() == *entry))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    for entry in missing {
        contents.push_str(entry);
        contents.push('\n');
    }
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Stage and commit everything if the tree is dirty. Returns the new commit hash.
pub(crate) fn commit_if_changed(repo: &dyn Scm, message: &str) -> Result<Option<String>> {
    if !repo.has_changes()? {
        return Ok(None);
    }
    repo.stage_all()?;
    repo.commit(message)?;
    Ok(repo.current_commit_hash().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_gitignore_created_once() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());

        assert!(ensure_gitignore(&layout).unwrap());
        assert!(!ensure_gitignore(&layout).unwrap());

        let contents = fs::read_to_string(layout.gitignore_path()).unwrap();
        assert_eq!(contents, "session-index.json\n.archive.lock\n");
    }

    #[test]
    fn test_gitignore_keeps_user_lines() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());
        fs::write(layout.gitignore_path(), "*.tmp\nsession-index.json").unwrap();

        assert!(ensure_gitignore(&layout).unwrap());
        let contents = fs::read_to_string(layout.gitignore_path()).unwrap();
        assert_eq!(contents, "*.tmp\nsession-index.json\n.archive.lock\n");
    }
}
