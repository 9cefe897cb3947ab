//! On-disk layout of the archive repository.
//!
//! ```text
//! <root>/
//!   manifest.json            root manifest (current device + aggregation)
//!   session-index.json       derived index, git-ignored
//!   .archive.lock            sync lock, git-ignored
//!   devices/<slug>/
//!     manifest.json          per-device manifest
//!     config/...             config tier
//!     sessions/<project>/<uuid>.gz
//! ```

use std::path::{Path, PathBuf};

pub const DEVICES_DIR: &str = "devices";
pub const SESSIONS_DIR: &str = "sessions";
pub const CONFIG_DIR: &str = "config";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "session-index.json";
pub const LOCK_FILE: &str = ".archive.lock";
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Extension of line-delimited session logs in the source tree.
pub const LOG_EXTENSION: &str = "jsonl";
/// Extension of compressed session artifacts in the archive.
pub const ARTIFACT_EXTENSION: &str = "gz";

/// Resolves every path inside an archive root.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn root_manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn gitignore_path(&self) -> PathBuf {
        self.root.join(GITIGNORE_FILE)
    }

    pub fn devices_dir(&self) -> PathBuf {
        self.root.join(DEVICES_DIR)
    }

    pub fn device_dir(&self, slug: &str) -> PathBuf {
        self.devices_dir().join(slug)
    }

    pub fn device_manifest(&self, slug: &str) -> PathBuf {
        self.device_dir(slug).join(MANIFEST_FILE)
    }

    pub fn sessions_dir(&self, slug: &str) -> PathBuf {
        self.device_dir(slug).join(SESSIONS_DIR)
    }

    pub fn config_dir(&self, slug: &str) -> PathBuf {
        self.device_dir(slug).join(CONFIG_DIR)
    }

    /// Path of the compressed artifact for one session.
    pub fn session_artifact(&self, slug: &str, project_id: &str, uuid: &str) -> PathBuf {
        self.sessions_dir(slug)
            .join(project_id)
            .join(format!("{uuid}.{ARTIFACT_EXTENSION}"))
    }

    /// Tier directories of the pre-namespace layout, directly under the root.
    pub fn legacy_sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    pub fn legacy_config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    /// True when artifacts still live directly under the root with no namespaces.
    pub fn has_legacy_layout(&self) -> bool {
        !self.devices_dir().exists()
            && (self.legacy_sessions_dir().is_dir() || self.legacy_config_dir().is_dir())
    }

    /// Slugs of every device namespace present on disk, sorted.
    pub fn device_slugs(&self) -> std::io::Result<Vec<String>> {
        let dir = self.devices_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut slugs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    slugs.push(name.to_string());
                }
            }
        }
        slugs.sort();
        Ok(slugs)
    }
}

/// Entries the archive's `.gitignore` must carry.
pub fn ignored_entries() -> [&'static str; 2] {
    [INDEX_FILE, LOCK_FILE]
}

/// True if `name` is safe to use as a single path component.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
