//! Per-device and root manifests.
//!
//! The per-device manifest (`devices/<slug>/manifest.json`) is the source of
//! truth for that device. The root manifest repeats the current device's
//! fields at the top level, so readers of the older single-device format keep
//! working, and adds a `devices` array aggregating every namespace. Fields are
//! only ever added, and every field has a serde default.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::backend::{BackendConfig, BackendMode};
use crate::codec::uncompressed_len;
use crate::device::DeviceIdentity;
use crate::layout::{ArchiveLayout, ARTIFACT_EXTENSION};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStats {
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub projects: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub uncompressed_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mode: BackendMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub device_slug: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: ConfigStats,
    #[serde(default)]
    pub sessions: SessionStats,
}

impl DeviceManifest {
    pub fn backend(&self) -> BackendConfig {
        BackendConfig {
            mode: self.mode,
            remote: self.remote.clone(),
        }
    }

    fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            slug: self.device_slug.clone(),
            device: self.device.clone(),
            last_sync: self.last_sync,
            session_count: self.sessions.files,
            backup_size_bytes: self.sessions.size_bytes + self.config.size_bytes,
        }
    }
}

/// One entry of the root manifest's `devices` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub slug: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default)]
    pub backup_size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootManifest {
    #[serde(flatten)]
    pub current: DeviceManifest,
    #[serde(default)]
    pub devices: Vec<DeviceSummary>,
}

pub struct ManifestWriter<'a> {
    layout: &'a ArchiveLayout,
}

impl<'a> ManifestWriter<'a> {
    pub fn new(layout: &'a ArchiveLayout) -> Self {
        ManifestWriter { layout }
    }

    pub fn read_device(&self, slug: &str) -> Result<Option<DeviceManifest>> {
        read_json(&self.layout.device_manifest(slug))
    }

    pub fn read_root(&self) -> Result<Option<RootManifest>> {
        read_json(&self.layout.root_manifest())
    }

    /// Backend settings: explicit request, else what the device manifest says, else hosted.
    pub fn resolve_backend(&self, slug: &str, explicit: Option<&BackendConfig>) -> Result<BackendConfig> {
        if let Some(explicit) = explicit {
            return Ok(explicit.clone());
        }
        if let Some(existing) = self.read_device(slug)? {
            return Ok(existing.backend());
        }
        Ok(BackendConfig::default())
    }

    /// Recompute statistics and write both manifests for `identity`.
    ///
    /// `last_sync` of `None` keeps the timestamp already on disk, which is what
    /// a backend mode change wants. Safe on a brand-new archive: the device
    /// directory is created if needed.
    pub fn write(
        &self,
        identity: &DeviceIdentity,
        backend: Option<&BackendConfig>,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<DeviceManifest> {
        let slug = identity.slug.as_str();
        let previous = self.read_device(slug)?;
        let backend = self.resolve_backend(slug, backend)?;

        let manifest = DeviceManifest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: backend.mode,
            remote: backend.remote,
            device: identity.name.clone(),
            device_slug: slug.to_string(),
            user: current_user(),
            last_sync: last_sync.or_else(|| previous.and_then(|p| p.last_sync)),
            config: config_stats(&self.layout.config_dir(slug))?,
            sessions: session_stats(&self.layout.sessions_dir(slug))?,
        };

        fs::create_dir_all(self.layout.device_dir(slug)).with_context(|| {
            format!("Failed to create {}", self.layout.device_dir(slug).display())
        })?;
        write_json_atomic(&self.layout.device_manifest(slug), &manifest)?;
        self.write_root(&manifest)?;

        Ok(manifest)
    }

    /// Rebuild the root manifest from every device manifest on disk.
    pub fn write_root(&self, current: &DeviceManifest) -> Result<RootManifest> {
        let mut devices = Vec::new();
        for slug in self.layout.device_slugs()? {
            match self.read_device(&slug) {
                Ok(Some(manifest)) => devices.push(manifest.summary()),
                Ok(None) => log::debug!("Device namespace {slug} has no manifest yet"),
                Err(e) => log::warn!("Skipping unreadable manifest for {slug}: {e:#}"),
            }
        }

        let root = RootManifest {
            current: current.clone(),
            devices,
        };
        write_json_atomic(&self.layout.root_manifest(), &root)?;
        Ok(root)
    }
}

/// Count and size every file of the config tier
pub fn config_stats(dir: &Path) -> Result<ConfigStats> {
    let mut stats = ConfigStats::default();
    for file in files_under(dir)? {
        stats.files += 1;
        stats.size_bytes += fs::metadata(&file)?.len();
    }
    Ok(stats)
}

/// Count and size the session tier, reading original sizes from gzip trailers.
///
/// Only artifacts sitting directly in a project directory count as sessions,
/// matching the session index. Sizes cover every file, nested ones included.
pub fn session_stats(dir: &Path) -> Result<SessionStats> {
    let mut stats = SessionStats::default();
    if !dir.is_dir() {
        return Ok(stats);
    }

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        stats.projects += 1;
        for child in fs::read_dir(entry.path())? {
            let child = child?;
            if child.file_type()?.is_file() && is_artifact(&child.path()) {
                stats.files += 1;
            }
        }
    }

    for file in files_under(dir)? {
        let size = fs::metadata(&file)?.len();
        stats.size_bytes += size;
        stats.uncompressed_bytes += if is_artifact(&file) {
            uncompressed_len(&file)?
        } else {
            size
        };
    }
    Ok(stats)
}

fn is_artifact(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
}

fn files_under(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Read a JSON document, `None` if the file does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write pretty JSON through a temp file and rename
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    serde_json::to_writer_pretty(&mut temp, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    temp.write_all(b"\n")?;
    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, GzipCodec};
    use tempfile::TempDir;

    fn identity(slug: &str) -> DeviceIdentity {
        DeviceIdentity {
            name: format!("{slug}-host"),
            slug: slug.to_string(),
            created_at: Utc::now(),
        }
    }

    fn add_session(layout: &ArchiveLayout, slug: &str, project: &str, uuid: &str, body: &str) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("s.jsonl");
        fs::write(&src, body).unwrap();
        GzipCodec::default()
            .compress_file(&src, &layout.session_artifact(slug, project, uuid))
            .unwrap();
    }

    #[test]
    fn test_write_on_fresh_archive() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());
        add_session(&layout, "laptop", "p1", "s1", "{\"x\":1}\n");
        add_session(&layout, "laptop", "p2", "s2", "{\"y\":22}\n");
        fs::create_dir_all(layout.config_dir("laptop")).unwrap();
        fs::write(layout.config_dir("laptop").join("settings.json"), "{}").unwrap();

        let now = Utc::now();
        let manifest = ManifestWriter::new(&layout)
            .write(&identity("laptop"), None, Some(now))
            .unwrap();

        assert_eq!(manifest.sessions.files, 2);
        assert_eq!(manifest.sessions.projects, 2);
        assert_eq!(manifest.sessions.uncompressed_bytes, 8 + 9);
        assert_eq!(manifest.config.files, 1);
        assert_eq!(manifest.config.size_bytes, 2);
        assert_eq!(manifest.mode, BackendMode::Hosted);
        assert_eq!(manifest.last_sync, Some(now));
        assert!(layout.device_manifest("laptop").exists());
    }

    #[test]
    fn test_nested_session_files_are_not_sessions() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());
        add_session(&layout, "laptop", "p1", "aaaa", "{}\n");
        let project = layout.sessions_dir("laptop").join("p1");
        add_session(&layout, "laptop", "p1/aaaa/subagents", "agent-1", "{}\n");
        fs::create_dir_all(project.join("aaaa/tool-results")).unwrap();
        fs::write(project.join("aaaa/tool-results/r.txt"), "out").unwrap();

        let manifest = ManifestWriter::new(&layout)
            .write(&identity("laptop"), None, Some(Utc::now()))
            .unwrap();
        let index = crate::index::SessionIndex::rebuild(&layout).unwrap();

        assert_eq!(manifest.sessions.files, 1);
        assert_eq!(manifest.sessions.files as usize, index.len());
        assert_eq!(manifest.sessions.projects, 1);
        assert_eq!(manifest.sessions.uncompressed_bytes, 3 + 3 + 3);
    }

    #[test]
    fn test_root_aggregates_all_devices_and_keeps_top_level_fields() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());
        add_session(&layout, "desktop", "p1", "a", "{}\n");
        add_session(&layout, "laptop", "p1", "b", "{}\n");
        add_session(&layout, "laptop", "p1", "c", "{}\n");

        let writer = ManifestWriter::new(&layout);
        writer.write(&identity("desktop"), None, Some(Utc::now())).unwrap();
        let current = writer.write(&identity("laptop"), None, Some(Utc::now())).unwrap();

        let root = writer.read_root().unwrap().unwrap();
        assert_eq!(root.current, current);
        assert_eq!(root.devices.len(), 2);
        assert_eq!(root.devices[0].slug, "desktop");
        assert_eq!(root.devices[0].session_count, 1);
        assert_eq!(root.devices[1].session_count, 2);

        // Older readers only know the flat fields
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(layout.root_manifest()).unwrap()).unwrap();
        assert_eq!(raw["deviceSlug"], "laptop");
        assert_eq!(raw["sessions"]["files"], 2);
        assert!(raw["devices"].is_array());
    }

    #[test]
    fn test_backend_resolution_order() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());
        let writer = ManifestWriter::new(&layout);
        let id = identity("laptop");

        assert_eq!(writer.resolve_backend("laptop", None).unwrap().mode, BackendMode::Hosted);

        let custom = BackendConfig {
            mode: BackendMode::Custom,
            remote: Some("git@example.com:me/archive.git".to_string()),
        };
        writer.write(&id, Some(&custom), None).unwrap();

        // On-disk value wins when nothing explicit is given
        let resolved = writer.resolve_backend("laptop", None).unwrap();
        assert_eq!(resolved, custom);

        let none = BackendConfig::none();
        assert_eq!(writer.resolve_backend("laptop", Some(&none)).unwrap(), none);
    }

    #[test]
    fn test_mode_change_keeps_last_sync() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path());
        let writer = ManifestWriter::new(&layout);
        let id = identity("laptop");

        let synced_at = Utc::now();
        writer.write(&id, None, Some(synced_at)).unwrap();
        let after = writer.write(&id, Some(&BackendConfig::none()), None).unwrap();

        assert_eq!(after.last_sync, Some(synced_at));
        assert_eq!(after.mode, BackendMode::None);
    }

    #[test]
    fn test_legacy_root_manifest_parses() {
        let legacy = r#"{
            "version": "0.1.0",
            "mode": "hosted",
            "device": "old-box",
            "user": "me",
            "lastSync": "2025-12-01T10:00:00Z",
            "config": {"files": 3, "sizeBytes": 100},
            "sessions": {"files": 7, "projects": 2, "sizeBytes": 900, "uncompressedBytes": 5000}
        }"#;
        let root: RootManifest = serde_json::from_str(legacy).unwrap();
        assert_eq!(root.current.device, "old-box");
        assert_eq!(root.current.sessions.files, 7);
        assert!(root.current.device_slug.is_empty());
        assert!(root.devices.is_empty());
    }
}
