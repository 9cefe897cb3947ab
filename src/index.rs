//! Derived catalog of every archived session across all device namespaces.
//!
//! The index is a cache: it is rebuilt from scratch on every sync, is never
//! committed, and can be deleted at any time.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::layout::{ArchiveLayout, ARTIFACT_EXTENSION};
use crate::manifest::{read_json, write_json_atomic};

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndexEntry {
    pub uuid: String,
    pub project_id: String,
    /// Slug of the device namespace holding the artifact
    pub device: String,
    pub size_bytes: u64,
    /// RFC 3339 UTC, second precision, so date prefixes compare as strings
    pub archived_at: String,
}

impl SessionIndexEntry {
    /// File name of the artifact backing this entry
    pub fn artifact_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.uuid)
    }

    /// `device/project/uuid`, used when listing candidates
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.device, self.project_id, self.uuid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub sessions: Vec<SessionIndexEntry>,
}

impl SessionIndex {
    /// Scan every device namespace and build a fresh index.
    ///
    /// Entries come out in (device, project, uuid) order, so two rebuilds of
    /// the same tree produce identical session lists.
    pub fn rebuild(layout: &ArchiveLayout) -> Result<Self> {
        let mut sessions = Vec::new();

        for device in layout.device_slugs()? {
            let sessions_dir = layout.sessions_dir(&device);
            if !sessions_dir.is_dir() {
                continue;
            }

            for project in sorted_entries(&sessions_dir)? {
                let project_dir = sessions_dir.join(&project);
                if !project_dir.is_dir() {
                    continue;
                }

                for file_name in sorted_entries(&project_dir)? {
                    let path = project_dir.join(&file_name);
                    if let Some(entry) = index_entry(&path, &device, &project)? {
                        sessions.push(entry);
                    }
                }
            }
        }

        Ok(SessionIndex {
            version: INDEX_VERSION,
            generated_at: Utc::now(),
            sessions,
        })
    }

    /// Rebuild and write `session-index.json`
    pub fn rebuild_and_save(layout: &ArchiveLayout) -> Result<Self> {
        let index = Self::rebuild(layout)?;
        write_json_atomic(&layout.index_path(), &index)?;
        log::info!("Indexed {} archived sessions", index.sessions.len());
        Ok(index)
    }

    /// Read the index file; rebuild in memory (without writing) if it is missing or unreadable
    pub fn load_or_rebuild(layout: &ArchiveLayout) -> Result<Self> {
        match read_json::<SessionIndex>(&layout.index_path()) {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Self::rebuild(layout),
            Err(e) => {
                log::warn!("Session index unreadable, rebuilding in memory: {e:#}");
                Self::rebuild(layout)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn index_entry(path: &Path, device: &str, project: &str) -> Result<Option<SessionIndexEntry>> {
    if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
        return Ok(None);
    }
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    if !metadata.is_file() {
        return Ok(None);
    }
    let Some(uuid) = path.file_stem().and_then(|s| s.to_str()) else {
        return Ok(None);
    };

    let archived_at: DateTime<Utc> = metadata
        .modified()
        .with_context(|| format!("Failed to read mtime of {}", path.display()))?
        .into();

    Ok(Some(SessionIndexEntry {
        uuid: uuid.to_string(),
        project_id: project.to_string(),
        device: device.to_string(),
        size_bytes: metadata.len(),
        archived_at: archived_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}

fn sorted_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}
