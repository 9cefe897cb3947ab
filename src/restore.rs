//! Restore archived sessions (and the config tier) back into the source tree.
//!
//! Existing files are never overwritten unless explicitly asked for. Single
//! restores never guess: an identifier must match exactly one session.

use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::codec::{copy_verbatim, Codec};
use crate::error::ArchiveError;
use crate::filter::SensitiveFilter;
use crate::index::{SessionIndex, SessionIndexEntry};
use crate::layout::{is_safe_component, ArchiveLayout, LOG_EXTENSION};

/// Result of restoring one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(PathBuf),
    /// Destination already existed and overwrite was not requested
    Skipped(PathBuf),
}

/// Aggregate counts for bulk restores
#[derive(Debug, Default, Clone)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    /// (item, error) for every failed item
    pub failures: Vec<(String, String)>,
}

impl RestoreSummary {
    fn record(&mut self, item: String, result: Result<RestoreOutcome>) {
        match result {
            Ok(RestoreOutcome::Restored(_)) => self.restored += 1,
            Ok(RestoreOutcome::Skipped(path)) => {
                log::info!("Skipped {} (already exists)", path.display());
                self.skipped += 1;
            }
            Err(e) => {
                log::warn!("Failed to restore {item}: {e:#}");
                self.failed += 1;
                self.failures.push((item, format!("{e:#}")));
            }
        }
    }
}

pub struct RestoreEngine<'a> {
    layout: &'a ArchiveLayout,
    source_root: &'a Path,
    codec: &'a dyn Codec,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(layout: &'a ArchiveLayout, source_root: &'a Path, codec: &'a dyn Codec) -> Self {
        RestoreEngine {
            layout,
            source_root,
            codec,
        }
    }

    /// Fresh view of what is on disk; restore must not act on a stale index file
    fn index(&self) -> Result<SessionIndex> {
        SessionIndex::rebuild(self.layout)
    }

    /// Find the single entry whose artifact name contains `identifier`.
    pub fn find<'i>(index: &'i SessionIndex, identifier: &str) -> Result<&'i SessionIndexEntry> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ArchiveError::NotFound(identifier.to_string()).into());
        }

        let matches: Vec<&SessionIndexEntry> = index
            .sessions
            .iter()
            .filter(|e| e.artifact_name().contains(identifier))
            .collect();

        match matches.as_slice() {
            [] => Err(ArchiveError::NotFound(identifier.to_string()).into()),
            [only] => Ok(*only),
            many => Err(ArchiveError::AmbiguousIdentifier {
                identifier: identifier.to_string(),
                candidates: many.iter().map(|e| e.label()).collect(),
            }
            .into()),
        }
    }

    fn check_device(device: &str) -> Result<()> {
        if !is_safe_component(device) {
            return Err(anyhow!("Security: refusing unsafe device name '{device}'"));
        }
        Ok(())
    }

    /// Where a session is restored to: `<source>/projects/<project>/<uuid>.jsonl`
    pub fn destination(&self, entry: &SessionIndexEntry) -> Result<PathBuf> {
        for component in [&entry.device, &entry.project_id, &entry.uuid] {
            if !is_safe_component(component) {
                return Err(anyhow!(
                    "Security: refusing unsafe path component '{component}' in {}",
                    entry.label()
                ));
            }
        }

        Ok(self
            .source_root
            .join("projects")
            .join(&entry.project_id)
            .join(format!("{}.{LOG_EXTENSION}", entry.uuid)))
    }

    /// Restore the one session matching `identifier`
    pub fn restore_one(&self, identifier: &str, overwrite: bool) -> Result<RestoreOutcome> {
        let index = self.index()?;
        let entry = Self::find(&index, identifier)?;
        self.restore_entry(entry, overwrite)
    }

    /// Decompress one indexed session into the source tree
    pub fn restore_entry(&self, entry: &SessionIndexEntry, overwrite: bool) -> Result<RestoreOutcome> {
        let dest = self.destination(entry)?;
        if dest.exists() && !overwrite {
            return Ok(RestoreOutcome::Skipped(dest));
        }

        let artifact = self
            .layout
            .session_artifact(&entry.device, &entry.project_id, &entry.uuid);
        if !artifact.is_file() {
            return Err(anyhow!("Archived artifact missing: {}", artifact.display()));
        }

        self.codec
            .decompress_file(&artifact, &dest)
            .with_context(|| format!("Failed to restore {}", entry.label()))?;
        log::info!("Restored {} to {}", entry.label(), dest.display());

        Ok(RestoreOutcome::Restored(dest))
    }

    /// Restore every archived session, optionally only from one device namespace.
    ///
    /// Per-item failures are counted, not propagated. When the same session
    /// exists on several devices only the first copy is written; the others
    /// count as skipped, even with `overwrite`.
    pub fn restore_all(&self, device: Option<&str>, overwrite: bool) -> Result<RestoreSummary> {
        if let Some(device) = device {
            Self::check_device(device)?;
        }
        let index = self.index()?;

        if let Some(device) = device {
            if !self.layout.device_dir(device).is_dir() {
                return Err(ArchiveError::NotFound(format!("device '{device}'")).into());
            }
        }

        let mut summary = RestoreSummary::default();
        let mut written: HashSet<PathBuf> = HashSet::new();
        for entry in index
            .sessions
            .iter()
            .filter(|e| device.map_or(true, |d| e.device == d))
        {
            let result = match self.destination(entry) {
                Ok(dest) if written.contains(&dest) => Ok(RestoreOutcome::Skipped(dest)),
                Ok(_) => self.restore_entry(entry, overwrite),
                Err(e) => Err(e),
            };
            if let Ok(RestoreOutcome::Restored(dest)) = &result {
                written.insert(dest.clone());
            }
            summary.record(entry.label(), result);
        }

        Ok(summary)
    }

    /// Import a device's config tier back into the source root.
    ///
    /// The whole inbound tree is checked against `filter` first; a single
    /// denylisted file aborts the import before anything is written.
    pub fn restore_config(
        &self,
        device: &str,
        filter: &SensitiveFilter,
        overwrite: bool,
    ) -> Result<RestoreSummary> {
        Self::check_device(device)?;
        let config_dir = self.layout.config_dir(device);
        if !config_dir.is_dir() {
            return Err(ArchiveError::NotFound(format!("config of device '{device}'")).into());
        }

        filter.ensure_clean_tree(&config_dir)?;

        let mut summary = RestoreSummary::default();
        for entry in WalkDir::new(&config_dir).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", config_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(&config_dir).unwrap_or(entry.path());
            let dest = self.source_root.join(relative);
            let result = if dest.exists() && !overwrite {
                Ok(RestoreOutcome::Skipped(dest))
            } else {
                copy_verbatim(entry.path(), &dest).map(|_| RestoreOutcome::Restored(dest))
            };
            summary.record(relative.display().to_string(), result);
        }

        Ok(summary)
    }
}
