//! Incremental change detection between the source tree and the archive.
//!
//! A source file is (re)written into the archive only when its artifact is
//! missing or older than the source. Session logs are compressed through the
//! [`Codec`]; everything else is copied verbatim. Denylisted filenames are
//! never written.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::codec::{copy_verbatim, Codec};
use crate::filter::SensitiveFilter;
use crate::layout::{ARTIFACT_EXTENSION, LOG_EXTENSION};

/// What kind of source file we are looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Log,
    Other,
}

impl SourceKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(LOG_EXTENSION) => SourceKind::Log,
            _ => SourceKind::Other,
        }
    }
}

/// Decision for a single source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Add,
    Update,
    Unchanged,
}

/// Counts produced by one scan
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Project directories removed from the archive
    pub removed: usize,
    /// Files skipped (or purged) because they matched the sensitive denylist
    pub skipped_sensitive: usize,
    /// True when removal was suppressed because the source had no projects
    pub removal_suppressed: bool,
}

impl ScanReport {
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }

    fn record(&mut self, change: Change) {
        match change {
            Change::Add => self.added += 1,
            Change::Update => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: &ScanReport) {
        self.added += other.added;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
        self.skipped_sensitive += other.skipped_sensitive;
        self.removal_suppressed |= other.removal_suppressed;
    }
}

pub struct ChangeScanner<'a> {
    codec: &'a dyn Codec,
    filter: &'a SensitiveFilter,
}

impl<'a> ChangeScanner<'a> {
    pub fn new(codec: &'a dyn Codec, filter: &'a SensitiveFilter) -> Self {
        ChangeScanner { codec, filter }
    }

    /// Decide whether `source` needs to be written to `artifact`
    pub fn plan(source: &Path, artifact: &Path) -> Change {
        let artifact_mtime = match modified(artifact) {
            Some(mtime) => mtime,
            None if artifact.exists() => return Change::Update,
            None => return Change::Add,
        };

        match modified(source) {
            Some(source_mtime) if source_mtime <= artifact_mtime => Change::Unchanged,
            _ => Change::Update,
        }
    }

    /// Archive path for a source file relative to its tier root
    pub fn artifact_path(dest_root: &Path, relative: &Path) -> PathBuf {
        let dest = dest_root.join(relative);
        match SourceKind::of(relative) {
            SourceKind::Log => dest.with_extension(ARTIFACT_EXTENSION),
            SourceKind::Other => dest,
        }
    }

    /// Mirror every project under `projects_src` into `sessions_dest`.
    ///
    /// Archived projects missing from the source are removed, except when the
    /// source has no projects at all (an unmounted or wiped source must not
    /// empty the archive).
    pub fn scan_sessions(&self, projects_src: &Path, sessions_dest: &Path) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let source_projects = list_dirs(projects_src)?;

        for project in &source_projects {
            let project_src = projects_src.join(project);
            let project_dest = sessions_dest.join(project);
            self.mirror_tree(&project_src, &project_dest, &mut report)?;
        }

        let archived_projects = list_dirs(sessions_dest)?;
        let stale: Vec<&String> = archived_projects
            .iter()
            .filter(|p| !source_projects.contains(*p))
            .collect();

        if stale.is_empty() {
            return Ok(report);
        }

        if source_projects.is_empty() {
            log::warn!(
                "Source {} has no projects; keeping {} archived project(s) untouched",
                projects_src.display(),
                archived_projects.len()
            );
            report.removal_suppressed = true;
            return Ok(report);
        }

        for project in stale {
            let path = sessions_dest.join(project);
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            log::info!("Removed archived project {project} (no longer in source)");
            report.removed += 1;
        }

        Ok(report)
    }

    /// Mirror the configured config entries of `source_root` into `config_dest`.
    pub fn scan_config(
        &self,
        source_root: &Path,
        includes: &[String],
        config_dest: &Path,
    ) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        for entry in includes {
            let src = source_root.join(entry);
            if src.is_dir() {
                self.mirror_tree(&src, &config_dest.join(entry), &mut report)?;
            } else if src.is_file() {
                if self.filter.is_sensitive(&src) {
                    log::warn!("Skipping sensitive file {}", src.display());
                    report.skipped_sensitive += 1;
                    continue;
                }
                let dest = config_dest.join(entry);
                let change = Self::plan(&src, &dest);
                if change != Change::Unchanged {
                    copy_verbatim(&src, &dest)?;
                }
                report.record(change);
            }
        }

        report.skipped_sensitive += self.purge_sensitive(config_dest)?;
        Ok(report)
    }

    fn mirror_tree(&self, src_root: &Path, dest_root: &Path, report: &mut ScanReport) -> Result<()> {
        for entry in WalkDir::new(src_root).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", src_root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let src = entry.path();
            if self.filter.is_sensitive(src) {
                log::warn!("Skipping sensitive file {}", src.display());
                report.skipped_sensitive += 1;
                continue;
            }

            let relative = src.strip_prefix(src_root).unwrap_or(src);
            let artifact = Self::artifact_path(dest_root, relative);
            let change = Self::plan(src, &artifact);

            if change != Change::Unchanged {
                match SourceKind::of(src) {
                    SourceKind::Log => self.codec.compress_file(src, &artifact)?,
                    SourceKind::Other => copy_verbatim(src, &artifact)?,
                };
                log::debug!("{change:?} {}", artifact.display());
            }
            report.record(change);
        }

        Ok(())
    }

    /// Delete denylisted files that made it into an archive tree before the denylist grew
    fn purge_sensitive(&self, root: &Path) -> Result<usize> {
        if !root.exists() {
            return Ok(0);
        }

        let mut purged = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() && self.filter.is_sensitive(entry.path()) {
                fs::remove_file(entry.path())
                    .with_context(|| format!("Failed to purge {}", entry.path().display()))?;
                log::warn!("Purged sensitive file {} from archive", entry.path().display());
                purged += 1;
            }
        }
        Ok(purged)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Names of the immediate subdirectories of `dir` (empty if it does not exist)
fn list_dirs(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(names);
    }

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.insert(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(names)
}
