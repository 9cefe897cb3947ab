use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// Denylist of filename patterns that must never enter (or leave) the archive.
///
/// Patterns are matched case-insensitively against the file name only, so a
/// pattern catches the file at any depth of a tree.
#[derive(Debug, Clone)]
pub struct SensitiveFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl SensitiveFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern.as_ref())
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .with_context(|| format!("Invalid sensitive pattern '{}'", pattern.as_ref()))?;
            builder.add(glob);
        }

        Ok(SensitiveFilter {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            set: builder.build().context("Failed to compile sensitive patterns")?,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check whether a path's file name is denylisted
    pub fn is_sensitive(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.set.is_match(Path::new(name)))
            .unwrap_or(false)
    }

    /// Fail with [`ArchiveError::SecurityViolation`] if any file under `root` is denylisted.
    ///
    /// Intended to run over an inbound tree before anything is written.
    pub fn ensure_clean_tree(&self, root: &Path) -> Result<()> {
        if !root.exists() {
            return Ok(());
        }

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if self.is_sensitive(entry.path()) {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                return Err(ArchiveError::SecurityViolation(relative.to_path_buf()).into());
            }
        }

        Ok(())
    }

    /// Filter built from the default pattern list
    pub fn builtin() -> Result<Self> {
        Self::new(&crate::config::default_sensitive_patterns())
    }

    /// Built-in patterns plus the extra patterns of an archive config
    pub fn from_config(config: &crate::config::ArchiveConfig) -> Result<Self> {
        let patterns: Vec<String> = crate::config::default_sensitive_patterns()
            .into_iter()
            .chain(config.sensitive_patterns.iter().cloned())
            .collect();
        Self::new(&patterns)
    }
}
