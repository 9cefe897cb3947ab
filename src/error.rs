//! Typed failure conditions surfaced by the archive engine.
//!
//! Everything in the crate propagates `anyhow::Error`; the variants below are
//! attached to those errors so callers (and tests) can recover the exact
//! condition with `downcast_ref::<ArchiveError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive has not been initialized (no config file or no repository).
    #[error("Archive not initialized at {}. Run 'claude-code-archive init' first.", .0.display())]
    ConfigurationMissing(PathBuf),

    /// A restore identifier matched more than one archived session.
    #[error(
        "Identifier '{identifier}' matches {} sessions; use a more specific identifier:\n  {}",
        .candidates.len(),
        .candidates.join("\n  ")
    )]
    AmbiguousIdentifier {
        identifier: String,
        candidates: Vec<String>,
    },

    /// No archived session matched a restore identifier.
    #[error("No archived session matches '{0}'")]
    NotFound(String),

    /// A denylisted filename was found in an inbound tree. Nothing was written.
    #[error("Security: refusing to import sensitive file '{}'", .0.display())]
    SecurityViolation(PathBuf),

    /// Pull or push against the configured remote failed. The local commit is kept.
    #[error("Remote '{remote}' unavailable: {reason}")]
    RemoteUnavailable { remote: String, reason: String },

    /// Restructuring the flat layout into device namespaces failed and was rolled back.
    #[error("Namespace migration failed: {0}")]
    MigrationFailure(String),

    /// Pre-flight validation for a backend mode change failed; the mode was not changed.
    #[error("Cannot switch backend to '{target}': {reason}")]
    InvalidTransition { target: String, reason: String },
}

impl ArchiveError {
    /// Whether this condition must abort the run instead of being reported.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ArchiveError::RemoteUnavailable { .. })
    }
}
