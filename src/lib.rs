//! # claude-code-archive
//!
//! A personal archival engine for Claude Code state.
//!
//! ## Overview
//!
//! `claude-code-archive` mirrors the chat-session logs under `~/.claude/projects/`
//! and a small configuration profile from `~/.claude` into a compressed,
//! git-backed archive. Each machine writes into its own device namespace, so
//! several computers can share one archive repository without stepping on each
//! other. Archived sessions can be listed, searched and restored.
//!
//! ## Key Features
//!
//! - **Incremental**: only files newer than their archived copy are recompressed
//! - **Multi-device**: `devices/<slug>/` namespaces, with a one-time migration from the flat layout
//! - **Searchable**: a derived index answers "last N", "by date" and "by project" queries
//! - **Safe restore**: never overwrites by default, refuses ambiguous identifiers
//! - **Fail-closed secrets handling**: denylisted files are never archived or imported
//! - **Remote backends**: local only, a hosted private repository, or any git remote
//!
//! ## Architecture
//!
//! - Configuration and identity ([`config`], [`device`], [`layout`])
//! - Archive writing ([`lock`], [`codec`], [`filter`], [`scanner`], [`migrate`], [`manifest`])
//! - Reading back ([`index`], [`query`], [`restore`])
//! - Version control and remotes ([`scm`], [`backend`])
//! - Orchestration and front end ([`sync`], [`handlers`], [`logger`])

/// Remote storage modes and the pull/push cycle.
pub mod backend;

/// Gzip codec for session logs and atomic file writes.
pub mod codec;

/// Platform-agnostic configuration directory management and the archive config file.
///
/// Follows platform conventions (XDG on Linux, Application Support on macOS,
/// AppData on Windows).
pub mod config;

/// Persisted device identity and namespace slug.
pub mod device;

/// Typed error conditions.
pub mod error;

/// Denylist of sensitive filenames.
pub mod filter;

/// Command handlers used by the binary.
pub mod handlers;

/// Derived index of every archived session.
pub mod index;

/// Paths inside the archive root.
pub mod layout;

/// Cross-process sync lock.
pub mod lock;

/// Logging configuration and utilities.
///
/// Sets up logging to stderr (configurable via the `RUST_LOG` environment
/// variable) and a persistent log file in the config directory, with rotation
/// when the file exceeds its size limit.
pub mod logger;

/// Per-device and root manifests.
pub mod manifest;

/// Flat layout to device namespace migration.
pub mod migrate;

/// Session index queries.
pub mod query;

/// Writing archived sessions and config back to the source tree.
pub mod restore;

/// Source tree scanning and incremental archiving.
pub mod scanner;

/// Git access behind a trait.
pub mod scm;

/// A full sync run, plus archive initialization.
pub mod sync;

/// How much the front end prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerbosityLevel {
    Quiet,   // Minimal output
    #[default]
    Normal,  // Standard output
    Verbose, // Detailed output
}
