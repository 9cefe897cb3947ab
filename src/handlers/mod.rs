//! Command handler modules
//!
//! Each handler loads the saved configuration, calls into the archive engine
//! and prints the result. Nothing here decides archive semantics.

pub mod backend;
pub mod init;
pub mod maintenance;
pub mod query;
pub mod restore;
pub mod status;
pub mod sync;

pub use backend::{handle_backend, BackendTarget};
pub use init::handle_init;
pub use maintenance::{handle_migrate, handle_reindex};
pub use query::handle_list;
pub use restore::{handle_restore, handle_restore_config};
pub use status::handle_status;
pub use sync::handle_sync;

use anyhow::Result;
use colored::Colorize;

use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::layout::ArchiveLayout;
use crate::lock::{LockGuard, LockManager, LockState};
use crate::scm::{self, Scm};

/// Saved configuration plus the opened archive repository
pub(crate) struct ArchiveContext {
    pub config: ArchiveConfig,
    pub layout: ArchiveLayout,
    pub repo: Box<dyn Scm>,
}

impl ArchiveContext {
    pub fn load() -> Result<Self> {
        let config = ArchiveConfig::load()?;
        if !scm::is_repo(&config.archive_root) {
            return Err(ArchiveError::ConfigurationMissing(config.archive_root.clone()).into());
        }
        let repo = scm::open(&config.archive_root)?;
        let layout = ArchiveLayout::new(&config.archive_root);
        Ok(ArchiveContext {
            config,
            layout,
            repo,
        })
    }

    /// Take the archive lock for a mutating command; `None` if a sync is running.
    pub fn lock(&self) -> Result<Option<LockGuard>> {
        match LockManager::new(self.layout.lock_path()).acquire()? {
            LockState::Acquired(guard) => Ok(Some(guard)),
            LockState::Busy { pid } => {
                println!(
                    "{} Another sync is running (pid {}). Try again later.",
                    "Busy:".yellow().bold(),
                    pid
                );
                Ok(None)
            }
        }
    }
}

/// Both stdin and stdout are terminals
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)
}

/// Human readable byte count
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
