//! One archive sync: lock, migrate, scan, manifest, index, commit, remote.

mod init;

pub use init::{ensure_gitignore, init_archive, InitReport};

use anyhow::Result;
use chrono::Utc;

use crate::backend::{BackendAdapter, RemoteOutcome, StorageWarning};
use crate::codec::GzipCodec;
use crate::config::ArchiveConfig;
use crate::device::DeviceIdentity;
use crate::error::ArchiveError;
use crate::filter::SensitiveFilter;
use crate::index::SessionIndex;
use crate::layout::ArchiveLayout;
use crate::lock::{LockManager, LockState};
use crate::manifest::{DeviceManifest, ManifestWriter};
use crate::migrate::{MigrationOutcome, NamespaceMigrator};
use crate::scanner::{ChangeScanner, ScanReport};
use crate::scm::Scm;

/// Per-run switches
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Commit message; a summary of the changes is used when absent
    pub message: Option<String>,
    /// Pull and push in remote backend modes
    pub push: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            message: None,
            push: true,
        }
    }
}

#[derive(Debug)]
pub struct SyncReport {
    pub device: DeviceIdentity,
    pub migration: MigrationOutcome,
    pub sessions: ScanReport,
    pub config: ScanReport,
    pub manifest: DeviceManifest,
    pub indexed: usize,
    /// Hash of the commit made by this run, if anything changed
    pub commit: Option<String>,
    pub remote: RemoteOutcome,
    pub storage_warning: Option<StorageWarning>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Another process holds the archive lock; nothing was touched
    Skipped { pid: u32 },
    Completed(Box<SyncReport>),
}

/// Run a full sync of `config.source_root` into the archive.
pub fn run_sync(config: &ArchiveConfig, scm: &dyn Scm, opts: &SyncOptions) -> Result<SyncOutcome> {
    let layout = ArchiveLayout::new(&config.archive_root);
    if !layout.root().is_dir() {
        return Err(ArchiveError::ConfigurationMissing(layout.root().to_path_buf()).into());
    }

    let _guard = match LockManager::new(layout.lock_path()).acquire()? {
        LockState::Acquired(guard) => guard,
        LockState::Busy { pid } => {
            log::info!("Sync already running (pid {pid}), skipping");
            return Ok(SyncOutcome::Skipped { pid });
        }
    };

    // The lock file must be ignored before anything is staged
    ensure_gitignore(&layout)?;

    let device = DeviceIdentity::load_or_create(
        &config.device_state_path(),
        config.device_name.as_deref(),
    )?;

    let migration = NamespaceMigrator::new(scm, &layout).migrate(&device)?;

    let codec = GzipCodec::default();
    let filter = SensitiveFilter::from_config(config)?;
    let scanner = ChangeScanner::new(&codec, &filter);

    let sessions = scanner.scan_sessions(&config.projects_dir(), &layout.sessions_dir(&device.slug))?;
    let config_report = scanner.scan_config(
        &config.source_root,
        &config.config_include,
        &layout.config_dir(&device.slug),
    )?;

    let manifest = ManifestWriter::new(&layout).write(&device, None, Some(Utc::now()))?;
    let index = SessionIndex::rebuild_and_save(&layout)?;

    let message = opts
        .message
        .clone()
        .unwrap_or_else(|| commit_message(&device, &sessions, &config_report));
    let commit = init::commit_if_changed(scm, &message)?;
    if let Some(hash) = &commit {
        log::info!("Committed {}", hash);
    }

    let adapter = BackendAdapter::new(scm, &layout, config);
    let remote = adapter.sync_remote(&manifest.backend(), opts.push);
    let storage_warning = adapter.storage_check(config.storage_warning_bytes)?;
    if let Some(warning) = &storage_warning {
        log::warn!(
            "Archive is {} bytes, above the {} byte warning threshold",
            warning.size_bytes,
            warning.threshold_bytes
        );
    }

    Ok(SyncOutcome::Completed(Box::new(SyncReport {
        device,
        migration,
        sessions,
        config: config_report,
        manifest,
        indexed: index.len(),
        commit,
        remote,
        storage_warning,
    })))
}

fn commit_message(device: &DeviceIdentity, sessions: &ScanReport, config: &ScanReport) -> String {
    let mut message = format!(
        "Archive {}: {} added, {} updated, {} removed",
        device.slug, sessions.added, sessions.updated, sessions.removed
    );
    if config.has_changes() {
        message.push_str(&format!(
            "; config {} added, {} updated, {} removed",
            config.added, config.updated, config.removed
        ));
    }
    message
}
