//! One-time move of a flat archive (`sessions/`, `config/` at the root) into
//! a per-device namespace under `devices/<slug>/`.
//!
//! The move is a single commit. If anything goes wrong before that commit the
//! working tree is reset to HEAD; if the post-commit check fails the commit is
//! reverted. Either way the caller gets [`ArchiveError::MigrationFailure`].

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

use crate::backend::BackendConfig;
use crate::device::DeviceIdentity;
use crate::error::ArchiveError;
use crate::layout::ArchiveLayout;
use crate::manifest::{read_json, DeviceManifest, ManifestWriter};
use crate::scm::Scm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Already namespaced, or nothing to move
    NotNeeded,
    /// Tiers moved into `devices/<slug>/`
    Migrated { slug: String, moved: Vec<String> },
}

pub struct NamespaceMigrator<'a> {
    scm: &'a dyn Scm,
    layout: &'a ArchiveLayout,
}

impl<'a> NamespaceMigrator<'a> {
    pub fn new(scm: &'a dyn Scm, layout: &'a ArchiveLayout) -> Self {
        NamespaceMigrator { scm, layout }
    }

    pub fn needs_migration(&self) -> bool {
        self.layout.has_legacy_layout()
    }

    pub fn migrate(&self, identity: &DeviceIdentity) -> Result<MigrationOutcome> {
        if !self.needs_migration() {
            return Ok(MigrationOutcome::NotNeeded);
        }

        log::info!("Migrating flat archive into devices/{}", identity.slug);

        // Legacy root manifest carries the backend settings and last sync time
        let legacy: Option<DeviceManifest> = read_json(&self.layout.root_manifest())
            .unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable legacy manifest: {e:#}");
                None
            });

        self.commit_pending()
            .map_err(|e| failure(format!("could not commit pending changes: {e:#}")))?;

        let moved = match self.move_and_commit(identity, legacy.as_ref()) {
            Ok(moved) => moved,
            Err(e) => {
                if let Err(reset_err) = self.scm.discard_changes() {
                    log::error!("Failed to reset working tree: {reset_err:#}");
                }
                return Err(failure(format!("{e:#}")));
            }
        };

        if let Err(e) = self.verify(identity) {
            log::error!("Migration check failed, reverting: {e:#}");
            if let Err(revert_err) = self.scm.revert_head() {
                log::error!("Failed to revert migration commit: {revert_err:#}");
            }
            return Err(failure(format!("verification failed: {e:#}")));
        }

        log::info!("Moved {} into devices/{}", moved.join(", "), identity.slug);
        Ok(MigrationOutcome::Migrated {
            slug: identity.slug.clone(),
            moved,
        })
    }

    fn commit_pending(&self) -> Result<()> {
        if self.scm.has_changes()? {
            self.scm.stage_all()?;
            self.scm.commit("Snapshot before device namespace migration")?;
        }
        Ok(())
    }

    fn move_and_commit(
        &self,
        identity: &DeviceIdentity,
        legacy: Option<&DeviceManifest>,
    ) -> Result<Vec<String>> {
        let slug = identity.slug.as_str();
        let device_dir = self.layout.device_dir(slug);
        fs::create_dir_all(&device_dir)
            .with_context(|| format!("Failed to create {}", device_dir.display()))?;

        let mut moved = Vec::new();
        let tiers = [
            (self.layout.legacy_sessions_dir(), self.layout.sessions_dir(slug)),
            (self.layout.legacy_config_dir(), self.layout.config_dir(slug)),
        ];
        for (from, to) in &tiers {
            if from.is_dir() {
                move_dir(from, to)?;
                if let Some(name) = from.file_name() {
                    moved.push(name.to_string_lossy().to_string());
                }
            }
        }

        let backend = legacy
            .map(DeviceManifest::backend)
            .unwrap_or_else(BackendConfig::default);
        let last_sync = legacy.and_then(|m| m.last_sync);
        ManifestWriter::new(self.layout).write(identity, Some(&backend), last_sync)?;

        self.scm.stage_all()?;
        self.scm
            .commit(&format!("Migrate archive to per-device layout ({slug})"))?;
        Ok(moved)
    }

    fn verify(&self, identity: &DeviceIdentity) -> Result<()> {
        if self.layout.legacy_sessions_dir().exists() || self.layout.legacy_config_dir().exists() {
            return Err(anyhow!("legacy tier directories still present"));
        }
        let manifest = ManifestWriter::new(self.layout)
            .read_device(&identity.slug)?
            .ok_or_else(|| anyhow!("device manifest missing"))?;
        if manifest.device_slug != identity.slug {
            return Err(anyhow!(
                "device manifest names '{}', expected '{}'",
                manifest.device_slug,
                identity.slug
            ));
        }
        if self.scm.has_changes()? {
            return Err(anyhow!("working tree not clean after migration commit"));
        }
        Ok(())
    }
}

fn failure(reason: String) -> anyhow::Error {
    ArchiveError::MigrationFailure(reason).into()
}

fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(anyhow!("{} already exists", to.display()));
    }
    fs::rename(from, to)
        .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))
}
