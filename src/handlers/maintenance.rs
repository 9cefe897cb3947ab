//! `migrate` and `reindex`.

use anyhow::Result;
use colored::Colorize;

use super::ArchiveContext;
use crate::device::DeviceIdentity;
use crate::index::SessionIndex;
use crate::migrate::{MigrationOutcome, NamespaceMigrator};

/// Run the namespace migration on its own, without a sync
pub fn handle_migrate() -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let Some(_guard) = ctx.lock()? else {
        return Ok(());
    };

    let device = DeviceIdentity::load_or_create(
        &ctx.config.device_state_path(),
        ctx.config.device_name.as_deref(),
    )?;

    match NamespaceMigrator::new(ctx.repo.as_ref(), &ctx.layout).migrate(&device)? {
        MigrationOutcome::NotNeeded => {
            println!("{}", "Archive already uses device namespaces.".green());
        }
        MigrationOutcome::Migrated { slug, moved } => {
            println!(
                "{} Moved {} into devices/{}",
                "✓".green().bold(),
                moved.join(", "),
                slug.cyan()
            );
        }
    }
    Ok(())
}

/// Rebuild `session-index.json` from the archive tree
pub fn handle_reindex() -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let Some(_guard) = ctx.lock()? else {
        return Ok(());
    };

    let index = SessionIndex::rebuild_and_save(&ctx.layout)?;
    println!(
        "{} Indexed {} sessions",
        "✓".green().bold(),
        index.len()
    );
    Ok(())
}
