//! `init`: create the archive repository and save the configuration.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::config::{default_source_root, ArchiveConfig, ConfigManager};
use crate::sync;

/// Default archive location when `--archive` is not given
fn default_archive_root() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".claude-archive"))
}

pub fn handle_init(
    archive: Option<PathBuf>,
    source: Option<PathBuf>,
    device_name: Option<String>,
) -> Result<()> {
    println!("{}", "Initializing Claude Code archive...".cyan().bold());

    let config_path = ConfigManager::config_file_path()?;
    let state_dir = ConfigManager::ensure_config_dir()?;

    // Re-running init keeps settings that were not overridden on the command line
    let mut config = if config_path.exists() {
        ArchiveConfig::load_from(&config_path, &state_dir)?
    } else {
        ArchiveConfig::new(default_archive_root()?, default_source_root()?).with_state_dir(&state_dir)
    };
    if let Some(archive) = archive {
        config.archive_root = archive;
    }
    if let Some(source) = source {
        config.source_root = source;
    }
    if device_name.is_some() {
        config.device_name = device_name;
    }

    let report = sync::init_archive(&config, &config_path)?;

    let verb = if report.created_repo { "Created" } else { "Using" };
    println!(
        "  {} repository at {}",
        verb.green(),
        report.archive_root.display()
    );
    println!(
        "  {} {} ({})",
        "Device:".bold(),
        report.device.name,
        report.device.slug.cyan()
    );
    println!(
        "  {} {}",
        "Config:".bold(),
        report.config_path.display()
    );
    println!("{}", "Archive initialized successfully!".green().bold());
    println!(
        "\n{} claude-code-archive backend hosted   (or: backend custom <url>)",
        "Next steps:".cyan().bold()
    );
    println!("            claude-code-archive sync");

    Ok(())
}
