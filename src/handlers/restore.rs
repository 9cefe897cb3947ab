//! `restore` and `restore-config`: write archived data back into the source tree.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use inquire::Confirm;

use super::{is_interactive, ArchiveContext};
use crate::codec::GzipCodec;
use crate::device::DeviceIdentity;
use crate::filter::SensitiveFilter;
use crate::restore::{RestoreEngine, RestoreOutcome, RestoreSummary};
use crate::VerbosityLevel;

pub fn handle_restore(
    identifier: Option<String>,
    all: bool,
    device: Option<String>,
    overwrite: bool,
    verbosity: VerbosityLevel,
) -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let codec = GzipCodec::default();
    let engine = RestoreEngine::new(&ctx.layout, &ctx.config.source_root, &codec);

    if all {
        if overwrite && !confirm_overwrite("sessions")? {
            println!("\n{}", "Restore cancelled.".yellow());
            return Ok(());
        }
        let summary = engine.restore_all(device.as_deref(), overwrite)?;
        print_summary("sessions", &summary, verbosity);
        return Ok(());
    }

    let identifier = identifier.ok_or_else(|| anyhow!("Give a session id or use --all"))?;
    match engine.restore_one(&identifier, overwrite)? {
        RestoreOutcome::Restored(path) => {
            println!("{} Restored {}", "✓".green().bold(), path.display());
        }
        RestoreOutcome::Skipped(path) => {
            println!(
                "{} {} already exists; use --overwrite to replace it",
                "Skipped:".yellow(),
                path.display()
            );
        }
    }
    Ok(())
}

pub fn handle_restore_config(
    device: Option<String>,
    overwrite: bool,
    verbosity: VerbosityLevel,
) -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let device = match device {
        Some(device) => device,
        None => DeviceIdentity::load(&ctx.config.device_state_path())?
            .map(|d| d.slug)
            .ok_or_else(|| anyhow!("This device has not synced yet; pass --device <slug>"))?,
    };

    if overwrite && !confirm_overwrite("config files")? {
        println!("\n{}", "Restore cancelled.".yellow());
        return Ok(());
    }

    let codec = GzipCodec::default();
    let filter = SensitiveFilter::from_config(&ctx.config)?;
    let engine = RestoreEngine::new(&ctx.layout, &ctx.config.source_root, &codec);
    let summary = engine.restore_config(&device, &filter, overwrite)?;
    print_summary("config files", &summary, verbosity);
    Ok(())
}

/// Ask before overwriting in bulk; non-interactive runs proceed
fn confirm_overwrite(what: &str) -> Result<bool> {
    if !is_interactive() {
        return Ok(true);
    }
    Confirm::new(&format!("Overwrite existing {what} with archived copies?"))
        .with_default(false)
        .with_help_message("Local files that differ from the archive will be replaced")
        .prompt()
        .context("Failed to get confirmation")
}

fn print_summary(what: &str, summary: &RestoreSummary, verbosity: VerbosityLevel) {
    if verbosity == VerbosityLevel::Quiet {
        println!(
            "Restored {}, skipped {}, failed {}",
            summary.restored, summary.skipped, summary.failed
        );
        return;
    }

    println!("{}", format!("Restore {what}").cyan().bold());
    println!("  {} {}", "Restored:".green(), summary.restored);
    println!("  {} {}", "Skipped:".yellow(), summary.skipped);
    if summary.failed > 0 {
        println!("  {} {}", "Failed:".red(), summary.failed);
        for (item, error) in &summary.failures {
            println!("    {} {}: {}", "✗".red(), item, error);
        }
    }
    if summary.skipped > 0 && verbosity == VerbosityLevel::Verbose {
        println!("\n{} rerun with --overwrite to replace existing files", "Hint:".cyan());
    }
}
