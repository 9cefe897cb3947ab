//! `status`: show the archive, this device and every known device namespace.

use anyhow::Result;
use colored::Colorize;
use std::fs;

use super::{format_bytes, ArchiveContext};
use crate::device::DeviceIdentity;
use crate::index::SessionIndex;
use crate::lock::is_process_alive;
use crate::manifest::ManifestWriter;
use crate::VerbosityLevel;

pub fn handle_status(verbosity: VerbosityLevel) -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let writer = ManifestWriter::new(&ctx.layout);

    println!("{}", "=== Claude Code Archive ===".bold().cyan());
    println!();
    println!(
        "{} {}",
        "Archive:".bold(),
        ctx.layout.root().display().to_string().cyan()
    );
    println!(
        "{} {}",
        "Source:".bold(),
        ctx.config.source_root.display()
    );
    if let Ok(branch) = ctx.repo.current_branch() {
        println!("{} {}", "Branch:".bold(), branch.cyan());
    }

    match DeviceIdentity::load(&ctx.config.device_state_path())? {
        Some(device) => {
            println!("{} {} ({})", "Device:".bold(), device.name, device.slug.cyan());
            let manifest = writer.read_device(&device.slug)?;
            let backend = writer.resolve_backend(&device.slug, None)?;
            print!("{} {}", "Backend:".bold(), backend.mode.to_string().cyan());
            match &backend.remote {
                Some(remote) => println!(" -> {remote}"),
                None => println!(),
            }
            match manifest.and_then(|m| m.last_sync) {
                Some(at) => println!("{} {}", "Last sync:".bold(), at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("{} {}", "Last sync:".bold(), "never".yellow()),
            }
        }
        None => println!("{} {}", "Device:".bold(), "not registered yet (run sync)".yellow()),
    }

    if ctx.layout.has_legacy_layout() {
        println!(
            "\n{} archive uses the flat layout; the next sync migrates it into devices/",
            "Note:".yellow().bold()
        );
    }

    if let Some(pid) = running_sync_pid(&ctx) {
        println!("\n{} sync in progress (pid {})", "Busy:".yellow().bold(), pid);
    }

    let index = SessionIndex::load_or_rebuild(&ctx.layout)?;
    println!("\n{} {}", "Archived sessions:".bold(), index.len());

    if let Some(root) = writer.read_root()? {
        if !root.devices.is_empty() {
            println!("\n{}", "Devices:".bold());
            for device in &root.devices {
                let last = device
                    .last_sync
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "  {} {:>5} sessions  {:>10}  last sync {}",
                    format!("{:<20}", device.slug).cyan(),
                    device.session_count,
                    format_bytes(device.backup_size_bytes),
                    last
                );
            }
        }
    }

    if verbosity == VerbosityLevel::Verbose {
        let dirty = ctx.repo.has_changes()?;
        println!(
            "\n{} {}",
            "Working tree:".bold(),
            if dirty { "uncommitted changes".yellow() } else { "clean".green() }
        );
    }

    Ok(())
}

fn running_sync_pid(ctx: &ArchiveContext) -> Option<u32> {
    let content = fs::read_to_string(ctx.layout.lock_path()).ok()?;
    let pid = content.trim().parse().ok()?;
    is_process_alive(pid).then_some(pid)
}
