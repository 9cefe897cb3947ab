//! `sync`: run one archive sync and print what happened.

use anyhow::Result;
use colored::Colorize;

use super::{format_bytes, ArchiveContext};
use crate::backend::RemoteOutcome;
use crate::logger;
use crate::migrate::MigrationOutcome;
use crate::scanner::ScanReport;
use crate::sync::{self, SyncOptions, SyncOutcome, SyncReport};
use crate::VerbosityLevel;

pub fn handle_sync(message: Option<String>, push: bool, verbosity: VerbosityLevel) -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let opts = SyncOptions { message, push };

    if verbosity != VerbosityLevel::Quiet {
        println!("{}", "Archiving Claude Code history...".cyan().bold());
    }

    match sync::run_sync(&ctx.config, ctx.repo.as_ref(), &opts)? {
        SyncOutcome::Skipped { pid } => {
            // Another sync holds the lock; this is not a failure
            let _ = logger::log_to_file(&format!("sync skipped: lock held by pid {pid}"));
            if verbosity == VerbosityLevel::Verbose {
                println!("  {} sync already running (pid {})", "Skipped:".yellow(), pid);
            }
        }
        SyncOutcome::Completed(report) => {
            let _ = logger::log_to_file(&format!(
                "sync {}: sessions +{} ~{} -{}, config +{} ~{} -{}, commit {}",
                report.device.slug,
                report.sessions.added,
                report.sessions.updated,
                report.sessions.removed,
                report.config.added,
                report.config.updated,
                report.config.removed,
                report.commit.as_deref().unwrap_or("none")
            ));
            print_report(&report, verbosity)
        }
    }

    Ok(())
}

fn print_report(report: &SyncReport, verbosity: VerbosityLevel) {
    if verbosity == VerbosityLevel::Quiet {
        println!(
            "Sync complete: {} added, {} updated, {} removed",
            report.sessions.added, report.sessions.updated, report.sessions.removed
        );
        print_remote_problem(&report.remote);
        return;
    }

    if let MigrationOutcome::Migrated { slug, moved } = &report.migration {
        println!(
            "  {} {} into devices/{}",
            "Migrated".green(),
            moved.join(", "),
            slug
        );
    }

    print_scan("Sessions:", &report.sessions, verbosity);
    print_scan("Config:", &report.config, verbosity);

    if report.sessions.removal_suppressed {
        println!(
            "  {} no projects found in the source; archived projects were kept",
            "Warning:".yellow().bold()
        );
    }
    let sensitive = report.sessions.skipped_sensitive + report.config.skipped_sensitive;
    if sensitive > 0 {
        println!(
            "  {} {} sensitive file(s) not archived",
            "Note:".yellow(),
            sensitive
        );
    }

    println!("  {} {} sessions", "Indexed".green(), report.indexed);

    match &report.commit {
        Some(hash) => println!(
            "  {} {}",
            "Committed".green(),
            hash.chars().take(8).collect::<String>()
        ),
        None => println!("  {}", "No changes to commit".dimmed()),
    }

    match &report.remote {
        RemoteOutcome::Disabled => {
            if verbosity == VerbosityLevel::Verbose {
                println!("  {}", "Backend mode is none; not pushing".dimmed());
            }
        }
        RemoteOutcome::NotPushed => println!("  {}", "Push skipped (--no-push)".dimmed()),
        RemoteOutcome::Pushed { remote, branch } => {
            println!("  {} to {}/{}", "Pushed".green(), remote, branch)
        }
        RemoteOutcome::Unavailable(_) => print_remote_problem(&report.remote),
    }

    if let Some(warning) = &report.storage_warning {
        println!(
            "  {} archive is {} (warning threshold {})",
            "Warning:".yellow().bold(),
            format_bytes(warning.size_bytes),
            format_bytes(warning.threshold_bytes)
        );
    }

    println!();
    println!("{}", "=== Sync Complete ===".green().bold());
}

fn print_scan(label: &str, scan: &ScanReport, verbosity: VerbosityLevel) {
    print!(
        "  {} {} added, {} updated, {} removed",
        label.bold(),
        scan.added.to_string().green(),
        scan.updated.to_string().cyan(),
        scan.removed.to_string().red()
    );
    if verbosity == VerbosityLevel::Verbose {
        print!(", {} unchanged", scan.unchanged);
    }
    println!();
}

fn print_remote_problem(remote: &RemoteOutcome) {
    if let RemoteOutcome::Unavailable(err) = remote {
        println!("  {} {}", "Remote:".red().bold(), err);
        println!("  {}", "Local commit kept; it will be pushed on the next sync.".dimmed());
    }
}
