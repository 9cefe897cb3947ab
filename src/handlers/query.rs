//! `list`: query the session index.

use anyhow::Result;
use colored::Colorize;

use super::{format_bytes, ArchiveContext};
use crate::index::SessionIndex;
use crate::query::{self, Query};
use crate::VerbosityLevel;

pub fn handle_list(query: Query, verbosity: VerbosityLevel) -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let index = SessionIndex::load_or_rebuild(&ctx.layout)?;
    let results = query::run(&index.sessions, &query);

    if results.is_empty() {
        println!("{}", format!("No {query} found.").yellow());
        return Ok(());
    }

    if verbosity == VerbosityLevel::Quiet {
        for entry in &results {
            println!("{}", entry.uuid);
        }
        return Ok(());
    }

    println!("{}", format!("Archived {query}").cyan().bold());
    println!("{}", "=".repeat(80).cyan());
    for entry in &results {
        println!(
            "{}  {}  {:>9}  {}",
            entry.archived_at.dimmed(),
            entry.uuid.bold(),
            format_bytes(entry.size_bytes),
            entry.device.cyan()
        );
        if verbosity == VerbosityLevel::Verbose {
            println!("    {} {}", "Project:".dimmed(), entry.project_id);
        }
    }
    println!("\n{} {}", "Total:".bold(), results.len());

    Ok(())
}
