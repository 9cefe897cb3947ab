//! `backend`: switch the remote storage mode.

use anyhow::Result;
use colored::Colorize;

use super::ArchiveContext;
use crate::backend::{BackendAdapter, GhProvisioner, DEFAULT_HOSTED_REPO};
use crate::device::DeviceIdentity;

/// Requested backend mode, as parsed from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    None,
    Hosted { repo: Option<String> },
    Custom { url: String },
}

pub fn handle_backend(target: BackendTarget) -> Result<()> {
    let ctx = ArchiveContext::load()?;
    let Some(_guard) = ctx.lock()? else {
        return Ok(());
    };

    let device = DeviceIdentity::load_or_create(
        &ctx.config.device_state_path(),
        ctx.config.device_name.as_deref(),
    )?;
    let adapter = BackendAdapter::new(ctx.repo.as_ref(), &ctx.layout, &ctx.config);

    let backend = match target {
        BackendTarget::None => adapter.switch_to_none(&device)?,
        BackendTarget::Hosted { repo } => {
            println!("{}", "Checking GitHub CLI and repository...".cyan());
            let name = repo.unwrap_or_else(|| DEFAULT_HOSTED_REPO.to_string());
            adapter.switch_to_hosted(&device, &GhProvisioner::new(), &name)?
        }
        BackendTarget::Custom { url } => {
            println!("{} {}", "Probing".cyan(), url);
            adapter.switch_to_custom(&device, &url)?
        }
    };

    print!(
        "{} Backend set to {}",
        "✓".green().bold(),
        backend.mode.to_string().cyan()
    );
    match &backend.remote {
        Some(remote) => println!(" ({remote})"),
        None => println!(),
    }
    Ok(())
}
