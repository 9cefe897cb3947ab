use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use claude_code_archive::config::ConfigManager;
use claude_code_archive::handlers::{self, BackendTarget};
use claude_code_archive::layout::LOCK_FILE;
use claude_code_archive::query::Query;
use claude_code_archive::{lock, logger, VerbosityLevel};

#[derive(Parser)]
#[command(name = "claude-code-archive")]
#[command(about = "Archive, index and restore Claude Code history in a git-backed store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show more detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Print only essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the archive repository and save configuration
    Init {
        /// Directory holding the archive repository
        #[arg(short, long)]
        archive: Option<PathBuf>,

        /// Claude Code state directory to archive (default: ~/.claude)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Device name used for this machine's namespace (default: hostname)
        #[arg(long)]
        device_name: Option<String>,
    },

    /// Archive local history, commit, and push when a remote backend is set
    Sync {
        /// Commit message (optional)
        #[arg(short, long)]
        message: Option<String>,

        /// Commit locally but do not pull or push
        #[arg(long)]
        no_push: bool,
    },

    /// Show archive, device and backend status
    Status,

    /// List archived sessions
    List(ListArgs),

    /// Restore archived sessions into ~/.claude/projects
    Restore {
        /// Session id, or any unique part of it
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Restore every archived session
        #[arg(long)]
        all: bool,

        /// With --all, only restore sessions from this device namespace
        #[arg(long, requires = "all")]
        device: Option<String>,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Import an archived config profile into ~/.claude
    RestoreConfig {
        /// Device namespace to import from (default: this device)
        #[arg(long)]
        device: Option<String>,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// Choose where commits are pushed
    Backend {
        #[command(subcommand)]
        mode: BackendCommand,
    },

    /// Move a flat archive into device namespaces
    Migrate,

    /// Rebuild the session index
    Reindex,
}

#[derive(Args)]
#[group(multiple = false)]
struct ListArgs {
    /// Only the N most recent sessions
    #[arg(long)]
    last: Option<usize>,

    /// Sessions archived on a date (prefix such as 2026-03 or 2026-03-01)
    #[arg(long)]
    date: Option<String>,

    /// Sessions whose project matches (case-insensitive substring)
    #[arg(long)]
    project: Option<String>,
}

impl ListArgs {
    fn into_query(self) -> Query {
        if let Some(n) = self.last {
            Query::Last(n)
        } else if let Some(date) = self.date {
            Query::Date(date)
        } else if let Some(project) = self.project {
            Query::Project(project)
        } else {
            Query::All
        }
    }
}

#[derive(Subcommand)]
enum BackendCommand {
    /// Keep commits local
    None,
    /// Push to a private GitHub repository created with the gh CLI
    Hosted {
        /// Repository name, or owner/name
        #[arg(long)]
        repo: Option<String>,
    },
    /// Push to any git remote
    Custom {
        /// Remote URL
        url: String,
    },
}

/// Remove our lock file if we get interrupted mid-sync
fn install_signal_handler() {
    let lock_path = claude_code_archive::config::ArchiveConfig::load()
        .map(|c| c.archive_root.join(LOCK_FILE))
        .ok();

    let result = ctrlc::set_handler(move || {
        if let Some(path) = &lock_path {
            lock::release_if_owned(path);
        }
        std::process::exit(130);
    });
    if let Err(e) = result {
        log::warn!("Failed to install signal handler: {}", e);
    }
}

fn main() -> Result<()> {
    // Logging problems should never stop the archive from running
    if let Err(e) = logger::init_logger() {
        eprintln!("Warning: failed to initialize logger: {e:#}");
    }

    let cli = Cli::parse();
    let verbosity = if cli.verbose {
        VerbosityLevel::Verbose
    } else if cli.quiet {
        VerbosityLevel::Quiet
    } else {
        VerbosityLevel::Normal
    };

    install_signal_handler();
    log::debug!("Config directory: {:?}", ConfigManager::config_dir().ok());

    match cli.command {
        Commands::Init {
            archive,
            source,
            device_name,
        } => handlers::handle_init(archive, source, device_name)?,
        Commands::Sync { message, no_push } => handlers::handle_sync(message, !no_push, verbosity)?,
        Commands::Status => handlers::handle_status(verbosity)?,
        Commands::List(args) => handlers::handle_list(args.into_query(), verbosity)?,
        Commands::Restore {
            id,
            all,
            device,
            overwrite,
        } => handlers::handle_restore(id, all, device, overwrite, verbosity)?,
        Commands::RestoreConfig { device, overwrite } => {
            handlers::handle_restore_config(device, overwrite, verbosity)?
        }
        Commands::Backend { mode } => {
            let target = match mode {
                BackendCommand::None => BackendTarget::None,
                BackendCommand::Hosted { repo } => BackendTarget::Hosted { repo },
                BackendCommand::Custom { url } => BackendTarget::Custom { url },
            };
            handlers::handle_backend(target)?
        }
        Commands::Migrate => handlers::handle_migrate()?,
        Commands::Reindex => handlers::handle_reindex()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_flags_map_to_queries() {
        let cli = Cli::try_parse_from(["claude-code-archive", "list", "--last", "1"]).unwrap();
        match cli.command {
            Commands::List(args) => assert_eq!(args.into_query(), Query::Last(1)),
            _ => panic!("expected list"),
        }

        let both = Cli::try_parse_from(["claude-code-archive", "list", "--last", "1", "--date", "2026"]);
        assert!(both.is_err());
    }

    #[test]
    fn test_restore_needs_id_or_all() {
        assert!(Cli::try_parse_from(["claude-code-archive", "restore"]).is_err());
        assert!(Cli::try_parse_from(["claude-code-archive", "restore", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["claude-code-archive", "restore", "abc", "--all"]).is_err());
        assert!(Cli::try_parse_from(["claude-code-archive", "restore", "abc", "--device", "x"]).is_err());
    }
}
