use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;

const APP_DIR: &str = "claude-code-archive";

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - Linux: $XDG_CONFIG_HOME/claude-code-archive or ~/.config/claude-code-archive
    /// - macOS: ~/Library/Application Support/claude-code-archive
    /// - Windows: %APPDATA%\claude-code-archive
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join(APP_DIR))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join(APP_DIR))
            }
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join("Library").join("Application Support").join(APP_DIR))
        }

        #[cfg(target_os = "windows")]
        {
            Ok(dirs::config_dir()
                .context("Failed to get Windows config directory")?
                .join(APP_DIR))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join(".claude-code-archive"))
        }
    }

    /// Get the archive config file path (config.toml)
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("claude-code-archive.log"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        Ok(config_dir)
    }
}

/// Explicit configuration for one archive, built once and passed to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Root of the git-backed archive repository
    pub archive_root: PathBuf,

    /// Root of the application state being archived (normally `~/.claude`)
    pub source_root: PathBuf,

    /// Human-readable device name; defaults to the short hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Name of the git remote used in remote-backed modes
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Branch to push; defaults to the repository's current branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Soft size ceiling for the whole archive before a warning is printed
    #[serde(default = "default_storage_warning_bytes")]
    pub storage_warning_bytes: u64,

    /// Entries under `source_root` mirrored into the config tier
    #[serde(default = "default_config_include")]
    pub config_include: Vec<String>,

    /// Extra filename patterns that must never be archived or imported.
    /// Always added on top of [`default_sensitive_patterns`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensitive_patterns: Vec<String>,

    /// Directory holding per-machine state (`device.json`); not serialized
    #[serde(skip)]
    pub state_dir: PathBuf,
}

fn default_remote_name() -> String {
    "origin".to_string()
}

fn default_storage_warning_bytes() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

fn default_config_include() -> Vec<String> {
    [
        "CLAUDE.md",
        "settings.json",
        "commands",
        "agents",
        "skills",
        "hooks",
        "output-styles",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_sensitive_patterns() -> Vec<String> {
    [
        ".credentials.json",
        "credentials*",
        "auth.json",
        ".env",
        ".env.*",
        ".netrc",
        "*.pem",
        "*.key",
        "*.p12",
        "id_rsa*",
        "id_ed25519*",
        "*secret*",
        "*token*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Default location of the Claude Code state directory
pub fn default_source_root() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".claude"))
}

impl ArchiveConfig {
    /// Build a config with defaults for everything but the two roots.
    pub fn new(archive_root: impl Into<PathBuf>, source_root: impl Into<PathBuf>) -> Self {
        ArchiveConfig {
            archive_root: archive_root.into(),
            source_root: source_root.into(),
            device_name: None,
            remote_name: default_remote_name(),
            branch: None,
            storage_warning_bytes: default_storage_warning_bytes(),
            config_include: default_config_include(),
            sensitive_patterns: Vec::new(),
            state_dir: PathBuf::new(),
        }
    }

    /// Same as [`ArchiveConfig::new`] with an explicit state directory.
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    /// Load configuration from the platform config directory
    pub fn load() -> Result<Self> {
        let config_path = ConfigManager::config_file_path()?;
        let state_dir = ConfigManager::config_dir()?;
        Self::load_from(&config_path, &state_dir)
    }

    /// Load configuration from an explicit file
    pub fn load_from(config_path: &Path, state_dir: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Err(ArchiveError::ConfigurationMissing(config_path.to_path_buf()).into());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: ArchiveConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        config.state_dir = state_dir.to_path_buf();

        Ok(config)
    }

    /// Save configuration to the platform config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&ConfigManager::config_file_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Directory of Claude Code project session logs
    pub fn projects_dir(&self) -> PathBuf {
        self.source_root.join("projects")
    }

    /// Path of the persisted device identity
    pub fn device_state_path(&self) -> PathBuf {
        self.state_dir.join("device.json")
    }
}
