//! Device identity: a display name plus the slug naming its archive namespace.
//!
//! The slug is derived from the short hostname the first time it is needed
//! and persisted to `device.json`; after that it is only ever read back, so a
//! hostname rename does not orphan the device's namespace.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub name: String,
    pub slug: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DeviceIdentity {
    /// Load the persisted identity, or derive one from the hostname and persist it.
    ///
    /// `name_override` only affects a fresh identity; an existing slug is never
    /// recomputed.
    pub fn load_or_create(state_path: &Path, name_override: Option<&str>) -> Result<Self> {
        if let Some(existing) = Self::load(state_path)? {
            return Ok(existing);
        }

        let name = match name_override {
            Some(name) => name.to_string(),
            None => short_hostname()?,
        };
        let identity = DeviceIdentity {
            slug: slugify(&name),
            name,
            created_at: chrono::Utc::now(),
        };
        identity.save(state_path)?;
        log::info!(
            "Registered device '{}' with namespace slug '{}'",
            identity.name,
            identity.slug
        );

        Ok(identity)
    }

    /// Read the persisted identity if there is one
    pub fn load(state_path: &Path) -> Result<Option<Self>> {
        if !state_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(state_path)
            .with_context(|| format!("Failed to read {}", state_path.display()))?;
        let identity: DeviceIdentity = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", state_path.display()))?;
        Ok(Some(identity))
    }

    fn save(&self, state_path: &Path) -> Result<()> {
        if let Some(parent) = state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize device identity")?;
        fs::write(state_path, content)
            .with_context(|| format!("Failed to write {}", state_path.display()))?;
        Ok(())
    }
}

/// Hostname up to the first dot
pub fn short_hostname() -> Result<String> {
    let host = hostname::get().context("Failed to read hostname")?;
    let host = host.to_string_lossy();
    Ok(host.split('.').next().unwrap_or_default().to_string())
}

/// Normalize a device name into a lowercase, filesystem-safe slug.
///
/// Runs of anything outside `[a-z0-9]` collapse into a single `-`, leading and
/// trailing dashes are trimmed, and an empty result becomes `device`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "device".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Marias-MacBook-Pro"), "marias-macbook-pro");
        assert_eq!(slugify("work laptop (2)"), "work-laptop-2");
        assert_eq!(slugify("--weird__name--"), "weird-name");
        assert_eq!(slugify("Ünïcode Box"), "n-code-box");
        assert_eq!(slugify("..."), "device");
        assert_eq!(slugify(""), "device");
    }

    #[test]
    fn test_slug_is_persisted_and_never_recomputed() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join("device.json");

        let first = DeviceIdentity::load_or_create(&state, Some("Old Name")).unwrap();
        assert_eq!(first.slug, "old-name");

        // A later run with a different name keeps the original slug
        let second = DeviceIdentity::load_or_create(&state, Some("Renamed Host")).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(DeviceIdentity::load(&temp.path().join("device.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_hostname_fallback() {
        let temp = TempDir::new().unwrap();
        let identity =
            DeviceIdentity::load_or_create(&temp.path().join("device.json"), None).unwrap();
        assert!(!identity.slug.is_empty());
        assert_eq!(identity.slug, slugify(&identity.name));
    }
}
