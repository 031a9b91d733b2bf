//! # Configuration Module
//!
//! Settings file handling and platform data/config directories for curator.
//!
//! ## Locations
//!
//! - Settings: `<config_dir>/curator/config.json`
//!   (`~/.config/curator/config.json` on Linux)
//! - Offline catalog: `<data_dir>/curator/catalog.db`
//!   (`~/.local/share/curator/catalog.db` on Linux)
//!
//! A missing settings file is not an error; every field has a default and
//! command-line flags override individual fields for one run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::align::AlignStrategy;
use crate::relocate::RetryPolicy;

/// Returns the platform-appropriate data directory for curator, creating it
/// if necessary.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The curator subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    curator_dir_in(&data_dir)
}

/// `<base>/curator`, created if missing.
fn curator_dir_in(base: &Path) -> Result<PathBuf> {
    let curator_dir = base.join("curator");
    fs::create_dir_all(&curator_dir).with_context(|| {
        format!(
            "Failed to create curator data directory at {}. Please check file permissions.",
            curator_dir.display()
        )
    })?;

    Ok(curator_dir)
}

/// Location of the settings file. The file itself may not exist.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        anyhow::anyhow!("Could not determine system configuration directory.")
    })?;
    Ok(config_dir.join("curator").join("config.json"))
}

/// Default location of the offline catalog database.
pub fn get_catalog_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("catalog.db"))
}

/// Lock-retry settings for relocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelocationSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RelocationSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(200),
        }
    }
}

impl RelocationSettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// User settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root of the canonical `{artist}/{year - album}` layout.
    pub target_root: Option<PathBuf>,
    /// Offline catalog database. `None` means the data-directory default.
    pub catalog_path: Option<PathBuf>,
    pub default_strategy: AlignStrategy,
    /// Audio file extensions, case-insensitive, without the dot.
    pub extensions: Vec<String>,
    /// Joins performers picked in the album-artist builder.
    pub album_artist_separator: String,
    pub relocation: RelocationSettings,
    /// How deep album discovery descends below the given root.
    pub scan_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_root: None,
            catalog_path: None,
            default_strategy: AlignStrategy::Order,
            extensions: ["mp3", "flac", "ogg", "opus", "m4a", "wav"]
                .into_iter()
                .map(String::from)
                .collect(),
            album_artist_separator: "; ".to_string(),
            relocation: RelocationSettings::default(),
            scan_depth: 5,
        }
    }
}

impl Settings {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Settings file {} is not valid JSON", path.display()))
    }

    /// Load from the platform location.
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// Effective catalog location.
    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog_path {
            Some(path) => Ok(path.clone()),
            None => get_catalog_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"target_root": "/music", "default_strategy": "duration", "relocation": {"max_attempts": 9}}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.target_root, Some(PathBuf::from("/music")));
        assert_eq!(settings.default_strategy, AlignStrategy::Duration);
        assert_eq!(settings.relocation.max_attempts, 9);
        assert_eq!(settings.relocation.base_delay_ms, 200);
        assert_eq!(settings.album_artist_separator, "; ");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = Settings {
            scan_depth: 2,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_policy_never_zero_attempts() {
        let relocation = RelocationSettings {
            max_attempts: 0,
            base_delay_ms: 10,
        };
        assert_eq!(relocation.policy().max_attempts, 1);
        assert_eq!(relocation.policy().base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_data_dir_is_created_under_base() {
        let base = TempDir::new().unwrap();
        let dir = curator_dir_in(base.path()).unwrap();
        assert_eq!(dir, base.path().join("curator"));
        assert!(dir.is_dir());
        // A second call finds it already there.
        assert_eq!(curator_dir_in(base.path()).unwrap(), dir);
    }
}
