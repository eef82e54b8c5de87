//! Configuration management

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AppError, AppResult};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Version-control status enrichment
    pub status: StatusConfig,
    /// HTTP index backend settings
    pub http: HttpConfig,
    /// FTP backend settings
    pub ftp: FtpSettings,
    /// Saved connections
    #[serde(default)]
    pub connections: Vec<SavedConnection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Restore the last visited location on startup
    pub remember_path: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            remember_path: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Show git status next to entries
    pub enabled: bool,
    /// Number of status worker threads
    pub workers: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpSettings {
    /// Use passive mode for data connections
    pub passive: bool,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self { passive: true }
    }
}

/// A saved connection (passwords belong in the URL only if you accept them
/// being stored in plain text)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedConnection {
    /// Display name
    pub name: String,
    /// Location URL, e.g. `ftp://user@host/` or `https://host/pub/`
    pub url: String,
}

/// Get the config directory path for the current platform
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("burrow"))
}

/// Get the config file path
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.toml"))
}

/// Default config file content with comments
fn default_config() -> String {
    r##"# burrow configuration

[general]
# Reopen the last visited location when started without one
remember_path = true

[status]
# Show git status next to entries of local directories
enabled = true
# Worker threads computing status
workers = 4

[http]
# Timeout for fetching a directory index, in seconds
timeout_secs = 15

[ftp]
# Passive mode works behind most firewalls and NAT
passive = true

# Saved connections, usable by name on the command line
# [[connections]]
# name = "mirror"
# url = "https://mirror.example.org/pub/"
"##
    .to_string()
}

impl Config {
    /// Load configuration from the default location, creating it if missing.
    /// Problems are logged and fall back to defaults.
    pub fn load() -> Self {
        let Some(config_path) = config_file() else {
            warn!("could not determine config directory");
            return Config::default();
        };

        if let Some(config_dir) = config_path.parent()
            && !config_dir.exists()
            && let Err(e) = fs::create_dir_all(config_dir)
        {
            warn!("could not create config directory: {}", e);
            return Config::default();
        }

        if !config_path.exists()
            && let Err(e) = fs::write(&config_path, default_config())
        {
            warn!("could not create config file: {}", e);
            return Config::default();
        }

        Self::load_from(&config_path).unwrap_or_else(|e| {
            warn!("{}; using default configuration", e);
            Config::default()
        })
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| AppError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml_edit::de::Error> {
        toml_edit::de::from_str(content)
    }

    /// Look up a saved connection URL by name
    pub fn connection(&self, name: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_text_matches_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Config::parse(&default_config())?;
        let defaults = Config::default();
        assert_eq!(parsed.general.remember_path, defaults.general.remember_path);
        assert_eq!(parsed.status.workers, defaults.status.workers);
        assert_eq!(parsed.http.timeout_secs, defaults.http.timeout_secs);
        assert!(parsed.connections.is_empty());
        Ok(())
    }

    #[test]
    fn partial_config_fills_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Config::parse(
            r#"
[status]
workers = 2

[[connections]]
name = "mirror"
url = "https://mirror.example.org/pub/"
"#,
        )?;
        assert_eq!(parsed.status.workers, 2);
        assert!(parsed.status.enabled);
        assert!(parsed.ftp.passive);
        assert_eq!(parsed.connection("mirror"), Some("https://mirror.example.org/pub/"));
        assert_eq!(parsed.connection("other"), None);
        Ok(())
    }

    #[test]
    fn load_from_reports_parse_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "[status\nworkers = ")?;
        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
        Ok(())
    }
}
