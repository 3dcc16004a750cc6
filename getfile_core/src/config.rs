use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::transfer::constants::{BUFFER_SIZE, DEFAULT_TIMEOUT_SECS};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "getfile";
const APP_NAME: &str = "getfile";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer size must be greater than zero")]
    ZeroBufferSize,
    #[error("timeout must be at least one second")]
    ZeroTimeout,
}

/// Knobs shared by both protocol roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Size of the intermediate buffer used for each chunk
    pub buffer_size: usize,
    /// Bound on every wait for the peer
    pub timeout_secs: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            buffer_size: BUFFER_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProtocolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Apply `GETFILE_TIMEOUT_SECS` and `GETFILE_BUFFER_SIZE` when set and parseable.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = std::env::var("GETFILE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.timeout_secs = secs;
        }
        if let Some(size) = std::env::var("GETFILE_BUFFER_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.buffer_size = size;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub protocol: ProtocolConfig,
    /// Where the requester writes fetched files
    pub download_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            download_path: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Get the config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(test_path) = std::env::var("GETFILE_CONFIG_DIR") {
            return Some(PathBuf::from(test_path).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default, then apply environment overrides
    pub fn load() -> Self {
        let mut config = match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.protocol = config.protocol.with_env_overrides();
        config
    }

    /// Read a config file; missing or malformed files yield the defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::get_config_path()
            .ok_or_else(|| anyhow::anyhow!("no config directory available"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = ProtocolConfig::default();
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_buf = ProtocolConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert_eq!(zero_buf.validate(), Err(ConfigError::ZeroBufferSize));

        let zero_timeout = ProtocolConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(zero_timeout.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "protocol": { "timeout_secs": 3 } }"#).unwrap();
        assert_eq!(config.protocol.timeout_secs, 3);
        assert_eq!(config.protocol.buffer_size, BUFFER_SIZE);
        assert_eq!(config.download_path, PathBuf::from("."));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = AppConfig {
            protocol: ProtocolConfig {
                buffer_size: 512,
                timeout_secs: 4,
            },
            download_path: PathBuf::from("/tmp/downloads"),
        };

        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.protocol, config.protocol);
        assert_eq!(loaded.download_path, config.download_path);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load_from(&path).protocol, ProtocolConfig::default());
        assert_eq!(
            AppConfig::load_from(&dir.path().join("absent.json")).protocol,
            ProtocolConfig::default()
        );
    }
}
