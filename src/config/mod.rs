//! Configuration module
//!
//! This module handles configuration of the ingestion pipeline:
//! - [`AppConfig`] groups the receiver, dispatcher and monitor settings
//! - TOML loading/saving for the monitor process
//!
//! The library itself never reads files; the embedding application hands
//! the settings to each component when it constructs it.
//!
//! # Config Location
//!
//! The monitor process reads `config.toml` from the platform config
//! directory under `rhms-telemetry`:
//!
//! - **Linux**: `~/.config/rhms-telemetry/`
//! - **macOS**: `~/Library/Application Support/rhms-telemetry/`
//! - **Windows**: `%APPDATA%\rhms-telemetry\`
//!
//! # Example
//!
//! ```toml
//! [receiver]
//! port = 5000
//!
//! [monitor]
//! health_timeout_ms = 5000
//!
//! [[monitor.subsystems]]
//! id = "PSU-1"
//! kind = "power_supply"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "rhms-telemetry";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Complete configuration of the monitor process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// UDP receiver settings
    pub receiver: ReceiverConfig,

    /// Dispatcher settings
    pub dispatcher: DispatcherConfig,

    /// Monitor settings
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TelemetryError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TelemetryError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load config from a file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Load config, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to a file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    TelemetryError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.to_toml_string()?;
        std::fs::write(path, content)
            .map_err(|e| TelemetryError::Config(format!("Failed to write config: {}", e)))
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.receiver.validate()?;
        self.dispatcher.validate()?;
        self.monitor.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::SubsystemKind;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = AppConfig::from_toml_str("[receiver]\nport = 6000\n").unwrap();
        assert_eq!(config.receiver.port, 6000);
        assert_eq!(config.receiver.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        assert_eq!(config.dispatcher, DispatcherConfig::default());
        assert!(config.monitor.subsystems.is_empty());
    }

    #[test]
    fn test_subsystem_entries() {
        let config = AppConfig::from_toml_str(
            r#"
            [[monitor.subsystems]]
            id = "PSU-1"
            kind = "power_supply"

            [[monitor.subsystems]]
            id = "MISC"
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.subsystems.len(), 2);
        assert_eq!(config.monitor.subsystems[0].kind, SubsystemKind::PowerSupply);
        assert_eq!(config.monitor.subsystems[1].kind, SubsystemKind::Generic);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = AppConfig::from_toml_str("[receiver]\nport = 22\n").unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidPort(22)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            AppConfig::from_toml_str("receiver = ["),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(APP_ID).join(CONFIG_FILE);
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());

        let mut config = AppConfig::default();
        config.monitor.health_timeout_ms = 2500;
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);

        std::fs::write(&path, "receiver = [").unwrap();
        assert!(AppConfig::load(&path).is_err());
        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = AppConfig::default();
        config.receiver.port = 47000;
        config.monitor.subsystems.push(SubsystemEntry {
            id: "COOL-1".to_string(),
            kind: SubsystemKind::CoolingSystem,
        });
        let text = config.to_toml_string().unwrap();
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }
}
