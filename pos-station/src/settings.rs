//! Station settings

use std::path::PathBuf;

use anyhow::Context;
use pos_link::CoordinatorConfig;
use pos_sim::{AutoRespond, OperatorAction, TerminalConfig};
use serde::{Deserialize, Serialize};

/// Settings persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Serial port used when none is given on the command line
    #[serde(default)]
    pub port: Option<String>,
    /// Timeouts, limits and the default baud rate
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Virtual terminal used with `--simulator`
    #[serde(default = "default_simulator")]
    pub simulator: TerminalConfig,
}

/// Non-interactive runs approve after a short pause, like a cashier would
fn default_simulator() -> TerminalConfig {
    TerminalConfig {
        auto_respond: Some(AutoRespond {
            action: OperatorAction::Approve,
            delay_ms: 1500,
        }),
        ..Default::default()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: None,
            coordinator: CoordinatorConfig::default(),
            simulator: default_simulator(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for posterm
    /// Uses $XDG_CONFIG_HOME/posterm, falls back to ~/.config/posterm
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("posterm"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("posterm"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| Self::from_json(&s))
            .unwrap_or_default()
    }

    fn from_json(json: &str) -> Option<Self> {
        match serde_json::from_str(json) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings file: {}", e);
                None
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::settings_path().context("could not determine settings path")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_json(r#"{"port": "/dev/ttyUSB1"}"#).unwrap();
        assert_eq!(settings.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(settings.coordinator.baud_rate, 9600);
        assert_eq!(settings.coordinator.transaction_timeout_ms, 30_000);
        assert!(settings.simulator.auto_respond.is_some());
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut settings = Settings::default();
        settings.coordinator.simulator_timeout_ms = 60_000;
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Settings::from_json("{not json").is_none());
    }
}
