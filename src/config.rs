//! Configuration for rp6502.
//!
//! Settings are read from `~/.rp6502/config.toml` or from a file named with
//! `-c`. Command line options override anything set here.
//!
//! ```toml
//! # Serial device of the RP6502 RIA
//! device = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! # Monitor response timeout and break handling
//! timeout_ms = 500
//! break_ms = 10
//! break_retries = 1
//!
//! [terminal]
//! # Decode key events instead of reading raw bytes from stdin
//! key_events = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::transport::DEFAULT_BAUD_RATE;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial device path
    pub device: Option<String>,
    pub baud_rate: u32,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
    /// Break length in milliseconds
    pub break_ms: u64,
    /// Extra break attempts when the monitor doesn't answer
    pub break_retries: u32,
    /// Terminal settings
    pub terminal: TerminalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 500,
            break_ms: 10,
            break_retries: 1,
            terminal: TerminalConfig::default(),
        }
    }
}

/// Terminal configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub key_events: bool,
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing default file gives the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::get_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_ms)
    }

    /// Configured device, else the usual place the RIA shows up on this OS
    pub fn device_or_default(&self) -> String {
        self.device.clone().unwrap_or_else(|| default_device().to_string())
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".rp6502").join("config.toml"))
    }
}

/// Where the RIA's USB CDC port usually mounts
pub fn default_device() -> &'static str {
    if cfg!(windows) {
        "COM1"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbmodem"
    } else if cfg!(target_os = "linux") {
        "/dev/ttyACM0"
    } else {
        "/dev/tty"
    }
}

// Get home directory
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert!(!config.terminal.key_events);
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse("device = \"/dev/ttyUSB1\"\n[terminal]\nkey_events = true\n").unwrap();
        assert_eq!(config.device_or_default(), "/dev/ttyUSB1");
        assert!(config.terminal.key_events);
        assert_eq!(config.break_retries, 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rp6502.toml");
        let config = Config {
            device: Some("COM7".to_string()),
            timeout_ms: 2000,
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(Some(path.as_path())).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("none.toml").as_path())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_file() {
        assert!(Config::parse("timeout_ms = \"soon\"").is_err());
    }
}
