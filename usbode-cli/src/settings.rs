//! Application settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use usbode_client::SessionConfig;
use usbode_detect::{BusAddress, ProbeConfig, ScannerConfig};
use usbode_sim::{
    TargetConfig, VirtualBusConfig, VirtualDeviceConfig, VirtualDiscConfig, VirtualTargetConfig,
};

/// Errors saving settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine settings path")]
    NoPath,

    #[error("failed to create settings directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write settings: {0}")]
    Write(#[source] std::io::Error),
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Host adapter's own bus position
    #[serde(default = "default_host")]
    pub host_address: BusAddress,
    /// Reject devices reporting more catalog entries than this
    #[serde(default)]
    pub strict_probe_max_count: Option<u8>,
    /// Positions never scanned
    #[serde(default)]
    pub skip_addresses: Vec<BusAddress>,
    /// Simulated targets the CLI talks to
    #[serde(default)]
    pub virtual_bus: VirtualBusConfig,
}

fn default_host() -> BusAddress {
    BusAddress::HOST
}

impl Default for Settings {
    fn default() -> Self {
        let sample = VirtualDeviceConfig {
            discs: vec![
                VirtualDiscConfig {
                    name: "System 7.5.3".to_string(),
                    kind: 1,
                    size_bytes: 120 * 1024 * 1024,
                },
                VirtualDiscConfig {
                    name: "Myst".to_string(),
                    kind: 1,
                    size_bytes: 502 * 1024 * 1024,
                },
            ],
            reported_count: None,
            active_index: None,
        };

        Self {
            host_address: BusAddress::HOST,
            strict_probe_max_count: None,
            skip_addresses: Vec::new(),
            virtual_bus: VirtualBusConfig {
                targets: vec![VirtualTargetConfig {
                    address: BusAddress::MIN,
                    target: TargetConfig::Device(sample),
                }],
            },
        }
    }
}

impl Settings {
    /// Get the XDG config directory for usbode
    /// Uses $XDG_CONFIG_HOME/usbode when absolute, falls back to ~/.config/usbode
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("usbode"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("usbode"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`, or the default location.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No settings at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Ignoring invalid settings in {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save settings as pretty JSON to `path`, or the default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, SettingsError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .ok_or(SettingsError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(SettingsError::CreateDir)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(SettingsError::Write)?;

        Ok(path)
    }

    /// Session configuration derived from these settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            scanner: ScannerConfig {
                host_address: self.host_address,
                skip_addresses: self.skip_addresses.clone(),
            },
            probe: ProbeConfig {
                max_item_count: self.strict_probe_max_count,
            },
        }
    }
}
