//! Daemon configuration
//!
//! YAML file with coordinator, logging and runtime sections. Missing
//! sections fall back to defaults; the network identity is checked on load.

use anyhow::{Context, Result};
use meshcoord_discovery::{DiscoveryConfig, RetryPolicy};
use meshcoord_protocol::{ChannelMask, IeeeAddr, PanId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoordinatorError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(skip)]
    config_file_path: PathBuf,
}

/// Everything the coordinator core needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub discovery: DiscoveryConfig,
    pub self_heal: SelfHealConfig,
    pub lifecycle: LifecycleConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfHealConfig {
    pub enabled: bool,
    pub retry: RetryPolicy,
    /// Permit-join window opened after a successful heal (0 = leave closed)
    pub reopen_join_s: u8,
    /// Upper bound on each stack call a heal attempt makes
    pub command_timeout_ms: u64,
}

impl Default for SelfHealConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: RetryPolicy::self_heal(),
            reopen_join_s: 60,
            command_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Silence after which a device is reported offline (0 = never)
    pub offline_after_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            offline_after_ms: 300_000,
        }
    }
}

/// How the network identity is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// The stack picks channel and PAN id
    #[default]
    Guided,
    /// Channel and PAN id come from configuration
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    /// Form a new network on start instead of joining one
    pub form_network: bool,
    pub channel: Option<u8>,
    pub pan_id: Option<u16>,
    /// Hex, e.g. `00:12:4b:00:00:00:00:01`
    pub extended_pan_id: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: NetworkMode::Guided,
            form_network: true,
            channel: None,
            pan_id: None,
            extended_pan_id: None,
        }
    }
}

/// Parsed network identity for fixed mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub channel_mask: ChannelMask,
    pub pan_id: Option<PanId>,
    pub extended_pan_id: Option<IeeeAddr>,
}

impl NetworkConfig {
    /// Parse the identity fields; `None` in guided mode
    pub fn identity(&self) -> std::result::Result<Option<NetworkIdentity>, CoordinatorError> {
        let channel_mask = self
            .channel
            .map(ChannelMask::from_channel)
            .transpose()
            .map_err(|e| CoordinatorError::InvalidConfig(e.to_string()))?;
        let pan_id = self
            .pan_id
            .map(PanId::new)
            .transpose()
            .map_err(|e| CoordinatorError::InvalidConfig(e.to_string()))?;
        let extended_pan_id = self
            .extended_pan_id
            .as_deref()
            .map(IeeeAddr::from_hex)
            .transpose()
            .map_err(|e| CoordinatorError::InvalidConfig(format!("extended_pan_id: {}", e)))?;

        match self.mode {
            NetworkMode::Guided => Ok(None),
            NetworkMode::Fixed => {
                let channel_mask = channel_mask.ok_or_else(|| {
                    CoordinatorError::InvalidConfig(
                        "fixed network mode requires a channel".to_string(),
                    )
                })?;
                Ok(Some(NetworkIdentity {
                    channel_mask,
                    pan_id,
                    extended_pan_id,
                }))
            }
        }
    }
}

impl CoordinatorConfig {
    /// Check value ranges; timing is normalized rather than rejected
    pub fn validate(&self) -> std::result::Result<(), CoordinatorError> {
        self.network.identity()?;
        Ok(())
    }

    pub fn normalize(&mut self) {
        self.discovery.normalize_timing();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interval of the driving loop
    pub tick_interval_ms: u64,
    /// Discovery attempts per tick
    pub max_items_per_tick: usize,
    /// Permit-join window opened after start
    pub permit_join_s: u8,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            max_items_per_tick: 2,
            permit_join_s: 180,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nRun with --init to create a new configuration",
                config_path.display()
            );
        }

        let contents =
            fs::read_to_string(&config_path).context("Failed to read configuration file")?;

        let mut config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse configuration file")?;

        config
            .coordinator
            .validate()
            .context("Invalid coordinator configuration")?;
        config.coordinator.normalize();
        config.config_file_path = config_path;

        Ok(config)
    }

    /// Write a default configuration and return it
    pub fn create_default(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }

        let config = Config {
            config_file_path: config_path,
            ..Default::default()
        };
        config.save()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        fs::write(&self.config_file_path, yaml).context("Failed to write configuration file")?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meshcoord")
            .join("config.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let created = Config::create_default(Some(path.clone())).unwrap();
        assert!(path.exists());

        let loaded = Config::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.coordinator, created.coordinator);
        assert_eq!(loaded.logging, created.logging);
        assert_eq!(loaded.config_path(), path.as_path());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("--init"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "coordinator:\n  discovery:\n    discover_timeout_ms: 1\n    discover_poll_ms: 1\n  network:\n    mode: fixed\n    channel: 15\n    pan_id: 6754\n",
        )
        .unwrap();

        let config = Config::load(Some(path)).unwrap();
        // Timing is normalized on load
        assert_eq!(config.coordinator.discovery.discover_timeout_ms, 2);
        assert_eq!(config.coordinator.network.mode, NetworkMode::Fixed);
        assert_eq!(config.coordinator.self_heal, SelfHealConfig::default());
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "coordinator:\n  network:\n    mode: fixed\n").unwrap();
        assert!(Config::load(Some(path)).is_err());
    }

    #[test]
    fn test_fixed_mode_requires_channel() {
        let mut network = NetworkConfig {
            mode: NetworkMode::Fixed,
            ..Default::default()
        };
        assert!(matches!(network.identity(), Err(CoordinatorError::InvalidConfig(_))));

        network.channel = Some(20);
        let identity = network.identity().unwrap().unwrap();
        assert_eq!(identity.channel_mask.single_channel(), Some(20));
        assert_eq!(identity.pan_id, None);
    }

    #[test]
    fn test_identity_ranges() {
        let bad_channel = NetworkConfig {
            mode: NetworkMode::Fixed,
            channel: Some(27),
            ..Default::default()
        };
        assert!(bad_channel.identity().is_err());

        let bad_pan = NetworkConfig {
            mode: NetworkMode::Fixed,
            channel: Some(11),
            pan_id: Some(0xFFFF),
            ..Default::default()
        };
        assert!(bad_pan.identity().is_err());

        let with_ext = NetworkConfig {
            mode: NetworkMode::Fixed,
            channel: Some(11),
            pan_id: Some(0x0001),
            extended_pan_id: Some("00:12:4b:00:00:00:00:01".to_string()),
            ..Default::default()
        };
        let identity = with_ext.identity().unwrap().unwrap();
        assert_eq!(identity.pan_id.map(|p| p.as_u16()), Some(0x0001));
        assert!(identity.extended_pan_id.is_some());
    }

    #[test]
    fn test_guided_mode_has_no_identity() {
        let network = NetworkConfig {
            channel: Some(15),
            ..Default::default()
        };
        assert_eq!(network.identity().unwrap(), None);

        let invalid = NetworkConfig {
            channel: Some(5),
            ..Default::default()
        };
        assert!(CoordinatorConfig {
            network: invalid,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
