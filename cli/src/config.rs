// Configuration management for the meshbridge CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/meshbridge/config.json
// - Linux: ~/.config/meshbridge/config.json
// - Windows: %APPDATA%\meshbridge\config.json

use anyhow::{Context, Result};
use meshbridge_core::{BridgeConfig, VendorIdentity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings handed to the relay coordinator. A fresh config gets a new
    /// random vendor identity.
    pub bridge: BridgeConfig,

    /// Simulator settings
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Nodes on the loopback mesh
    pub nodes: usize,

    /// How many of them have no backend access
    pub offline_nodes: usize,

    /// Time given to the mesh to settle between steps, in milliseconds
    pub settle_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            offline_nodes: 2,
            settle_ms: 200,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("meshbridge");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .bridge
                .validate()
                .with_context(|| format!("Invalid config in {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::debug!(
                "Created config for {} at {}",
                config.bridge.vendor_identity,
                path.display()
            );
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value in memory; call `save` to persist
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "vendor_identity" => {
                self.bridge.vendor_identity = VendorIdentity::new(value);
            }
            "display_identity" => {
                self.bridge.display_identity = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "channel_name" => {
                self.bridge.channel_name = value.to_string();
            }
            "token_url" => {
                self.bridge.token_url = value.to_string();
            }
            "announce_backend_access" => {
                self.bridge.announce_backend_access =
                    value.parse().context("Invalid boolean value")?;
            }
            "dedup_capacity" => {
                self.bridge.dedup_capacity = if value.is_empty() || value == "unbounded" {
                    None
                } else {
                    Some(value.parse().context("Invalid number")?)
                };
            }
            "simulation.nodes" => {
                self.simulation.nodes = value.parse().context("Invalid number")?;
            }
            "simulation.offline_nodes" => {
                self.simulation.offline_nodes = value.parse().context("Invalid number")?;
            }
            "simulation.settle_ms" => {
                self.simulation.settle_ms = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.bridge.validate()?;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "vendor_identity" => Some(self.bridge.vendor_identity.to_string()),
            "display_identity" => self.bridge.display_identity.clone(),
            "channel_name" => Some(self.bridge.channel_name.clone()),
            "token_url" => Some(self.bridge.token_url.clone()),
            "announce_backend_access" => Some(self.bridge.announce_backend_access.to_string()),
            "dedup_capacity" => self.bridge.dedup_capacity.map(|c| c.to_string()),
            "simulation.nodes" => Some(self.simulation.nodes.to_string()),
            "simulation.offline_nodes" => Some(self.simulation.offline_nodes.to_string()),
            "simulation.settle_ms" => Some(self.simulation.settle_ms.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            (
                "vendor_identity".to_string(),
                self.bridge.vendor_identity.to_string(),
            ),
            (
                "display_identity".to_string(),
                self.bridge
                    .display_identity
                    .clone()
                    .unwrap_or_else(|| "(vendor identity)".to_string()),
            ),
            ("channel_name".to_string(), self.bridge.channel_name.clone()),
            ("token_url".to_string(), self.bridge.token_url.clone()),
            (
                "announce_backend_access".to_string(),
                self.bridge.announce_backend_access.to_string(),
            ),
            (
                "dedup_capacity".to_string(),
                self.bridge
                    .dedup_capacity
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unbounded".to_string()),
            ),
            (
                "simulation.nodes".to_string(),
                self.simulation.nodes.to_string(),
            ),
            (
                "simulation.offline_nodes".to_string(),
                self.simulation.offline_nodes.to_string(),
            ),
            (
                "simulation.settle_ms".to_string(),
                format!("{}ms", self.simulation.settle_ms),
            ),
        ]
    }
}
