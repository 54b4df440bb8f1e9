//! # Configuration Management Module
//!
//! Handles all configuration aspects of the KakuBridge system: a single TOML
//! file with typed sections, sensible defaults, and validation on load.
//!
//! Runtime account state (channel count, Telegram token, shared secret,
//! provisioning identity) deliberately does NOT live here: those fields are
//! owned by the setup portal and the [`crate::storage`] key/value layer, and
//! are rewritten whenever the portal saves new values. The config file only
//! carries what an operator sets once per installation.
//!
//! ## Configuration Structure
//!
//! - [`BridgeConfig`] - Device identity and restart policy
//! - [`StorageConfig`] - Data directory for the key/value store
//! - [`TelegramConfig`] - Bot API endpoint and polling behavior
//! - [`ProvisioningConfig`] - Credential exchange endpoint
//! - [`LoggingConfig`] - Logging and debugging settings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kakubridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Data dir: {}", config.storage.data_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bridge]
//! name = "KAKU Bridge"
//! mac_address = "5c:cf:7f:12:34:56"
//! maintenance_hour = 2
//!
//! [storage]
//! data_dir = "./data"
//!
//! [telegram]
//! poll_timeout_secs = 20
//!
//! [provisioning]
//! enabled = false
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    /// Hardware MAC address of this device, colon-separated hex. The low three
    /// bytes seed the RF transmitter address and the provisioning device id,
    /// so every installation needs its own value.
    pub mac_address: String,
    /// Wall-clock hour (UTC, 0-23) during which a maintenance restart may fire.
    #[serde(default = "default_maintenance_hour")]
    pub maintenance_hour: u32,
    /// Uptime that must elapse before a maintenance restart is considered.
    #[serde(default = "default_min_uptime_hours")]
    pub min_uptime_hours: u64,
    /// Settle delay before any restart-triggering exit, in seconds.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
}

fn default_maintenance_hour() -> u32 {
    2
}

fn default_min_uptime_hours() -> u64 {
    6
}

fn default_settle_delay_secs() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL. Only changed when routing through a bot-api proxy.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-poll timeout for getUpdates, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    20
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// When true, the credential exchange runs at boot and the MQTT backend
    /// is brought up from its response.
    pub enabled: bool,
    /// HTTPS endpoint of the credential exchange service.
    #[serde(default = "default_provisioning_endpoint")]
    pub endpoint: String,
    /// Fixed service type tag sent with every request.
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Request timeout in seconds.
    #[serde(default = "default_provisioning_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provisioning_endpoint() -> String {
    "https://vps.andries-salm.com/spiegel/dk/device.php".to_string()
}

fn default_service_type() -> String {
    "rf433v1".to_string()
}

fn default_provisioning_timeout_secs() -> u64 {
    15
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_provisioning_endpoint(),
            service_type: default_service_type(),
            timeout_secs: default_provisioning_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Check field ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.bridge.maintenance_hour >= 24 {
            return Err(anyhow!(
                "bridge.maintenance_hour must be 0-23, got {}",
                self.bridge.maintenance_hour
            ));
        }
        crate::rf433::parse_mac(&self.bridge.mac_address)
            .map_err(|e| anyhow!("bridge.mac_address invalid: {}", e))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bridge: BridgeConfig {
                name: "KAKU Bridge".to_string(),
                // Locally-administered placeholder; every installation must
                // set the real hardware MAC.
                mac_address: "02:00:00:00:00:01".to_string(),
                maintenance_hour: default_maintenance_hour(),
                min_uptime_hours: default_min_uptime_hours(),
                settle_delay_secs: default_settle_delay_secs(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            telegram: TelegramConfig::default(),
            provisioning: ProvisioningConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("kakubridge.log".to_string()),
                security_file: Some("kakubridge-security.log".to_string()),
            },
        }
    }
}
