//! Bridge configuration
//!
//! Configuration comes from one of two places:
//!
//! - the process environment (the default), after `.env.local` and `.env` have been
//!   loaded with dotenvy. Variables already present in the environment win.
//! - a TOML file passed with `--config`.
//!
//! Every credential and endpoint is required. A missing or empty value is a fatal
//! startup error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable names for the required settings
pub mod env_keys {
    pub const DEVICE_USERNAME: &str = "USERNAME";
    pub const DEVICE_PASSWORD: &str = "PASSWORD";
    pub const DEVICE_HOST: &str = "HOSTNAME_OR_IP";
    pub const MQTT_BROKER_URL: &str = "MQTT_BROKER_URL";
    pub const MQTT_CLIENT_ID: &str = "MQTT_CLIENT_ID";
    pub const MQTT_USERNAME: &str = "MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "MQTT_PASSWORD";
    pub const HEALTH_PORT: &str = "HEALTH_PORT";
    pub const RETRY_COOLDOWN_SECS: &str = "RETRY_COOLDOWN_SECS";
    pub const STREAM_HEARTBEAT_SECS: &str = "STREAM_HEARTBEAT_SECS";
}

const MASK: &str = "***";

/// Complete bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub stream: StreamSection,
}

/// Doorbell device connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Hostname or IP address, optionally with `:port`
    pub host: String,
    /// Digest authentication username
    pub username: String,
    /// Digest authentication password
    pub password: String,
    /// Timeout for the online probe issued by the health endpoint
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, e.g. `mqtt://broker.local:1883`
    pub broker_url: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long a publish may wait for the client to accept it
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Grace period for flushing the DISCONNECT packet at shutdown
    #[serde(default = "default_disconnect_grace")]
    pub disconnect_grace_ms: u64,
}

/// Health endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    #[serde(default = "default_health_port")]
    pub port: u16,
    /// Deadline for draining in-flight requests at shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            port: default_health_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

/// Event stream settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSection {
    /// Fixed wait after every failed or finished stream attempt
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,
    /// Heartbeat interval the device is asked to keep the stream alive with
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            retry_cooldown_secs: default_retry_cooldown(),
            heartbeat_secs: default_heartbeat(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    30
}

fn default_publish_timeout() -> u64 {
    5000
}

fn default_disconnect_grace() -> u64 {
    250
}

fn default_health_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_retry_cooldown() -> u64 {
    5
}

fn default_heartbeat() -> u64 {
    30
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("{0} is required")]
    MissingValue(String),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the process environment, reading `.env.local`
    /// and `.env` first when they exist
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing dotenv files are normal in container deployments
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingValue(key.to_string()))
        };

        let config = BridgeConfig {
            device: DeviceSection {
                username: required(env_keys::DEVICE_USERNAME)?,
                password: required(env_keys::DEVICE_PASSWORD)?,
                host: required(env_keys::DEVICE_HOST)?,
                probe_timeout_secs: default_probe_timeout(),
            },
            mqtt: MqttSection {
                broker_url: required(env_keys::MQTT_BROKER_URL)?,
                client_id: required(env_keys::MQTT_CLIENT_ID)?,
                username: required(env_keys::MQTT_USERNAME)?,
                password: required(env_keys::MQTT_PASSWORD)?,
                keep_alive_secs: default_keep_alive(),
                publish_timeout_ms: default_publish_timeout(),
                disconnect_grace_ms: default_disconnect_grace(),
            },
            health: HealthSection {
                port: parse_optional(&lookup, env_keys::HEALTH_PORT)?
                    .unwrap_or_else(default_health_port),
                shutdown_grace_secs: default_shutdown_grace(),
            },
            stream: StreamSection {
                retry_cooldown_secs: parse_optional(&lookup, env_keys::RETRY_COOLDOWN_SECS)?
                    .unwrap_or_else(default_retry_cooldown),
                heartbeat_secs: parse_optional(&lookup, env_keys::STREAM_HEARTBEAT_SECS)?
                    .unwrap_or_else(default_heartbeat),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that every required value is present and usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("device.host", &self.device.host),
            ("device.username", &self.device.username),
            ("device.password", &self.device.password),
            ("mqtt.broker_url", &self.mqtt.broker_url),
            ("mqtt.client_id", &self.mqtt.client_id),
            ("mqtt.username", &self.mqtt.username),
            ("mqtt.password", &self.mqtt.password),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingValue(key.to_string()));
            }
        }

        if self.stream.retry_cooldown_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "stream.retry_cooldown_secs must be greater than 0".to_string(),
            ));
        }

        if self.stream.heartbeat_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "stream.heartbeat_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy of this configuration with every secret replaced by a mask
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.device.password = MASK.to_string();
        masked.mqtt.password = MASK.to_string();
        masked
    }

    /// Render the masked configuration as TOML
    pub fn to_masked_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.masked())?)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
host = "192.168.1.20"
username = "admin"
password = "device-secret"

[mqtt]
broker_url = "mqtt://localhost:1883"
client_id = "doorbell-bridge"
username = "bridge"
password = "mqtt-secret"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}
