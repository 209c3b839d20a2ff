//! Top-level error type for the bridge
//!
//! Each subsystem owns a focused error enum. `BridgeError` aggregates the ones
//! that can abort startup; everything else is logged where it happens.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Device client error: {0}")]
    Device(#[from] crate::device::DeviceError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] crate::transport::mqtt::MqttError),

    #[error("Health server error: {0}")]
    HealthServer(#[from] crate::observability::health::HealthServerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
