//! Doorbell bridge
//!
//! Listens to a network doorbell's HTTP event stream and republishes button
//! presses on an MQTT broker, with a health endpoint that reports whether both
//! links are up and the doorbell answers.
//!
//! # Overview
//!
//! - [`device`] - digest-authenticated HTTP client for the doorbell
//! - [`stream`] - supervised consumer of the device event stream
//! - [`protocol`] - device paths, record signatures and MQTT topics
//! - [`transport`] - MQTT publish gateway
//! - [`observability`] - structured logging and the `/health` endpoint
//! - [`bridge`] - lifecycle wiring all of the above together
//!
//! # Quick Start
//!
//! ```rust
//! use doorbell_bridge::protocol::{match_line, EventKind};
//!
//! let line = b"Code=AlarmLocal;action=Start;index=0";
//! assert_eq!(match_line(line), Some(EventKind::DoorbellPressed));
//! assert_eq!(EventKind::DoorbellPressed.topic(), "doorbell/pressed");
//!
//! // The stop record is one byte shorter
//! assert_eq!(match_line(b"Code=AlarmLocal;action=Stop;index=0"), None);
//! ```

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod state;
pub mod stream;
pub mod testing;
pub mod transport;

pub use bridge::{Bridge, BridgePhase};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use state::{ConnectionFlags, ConnectionSnapshot};
pub use transport::mqtt::MqttGateway;
