//! MQTT publish gateway
//!
//! The module separates pure decisions from I/O:
//!
//! - [`connection`] - connection state, options and reconnect backoff
//! - [`message_handler`] - routing of rumqttc events to state changes
//! - [`client`] - the gateway itself: event loop task, publish, disconnect
//!
//! # Usage
//!
//! ```rust,no_run
//! use doorbell_bridge::config::MqttSection;
//! use doorbell_bridge::protocol::EventKind;
//! use doorbell_bridge::state::ConnectionFlags;
//! use doorbell_bridge::transport::{mqtt::MqttGateway, EventPublisher};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     client_id: "doorbell".to_string(),
//!     username: "bridge".to_string(),
//!     password: "secret".to_string(),
//!     keep_alive_secs: 30,
//!     publish_timeout_ms: 5000,
//!     disconnect_grace_ms: 250,
//! };
//!
//! let gateway = MqttGateway::connect(&config, ConnectionFlags::shared()).await?;
//! gateway.publish_event(EventKind::DoorbellPressed).await?;
//! gateway.disconnect(Duration::from_millis(250)).await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttGateway;
pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use message_handler::{EventRoute, MessageHandler};
