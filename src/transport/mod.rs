//! Message bus transport
//!
//! The stream consumer only needs to publish detected events. This module
//! defines that seam as [`EventPublisher`] and provides the MQTT implementation.

use crate::protocol::EventKind;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Publish failures. None of them are retried; the event is dropped.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The bus link was down, nothing was sent
    #[error("Not connected to message bus, publish not attempted")]
    NotConnected,
    /// The client refused the publish request
    #[error("Publish rejected")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The client did not accept the request in time
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),
}

impl PublishError {
    /// Whether the message may have left the process
    pub fn was_attempted(&self) -> bool {
        !matches!(self, PublishError::NotConnected)
    }
}

/// Publishes detected device events
///
/// `Ok` means the client accepted the message for sending, not that it reached
/// the broker. Errors are reported to the caller, never retried.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_event(&self, kind: EventKind) -> Result<(), PublishError>;
}
