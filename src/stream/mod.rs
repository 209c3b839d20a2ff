//! Device event stream consumption
//!
//! The consumer keeps one long-lived connection to the device's event feed,
//! scans it line by line for the doorbell signature and hands matches to the
//! publisher. Any interruption ends the current attempt; the supervisor loop
//! waits a fixed cooldown and tries again until shutdown.
//!
//! - [`scanner`] - bounded newline splitting over arbitrary chunk boundaries
//! - [`consumer`] - the connect/scan/cooldown loop

pub mod consumer;
pub mod scanner;

pub use consumer::{IterationOutcome, IterationReport, StreamConsumer, SupervisorSummary};
pub use scanner::{LineScanner, MAX_LINE_LENGTH};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Event stream errors. All of them are transient.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Failed to open event stream: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Event stream answered with HTTP status {0}")]
    Status(u16),
    #[error("Failed to read event stream: {0}")]
    Read(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Event stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Something that can open the device event feed
#[async_trait]
pub trait EventSource: Send + Sync {
    type Body: EventBody;

    /// Open the feed. Only a successful (HTTP 200) response yields a body.
    async fn open(&self) -> Result<Self::Body, StreamError>;
}

/// An open event feed
#[async_trait]
pub trait EventBody: Send {
    /// Next chunk of raw bytes, `None` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError>;
}

/// Waits between stream attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
