//! Shared connection state
//!
//! The stream consumer and the MQTT event loop write these flags from their own
//! tasks while the health endpoint reads them per request. Every access is a
//! single atomic load or store, so no lock is ever held across an await.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connectivity of the two links the bridge depends on
#[derive(Debug, Default)]
pub struct ConnectionFlags {
    stream_connected: AtomicBool,
    bus_connected: AtomicBool,
}

/// Point-in-time copy of [`ConnectionFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub stream_connected: bool,
    pub bus_connected: bool,
}

impl ConnectionFlags {
    /// Both links start disconnected
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for the usual `Arc`-shared instance
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record the event stream state, returning the previous value
    pub fn set_stream_connected(&self, connected: bool) -> bool {
        self.stream_connected.swap(connected, Ordering::SeqCst)
    }

    /// Record the MQTT connection state, returning the previous value
    pub fn set_bus_connected(&self, connected: bool) -> bool {
        self.bus_connected.swap(connected, Ordering::SeqCst)
    }

    pub fn stream_connected(&self) -> bool {
        self.stream_connected.load(Ordering::SeqCst)
    }

    pub fn bus_connected(&self) -> bool {
        self.bus_connected.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            stream_connected: self.stream_connected(),
            bus_connected: self.bus_connected(),
        }
    }
}
