//! Observability: structured logging and the health endpoint

pub mod health;
pub mod logging;

pub use health::{HealthReport, HealthServer, HealthServerHandle, PresenceProbe, ProbeError};
pub use logging::{init_default_logging, init_logging, LogFormat, LoggingOptions};

// Span macros for structured logging
pub use logging::{health_span, lifecycle_span, mqtt_span, stream_span};
