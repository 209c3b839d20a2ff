//! Testing utilities and mock implementations
//!
//! Lets the consumer, the publisher seam and the health server be exercised
//! without a doorbell or an MQTT broker.

pub mod mocks;

pub use mocks::*;
