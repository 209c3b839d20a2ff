//! Doorbell device protocol constants
//!
//! The device reports alarm activity as newline-delimited records on a long-lived
//! HTTP response. The record we care about is
//!
//! ```text
//! Code=AlarmLocal;action=Start;index=0
//! ```
//!
//! Its shape never changes, so a record is identified by its exact length and a
//! single discriminating byte instead of being parsed. The `Stop` variant is one
//! byte shorter and has `o` at offset 25.

/// Path of the event manager CGI that serves the event stream
pub const EVENT_STREAM_PATH: &str = "/cgi-bin/eventManager.cgi";

/// Event codes the stream is attached to
pub const EVENT_STREAM_CODES: &str = "[AlarmLocal]";

/// Path of the configuration CGI used for the online probe
pub const CONFIG_MANAGER_PATH: &str = "/cgi-bin/configManager.cgi";

/// Query that tells the device the bridge is online
pub const ONLINE_PROBE_QUERY: &str = "action=setConfig&VSP_PaaS.Online=true";

/// MQTT topic for doorbell presses
pub const DOORBELL_PRESSED_TOPIC: &str = "doorbell/pressed";

/// Kinds of device events the bridge translates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DoorbellPressed,
}

impl EventKind {
    /// MQTT topic this event is published on
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::DoorbellPressed => DOORBELL_PRESSED_TOPIC,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DoorbellPressed => "doorbell_pressed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-shape record signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSignature {
    /// Human readable record name, for logs
    pub name: &'static str,
    /// Exact record length in bytes, line terminator excluded
    pub length: usize,
    /// Offset of the discriminating byte
    pub offset: usize,
    /// Value the discriminating byte must have
    pub expected: u8,
    pub kind: EventKind,
}

impl EventSignature {
    pub fn matches(&self, line: &[u8]) -> bool {
        line.len() == self.length && line.get(self.offset) == Some(&self.expected)
    }
}

/// Every record signature the bridge reacts to
pub const SIGNATURES: &[EventSignature] = &[EventSignature {
    name: "AlarmLocal start",
    length: 36,
    offset: 25,
    expected: b'a',
    kind: EventKind::DoorbellPressed,
}];

/// Find the signature a stream line matches, if any
pub fn match_signature(line: &[u8]) -> Option<&'static EventSignature> {
    SIGNATURES.iter().find(|signature| signature.matches(line))
}

/// Classify a stream line
pub fn match_line(line: &[u8]) -> Option<EventKind> {
    match_signature(line).map(|signature| signature.kind)
}
