//! Structured logging using the tracing crate
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: Log level (ERROR, WARN, INFO, DEBUG, TRACE) - defaults to INFO
//! - `LOG_FORMAT`: Output format (json, pretty, compact) - defaults to json
//! - `LOG_SPANS`: Include span open/close events (true/false) - defaults to false
//! - `RUST_LOG`: Override log filtering entirely (env_logger syntax)
//!
//! ```bash
//! # Production JSON logging
//! LOG_FORMAT=json LOG_LEVEL=INFO ./doorbell-bridge run
//!
//! # Development with colors
//! LOG_FORMAT=pretty ./doorbell-bridge -v run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies that are noisy at INFO
const QUIET_DEPENDENCIES: &[&str] = &["rumqttc", "hyper", "reqwest", "warp", "tokio"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string, defaulting to JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingOptions {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            include_spans: false,
        }
    }
}

impl LoggingOptions {
    /// Read `LOG_LEVEL`, `LOG_FORMAT` and `LOG_SPANS` through `lookup`
    ///
    /// Without `-v` the configured level is used as is. Each `-v` raises it
    /// to at least DEBUG, then TRACE; a more detailed `LOG_LEVEL` is kept.
    pub fn from_lookup<F>(lookup: F, verbosity: u8) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let configured = lookup("LOG_LEVEL")
            .map(|value| parse_level(&value))
            .unwrap_or(Level::INFO);
        // `Level` orders more verbose levels as greater
        let level = match verbosity {
            0 => configured,
            1 => configured.max(Level::DEBUG),
            _ => Level::TRACE,
        };

        Self {
            level,
            format: lookup("LOG_FORMAT")
                .map(|value| LogFormat::parse(&value))
                .unwrap_or(LogFormat::Json),
            include_spans: lookup("LOG_SPANS")
                .map(|value| value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn from_env(verbosity: u8) -> Self {
        Self::from_lookup(|key| env::var(key).ok(), verbosity)
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" | "WARNING" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Filter for `level` with dependency noise reduced, unless `RUST_LOG` is set
fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    let mut filter = EnvFilter::new(level.to_string());
    // Dependencies stay at WARN unless the bridge itself is tracing
    if level < Level::TRACE {
        for dependency in QUIET_DEPENDENCIES {
            if let Ok(directive) = format!("{dependency}=warn").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(
    options: LoggingOptions,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let span_events = if options.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::registry().with(build_filter(options.level));

    match options.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_span_events(span_events))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(span_events),
            )
            .try_init(),
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging(verbosity: u8) -> Result<(), tracing_subscriber::util::TryInitError> {
    init_logging(LoggingOptions::from_env(verbosity))
}

/// Span around one event stream connection attempt
#[macro_export]
macro_rules! stream_span {
    ($($field:tt)*) => {
        tracing::info_span!("event_stream", $($field)*)
    };
}

/// Create an MQTT operation span
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Span around one health check request
#[macro_export]
macro_rules! health_span {
    ($($field:tt)*) => {
        tracing::info_span!("health_check", $($field)*)
    };
}

/// Create a lifecycle event span
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("lifecycle_event", $($field)*)
    };
}

pub use {health_span, lifecycle_span, mqtt_span, stream_span};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("cOmPaCt"), LogFormat::Compact);
    }

    #[test]
    fn test_log_format_parse_invalid_defaults_to_json() {
        for input in ["", "xml", "yaml", "invalid"] {
            assert_eq!(LogFormat::parse(input), LogFormat::Json, "input: '{input}'");
        }
    }

    #[test]
    fn test_parse_level() {
        let cases = [
            ("ERROR", Level::ERROR),
            ("warn", Level::WARN),
            ("Warning", Level::WARN),
            ("info", Level::INFO),
            (" debug ", Level::DEBUG),
            ("TRACE", Level::TRACE),
            ("loud", Level::INFO),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_level(input), expected, "Failed for input: {input}");
        }
    }

    #[test]
    fn test_options_defaults() {
        assert_eq!(
            LoggingOptions::from_lookup(lookup(&[]), 0),
            LoggingOptions::default()
        );
    }

    #[test]
    fn test_options_from_lookup() {
        let options = LoggingOptions::from_lookup(
            lookup(&[
                ("LOG_LEVEL", "warn"),
                ("LOG_FORMAT", "compact"),
                ("LOG_SPANS", "TRUE"),
            ]),
            0,
        );
        assert_eq!(options.level, Level::WARN);
        assert_eq!(options.format, LogFormat::Compact);
        assert!(options.include_spans);
    }

    #[test]
    fn test_log_spans_only_true_enables() {
        for value in ["yes", "1", "false", ""] {
            let options = LoggingOptions::from_lookup(lookup(&[("LOG_SPANS", value)]), 0);
            assert!(!options.include_spans, "LOG_SPANS='{value}'");
        }
    }

    #[test]
    fn test_quieter_configured_level_is_kept() {
        for (value, expected) in [("ERROR", Level::ERROR), ("WARN", Level::WARN)] {
            let options = LoggingOptions::from_lookup(lookup(&[("LOG_LEVEL", value)]), 0);
            assert_eq!(options.level, expected, "LOG_LEVEL={value}");
        }
    }

    #[test]
    fn test_verbosity_raises_level() {
        let options = LoggingOptions::from_lookup(lookup(&[("LOG_LEVEL", "ERROR")]), 1);
        assert_eq!(options.level, Level::DEBUG);

        let options = LoggingOptions::from_lookup(lookup(&[]), 2);
        assert_eq!(options.level, Level::TRACE);

        // Never lowers an explicit TRACE
        let options = LoggingOptions::from_lookup(lookup(&[("LOG_LEVEL", "TRACE")]), 1);
        assert_eq!(options.level, Level::TRACE);
    }
}
