//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that resolve options from
//! environment-style lookups.

use doorbell_bridge::observability::logging::{parse_level, LogFormat, LoggingOptions};
use tracing::Level;

fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key| {
        pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

#[test]
fn test_log_format_parse_case_insensitive() {
    assert_eq!(LogFormat::parse("jSoN"), LogFormat::Json);
    assert_eq!(LogFormat::parse("PrEtTy"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("CoMpAcT"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    assert_eq!(LogFormat::parse("123"), LogFormat::Json);
}

#[test]
fn test_unknown_level_defaults_to_info() {
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_production_defaults() {
    let options = LoggingOptions::from_lookup(lookup(&[]), 0);
    assert_eq!(options.level, Level::INFO);
    assert_eq!(options.format, LogFormat::Json);
    assert!(!options.include_spans);
}

#[test]
fn test_development_settings() {
    let options = LoggingOptions::from_lookup(
        lookup(&[("LOG_FORMAT", "pretty"), ("LOG_SPANS", "true")]),
        1,
    );
    assert_eq!(options.level, Level::DEBUG);
    assert_eq!(options.format, LogFormat::Pretty);
    assert!(options.include_spans);
}

#[test]
fn test_verbose_keeps_more_detailed_level() {
    let options = LoggingOptions::from_lookup(lookup(&[("LOG_LEVEL", "trace")]), 1);
    assert_eq!(options.level, Level::TRACE);
}

#[test]
fn test_log_level_error_without_verbose() {
    let options = LoggingOptions::from_lookup(lookup(&[("LOG_LEVEL", "error")]), 0);
    assert_eq!(options.level, Level::ERROR);
}
