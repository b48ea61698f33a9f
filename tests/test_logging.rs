//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format parsing and level selection from environment values.

use ada_feed::observability::logging::{parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_json() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("JSON"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("Json"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_pretty() {
    assert!(matches!(LogFormat::parse("pretty"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    // A CLI run in a terminal falls back to the terminal-friendly format
    assert!(matches!(LogFormat::parse("invalid"), LogFormat::Compact));
    assert!(matches!(LogFormat::parse(""), LogFormat::Compact));
    assert!(matches!(LogFormat::parse("xml"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_whitespace() {
    assert!(matches!(LogFormat::parse("  json  "), LogFormat::Json));
    assert!(matches!(LogFormat::parse("json\n"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("\tpretty"), LogFormat::Pretty));
}

#[test]
fn test_log_level_parsing_is_case_insensitive() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("Warn"), Level::WARN);
    assert_eq!(parse_level("DEBUG"), Level::DEBUG);
}

#[test]
fn test_log_level_unknown_defaults_to_info() {
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_log_format_clone_and_copy() {
    let format = LogFormat::Pretty;
    let copied = format;

    assert!(matches!(format, LogFormat::Pretty));
    assert!(matches!(copied, LogFormat::Pretty));
}
