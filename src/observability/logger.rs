//! Structured JSON logger
//!
//! - One log line = one event
//! - Deterministic key ordering (`event`, `severity`, then fields by name)
//! - Synchronous, no buffering
//!
//! Every line goes to stderr; stdout carries CLI results only.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use serde_json::Value;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Planner decisions
    Trace,
    Info,
    /// Abandoned work
    Warn,
    /// Rejected or failed work
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders one log line: `event`, `severity`, then fields sorted by key.
/// A repeated key keeps its last value.
fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let sorted: BTreeMap<&str, &str> = fields.iter().copied().collect();

    let mut line = String::with_capacity(128);
    line.push_str("{\"event\":");
    line.push_str(&quote(event));
    line.push_str(",\"severity\":");
    line.push_str(&quote(severity.as_str()));
    for (key, value) in sorted {
        line.push(',');
        line.push_str(&quote(key));
        line.push(':');
        line.push_str(&quote(value));
    }
    line.push_str("}\n");
    line
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Stateless JSON-lines logger
pub struct Logger;

impl Logger {
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        Self::write_line(&render(severity, event, fields), &mut io::stderr().lock());
    }

    // One write per line; a failed diagnostic write is dropped
    fn write_line<W: Write>(line: &str, writer: &mut W) {
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

/// Capture logs to a buffer for testing
#[cfg(test)]
pub fn capture_log(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::write_line(&render(severity, event, fields), &mut buffer);
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_log_json_format() {
        let output = capture_log(Severity::Trace, "SORT_ADDED", &[("keys", "T.T_D2 ASC")]);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "SORT_ADDED");
        assert_eq!(parsed["severity"], "TRACE");
        assert_eq!(parsed["keys"], "T.T_D2 ASC");
    }

    #[test]
    fn test_log_deterministic_ordering() {
        let output1 = capture_log(Severity::Info, "CATALOG_LOADED", &[("tables", "4"), ("path", "c.json"), ("format", "1")]);
        let output2 = capture_log(Severity::Info, "CATALOG_LOADED", &[("path", "c.json"), ("format", "1"), ("tables", "4")]);
        assert_eq!(output1, output2);

        let format_pos = output1.find("\"format\"").unwrap();
        let path_pos = output1.find("\"path\"").unwrap();
        let tables_pos = output1.find("\"tables\"").unwrap();
        assert!(format_pos < path_pos);
        assert!(path_pos < tables_pos);
    }

    #[test]
    fn test_log_escapes_special_chars() {
        let output = capture_log(Severity::Info, "TEST", &[("clause", "T.\"D\"\nx")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["clause"], "T.\"D\"\nx");
    }

    #[test]
    fn test_log_one_line() {
        let output = capture_log(Severity::Info, "TEST", &[("a", "1"), ("b", "2")]);
        assert_eq!(output.chars().filter(|c| *c == '\n').count(), 1);
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_log_repeated_key_keeps_last() {
        let output = capture_log(Severity::Warn, "PLAN_INCOMPLETE", &[("reason", "a"), ("reason", "b")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["reason"], "b");
        assert_eq!(output.matches("reason").count(), 1);
    }

    #[test]
    fn test_log_event_first() {
        let output = capture_log(Severity::Info, "MY_EVENT", &[("aaa", "1")]);
        let event_pos = output.find("\"event\"").unwrap();
        let severity_pos = output.find("\"severity\"").unwrap();
        let field_pos = output.find("\"aaa\"").unwrap();
        assert!(event_pos < severity_pos);
        assert!(severity_pos < field_pos);
    }
}
