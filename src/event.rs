//! Event records from the feed.
//!
//! One NDJSON line per event, one JSON object per line, no envelope. No
//! field is guaranteed present: the payload shape is the upstream tool's
//! implementation detail, not this crate's contract. Events therefore stay
//! raw [`serde_json::Value`]s behind typed accessors that tolerate absence.
//!
//! The fingerprint is a SHA-256 over the canonical JSON serialization of
//! the event. `serde_json`'s default map is ordered by key, so two lines
//! that differ only in key order share a fingerprint. It is a local dedup
//! key only, never a source identifier; the feed guarantees neither
//! ordering nor exactly-once delivery.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Broad classification of an event, from its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A tool invocation (command, file edit, ...).
    Tool,
    /// A status transition with detail text.
    Status,
    /// A chat message between instances.
    Message,
    /// Instance start/stop bookkeeping.
    Lifecycle,
    /// Anything else, including a missing `type` field.
    Other,
}

impl EventKind {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Status => "status",
            Self::Message => "message",
            Self::Lifecycle => "lifecycle",
            Self::Other => "other",
        }
    }

    fn parse(kind: Option<&str>) -> Self {
        match kind {
            Some("tool") => Self::Tool,
            Some("status") => Self::Status,
            Some("message") => Self::Message,
            Some("lifecycle") => Self::Lifecycle,
            _ => Self::Other,
        }
    }
}

/// One parsed event plus its dedup fingerprint.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    value: Value,
    fingerprint: String,
}

impl AuditEvent {
    /// Wrap an already-parsed JSON object and compute its fingerprint.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let fingerprint = fingerprint_value(&value);
        Self { value, fingerprint }
    }

    /// Parse one feed line. Returns `None` for anything that is not a JSON
    /// object; the caller decides whether that counts as malformed.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        value.is_object().then(|| Self::from_value(value))
    }

    /// The dedup fingerprint (lowercase hex SHA-256).
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The raw event value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Event classification from the `type` field.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::parse(self.value.get("type").and_then(Value::as_str))
    }

    /// Originating instance, wherever the feed put it.
    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.str_field("instance")
            .or_else(|| self.data_field("instance"))
            .or_else(|| self.str_field("from"))
    }

    /// Tool name for tool events.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.str_field("tool_name")
            .or_else(|| self.data_field("tool_name"))
    }

    /// Shell command text, when the event carries one.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.tool_input()?.get("command")?.as_str()
    }

    /// File path of an edit event.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.tool_input()?.get("file_path")?.as_str()
    }

    /// File content being written, for edit events.
    #[must_use]
    pub fn file_text(&self) -> Option<&str> {
        let input = self.tool_input()?;
        input
            .get("new_string")
            .or_else(|| input.get("content"))?
            .as_str()
    }

    /// Status detail or message body, whichever the event carries.
    #[must_use]
    pub fn message_text(&self) -> Option<&str> {
        self.str_field("status_detail")
            .or_else(|| self.data_field("status_detail"))
            .or_else(|| self.str_field("message"))
            .or_else(|| self.str_field("text"))
            .or_else(|| self.data_field("message"))
    }

    /// Compact JSON of the whole event, the fallback payload for
    /// `scope: any` rules.
    #[must_use]
    pub fn to_compact_json(&self) -> String {
        canonical_json(&self.value)
    }

    fn tool_input(&self) -> Option<&Value> {
        self.value
            .get("tool_input")
            .or_else(|| self.value.get("data")?.get("tool_input"))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key)?.as_str()
    }

    fn data_field(&self, key: &str) -> Option<&str> {
        self.value.get("data")?.get(key)?.as_str()
    }
}

/// A batch of parsed feed lines.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    /// Events in feed order.
    pub events: Vec<AuditEvent>,
    /// Lines that were not valid JSON objects. Never fingerprinted.
    pub malformed: usize,
}

/// Parse a block of NDJSON feed output, line by line.
///
/// A malformed line is counted and skipped; it never halts the stream and
/// never enters the dedup set. Blank lines are ignored entirely.
#[must_use]
pub fn parse_feed_lines(text: &str) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match AuditEvent::parse_line(trimmed) {
            Some(event) => batch.events.push(event),
            None => {
                batch.malformed += 1;
                debug!(line = %truncate_display(trimmed, 80), "skipping malformed feed line");
            }
        }
    }
    batch
}

/// SHA-256 over the canonical JSON of a value, lowercase hex.
#[must_use]
pub fn fingerprint_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

// Serializing a Value cannot fail (map keys are always strings); the empty
// string fallback is unreachable in practice.
fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Truncate text for display, appending an ellipsis when cut.
///
/// Operates on characters, so multi-byte text never splits mid-codepoint.
#[must_use]
pub fn truncate_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod parsing {
        use super::*;

        #[test]
        fn valid_object_line_parses() {
            let ev = AuditEvent::parse_line(r#"{"type":"tool","instance":"alpha"}"#).unwrap();
            assert_eq!(ev.kind(), EventKind::Tool);
            assert_eq!(ev.instance(), Some("alpha"));
        }

        #[test]
        fn truncated_line_is_rejected() {
            assert!(AuditEvent::parse_line(r#"{"type":"tool","ins"#).is_none());
        }

        #[test]
        fn non_object_json_is_rejected() {
            assert!(AuditEvent::parse_line("42").is_none());
            assert!(AuditEvent::parse_line(r#""just a string""#).is_none());
            assert!(AuditEvent::parse_line("[1,2,3]").is_none());
        }

        #[test]
        fn parsing_is_idempotent() {
            let line = r#"{"type":"status","instance":"beta","status_detail":"ok"}"#;
            let first = AuditEvent::parse_line(line).unwrap();
            let second = AuditEvent::parse_line(line).unwrap();
            assert_eq!(first.value(), second.value());
            assert_eq!(first.fingerprint(), second.fingerprint());
        }

        #[test]
        fn batch_parse_counts_malformed_and_keeps_order() {
            let text = "\n{\"type\":\"tool\",\"n\":1}\nnot json\n{\"type\":\"tool\",\"n\":2}\n{broken\n";
            let batch = parse_feed_lines(text);
            assert_eq!(batch.events.len(), 2);
            assert_eq!(batch.malformed, 2);
            assert_eq!(batch.events[0].value()["n"], json!(1));
            assert_eq!(batch.events[1].value()["n"], json!(2));
        }
    }

    mod fingerprints {
        use super::*;

        #[test]
        fn key_order_does_not_matter() {
            let a = AuditEvent::parse_line(r#"{"a":1,"b":{"x":true,"y":2}}"#).unwrap();
            let b = AuditEvent::parse_line(r#"{"b":{"y":2,"x":true},"a":1}"#).unwrap();
            assert_eq!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn different_payloads_differ() {
            let a = AuditEvent::parse_line(r#"{"a":1}"#).unwrap();
            let b = AuditEvent::parse_line(r#"{"a":2}"#).unwrap();
            assert_ne!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn fingerprint_is_hex_sha256() {
            let ev = AuditEvent::parse_line(r#"{"a":1}"#).unwrap();
            assert_eq!(ev.fingerprint().len(), 64);
            assert!(ev.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    mod accessors {
        use super::*;

        #[test]
        fn instance_falls_back_to_data_then_from() {
            let top = AuditEvent::from_value(json!({"instance": "a"}));
            let nested = AuditEvent::from_value(json!({"data": {"instance": "b"}}));
            let from = AuditEvent::from_value(json!({"from": "c"}));
            let none = AuditEvent::from_value(json!({"type": "tool"}));
            assert_eq!(top.instance(), Some("a"));
            assert_eq!(nested.instance(), Some("b"));
            assert_eq!(from.instance(), Some("c"));
            assert_eq!(none.instance(), None);
        }

        #[test]
        fn command_and_file_fields_come_from_tool_input() {
            let ev = AuditEvent::from_value(json!({
                "type": "tool",
                "tool_name": "Bash",
                "tool_input": {"command": "ls -la"}
            }));
            assert_eq!(ev.command(), Some("ls -la"));
            assert_eq!(ev.file_text(), None);

            let edit = AuditEvent::from_value(json!({
                "type": "tool",
                "tool_name": "Edit",
                "data": {"tool_input": {"file_path": "src/x.py", "new_string": "pass"}}
            }));
            assert_eq!(edit.file_path(), Some("src/x.py"));
            assert_eq!(edit.file_text(), Some("pass"));
        }

        #[test]
        fn file_text_falls_back_to_content() {
            let ev = AuditEvent::from_value(json!({
                "tool_input": {"content": "full file body"}
            }));
            assert_eq!(ev.file_text(), Some("full file body"));
        }

        #[test]
        fn message_text_checks_the_usual_places() {
            let status = AuditEvent::from_value(json!({"status_detail": "committing"}));
            let text = AuditEvent::from_value(json!({"text": "hello"}));
            let nested = AuditEvent::from_value(json!({"data": {"status_detail": "idle"}}));
            assert_eq!(status.message_text(), Some("committing"));
            assert_eq!(text.message_text(), Some("hello"));
            assert_eq!(nested.message_text(), Some("idle"));
        }

        #[test]
        fn kind_maps_unknown_to_other() {
            let ev = AuditEvent::from_value(json!({"type": "telemetry"}));
            assert_eq!(ev.kind(), EventKind::Other);
            let missing = AuditEvent::from_value(json!({}));
            assert_eq!(missing.kind(), EventKind::Other);
        }
    }

    mod display {
        use super::*;

        #[test]
        fn truncate_keeps_short_text() {
            assert_eq!(truncate_display("short", 10), "short");
        }

        #[test]
        fn truncate_appends_ellipsis() {
            assert_eq!(truncate_display("abcdefghij", 5), "abcd…");
        }

        #[test]
        fn truncate_respects_multibyte_text() {
            let text = "приватный ключ в коде";
            let cut = truncate_display(text, 10);
            assert_eq!(cut.chars().count(), 10);
            assert!(cut.ends_with('…'));
        }
    }
}
