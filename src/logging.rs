//! Audit trail logging.
//!
//! Diagnostics go through `tracing`; this module is the durable audit
//! trail instead: one line per finding (and optionally per clean event)
//! appended to a file, in text or JSON form. Disabled by default. A
//! logger that cannot open its file disables itself with a warning
//! rather than failing the session; losing the trail is better than
//! losing the auditor.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::expand_tilde;
use crate::engine::Finding;
use crate::event::AuditEvent;

/// On-disk line format for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One human-scannable line per entry.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Audit trail configuration (the `audit_log` config section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLogConfig {
    pub enabled: bool,
    pub file: String,
    pub format: LogFormat,
    /// Also log events that produced no findings.
    pub include_clean: bool,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file: "~/.local/share/esa/audit.log".to_string(),
            format: LogFormat::Text,
            include_clean: false,
        }
    }
}

#[derive(Serialize)]
struct LogEntry<'a> {
    ts: String,
    entry: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<&'a str>,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<&'a str>,
}

/// File-backed audit trail writer.
pub struct AuditLogger {
    writer: Mutex<BufWriter<fs::File>>,
    format: LogFormat,
    include_clean: bool,
    path: PathBuf,
}

impl AuditLogger {
    /// Open the audit trail per config. Returns `None` when disabled or
    /// when the file cannot be opened (logged, non-fatal).
    #[must_use]
    pub fn from_config(config: &AuditLogConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let path = expand_tilde(&config.file);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %e, "audit log disabled: cannot create directory");
                return None;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Self {
                writer: Mutex::new(BufWriter::new(file)),
                format: config.format,
                include_clean: config.include_clean,
                path,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "audit log disabled: cannot open file");
                None
            }
        }
    }

    /// Whether clean events should be logged too.
    #[must_use]
    pub const fn include_clean(&self) -> bool {
        self.include_clean
    }

    /// The trail's resolved path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one finding to the trail.
    pub fn log_finding(&self, finding: &Finding) {
        let ts = timestamp();
        let line = match self.format {
            LogFormat::Text => format!(
                "{ts} finding rule={} category={} severity={} action={} instance={} kind={} evidence={}",
                finding.rule,
                finding.category.label(),
                finding.severity.label(),
                finding.action.label(),
                finding.instance.as_deref().unwrap_or("-"),
                finding.kind.label(),
                finding.evidence
            ),
            LogFormat::Json => render_json(&LogEntry {
                ts,
                entry: "finding",
                rule: Some(&finding.rule),
                category: Some(finding.category.label()),
                severity: Some(finding.severity.label()),
                action: Some(finding.action.label()),
                instance: finding.instance.as_deref(),
                kind: finding.kind.label(),
                location: finding.location.as_deref(),
                evidence: Some(&finding.evidence),
                fingerprint: None,
            }),
        };
        self.write_line(&line);
    }

    /// Append a clean-event marker, when configured to.
    pub fn log_clean(&self, event: &AuditEvent) {
        if !self.include_clean {
            return;
        }
        let ts = timestamp();
        let fingerprint = &event.fingerprint()[..12.min(event.fingerprint().len())];
        let line = match self.format {
            LogFormat::Text => format!(
                "{ts} clean kind={} instance={} fingerprint={fingerprint}",
                event.kind().label(),
                event.instance().unwrap_or("-")
            ),
            LogFormat::Json => render_json(&LogEntry {
                ts,
                entry: "clean",
                rule: None,
                category: None,
                severity: None,
                action: None,
                instance: event.instance(),
                kind: event.kind().label(),
                location: None,
                evidence: None,
                fingerprint: Some(fingerprint),
            }),
        };
        self.write_line(&line);
    }

    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            warn!(path = %self.path.display(), error = %e, "audit log write failed");
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// LogEntry is strings and options of strings; serialization cannot fail.
fn render_json(entry: &LogEntry<'_>) -> String {
    serde_json::to_string(entry).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::event::EventKind;
    use crate::rules::{Category, RuleAction, Severity};

    fn sample_finding() -> Finding {
        Finding {
            rule: "dangerous_rm".to_string(),
            category: Category::Security,
            severity: Severity::High,
            action: RuleAction::Block,
            description: None,
            suggestion: None,
            instance: Some("alpha".to_string()),
            kind: EventKind::Tool,
            location: None,
            evidence: "rm -rf /var".to_string(),
        }
    }

    fn logger_in(dir: &tempfile::TempDir, format: LogFormat, include_clean: bool) -> AuditLogger {
        let config = AuditLogConfig {
            enabled: true,
            file: dir.path().join("audit.log").display().to_string(),
            format,
            include_clean,
        };
        AuditLogger::from_config(&config).unwrap()
    }

    fn read_log(logger: &AuditLogger) -> String {
        fs::read_to_string(logger.path()).unwrap()
    }

    #[test]
    fn disabled_config_builds_no_logger() {
        let config = AuditLogConfig::default();
        assert!(AuditLogger::from_config(&config).is_none());
    }

    #[test]
    fn text_format_writes_one_line_per_finding() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger_in(&dir, LogFormat::Text, false);
        logger.log_finding(&sample_finding());
        let content = read_log(&logger);
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("finding rule=dangerous_rm"));
        assert!(content.contains("severity=high"));
        assert!(content.contains("instance=alpha"));
    }

    #[test]
    fn json_format_writes_parseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger_in(&dir, LogFormat::Json, false);
        logger.log_finding(&sample_finding());
        let content = read_log(&logger);
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["entry"], "finding");
        assert_eq!(parsed["rule"], "dangerous_rm");
        assert_eq!(parsed["action"], "block");
        assert!(parsed["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn clean_events_logged_only_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let event = AuditEvent::from_value(json!({"type": "status", "instance": "beta"}));

        let silent = logger_in(&dir, LogFormat::Text, false);
        silent.log_clean(&event);
        assert_eq!(read_log(&silent), "");

        let chatty = logger_in(&dir, LogFormat::Text, true);
        chatty.log_clean(&event);
        let content = read_log(&chatty);
        assert!(content.contains("clean kind=status instance=beta"));
        assert!(content.contains("fingerprint="));
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig {
            enabled: true,
            file: dir
                .path()
                .join("nested/deep/audit.log")
                .display()
                .to_string(),
            format: LogFormat::Text,
            include_clean: false,
        };
        let logger = AuditLogger::from_config(&config).unwrap();
        logger.log_finding(&sample_finding());
        assert!(logger.path().exists());
    }
}
