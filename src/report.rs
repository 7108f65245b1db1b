//! Session totals and human-readable reporting.
//!
//! [`SessionStats`] is the one structure shared between the polling side
//! (sole writer) and the dashboard (sole reader). It sits behind a single
//! mutex; writes are plain field stores done while holding the lock
//! briefly, and the dashboard takes whole-value snapshots. Nothing here
//! needs finer-grained coordination than that.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::engine::{AuditReport, CategoryCounts, Finding, SeverityCounts};
use crate::feed::InstanceInfo;
use crate::rules::Severity;

/// Counters for notices actually sent to the feed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoticeCounts {
    pub warnings: u64,
    pub blocks: u64,
    pub suggestions: u64,
}

impl NoticeCounts {
    /// Sum across notice kinds.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.warnings + self.blocks + self.suggestions
    }
}

/// Session-lifetime totals, shared between poller and dashboard.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    /// Valid events parsed from the feed, duplicates included.
    pub events_seen: u64,
    /// Events that went through rule evaluation.
    pub events_audited: u64,
    /// Events suppressed by the fingerprint set.
    pub duplicates: u64,
    /// Feed lines that were not valid JSON objects.
    pub malformed_lines: u64,
    /// Events dropped by the target-instance filter or self-filter.
    pub filtered_out: u64,
    pub findings: SeverityCounts,
    pub categories: CategoryCounts,
    pub notices: NoticeCounts,
    pub feed_failures: u64,
    pub consecutive_feed_failures: u32,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Roster snapshot for the dashboard, refreshed at a slow cadence.
    pub instances: Vec<InstanceInfo>,
}

impl SessionStats {
    /// Fresh stats, clock started now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            events_seen: 0,
            events_audited: 0,
            duplicates: 0,
            malformed_lines: 0,
            filtered_out: 0,
            findings: SeverityCounts::default(),
            categories: CategoryCounts::default(),
            notices: NoticeCounts::default(),
            feed_failures: 0,
            consecutive_feed_failures: 0,
            last_event_at: None,
            last_error: None,
            instances: Vec::new(),
        }
    }

    /// Fold one pass's report into the session totals.
    pub fn absorb_report(&mut self, report: &AuditReport) {
        self.events_audited += report.events_audited;
        self.findings.absorb(&report.severities);
        self.categories.absorb(&report.categories);
    }

    /// Total findings this session.
    #[must_use]
    pub const fn total_findings(&self) -> u64 {
        self.findings.total()
    }

    /// Seconds since the session started.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_seconds()).unwrap_or(0)
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared stats handle: one writer (poller), one reader (dashboard).
pub type SharedStats = Arc<Mutex<SessionStats>>;

/// A fresh shared stats handle.
#[must_use]
pub fn shared_stats() -> SharedStats {
    Arc::new(Mutex::new(SessionStats::new()))
}

/// Lock the shared stats, recovering from a poisoned mutex.
///
/// A panic on either side must not take the other side's view down with
/// it; the stats are plain counters and always readable.
pub fn lock_stats(stats: &SharedStats) -> MutexGuard<'_, SessionStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Severity badge for console output.
#[must_use]
pub fn severity_badge(severity: Severity) -> String {
    match severity {
        Severity::High => format!("[{}]", "high".red().bold()),
        Severity::Medium => format!("[{}]", "medium".yellow()),
        Severity::Low => format!("[{}]", "low".bright_black()),
    }
}

/// Print one finding to stderr, colored when the terminal supports it.
pub fn print_finding(finding: &Finding) {
    let origin = finding
        .instance
        .as_deref()
        .map(|i| format!(" @{i}"))
        .unwrap_or_default();
    let location = finding
        .location
        .as_deref()
        .map(|l| format!(" ({l})"))
        .unwrap_or_default();
    eprintln!(
        "{} {}/{}{}{}: {}",
        severity_badge(finding.severity),
        finding.category.label(),
        finding.rule.bold(),
        origin.cyan(),
        location.bright_black(),
        finding.evidence
    );
    if let Some(suggestion) = &finding.suggestion {
        eprintln!("        {}", suggestion.bright_black());
    }
}

/// One-line pass summary for verbose watch output.
pub fn print_pass_summary(report: &AuditReport) {
    if report.is_clean() {
        return;
    }
    eprintln!(
        "{} {} event(s), {} finding(s) [{} high, {} medium, {} low]",
        "audit:".bold(),
        report.events_audited,
        report.total_findings(),
        report.severities.high,
        report.severities.medium,
        report.severities.low
    );
}

/// Final summary printed when the watch loop shuts down.
pub fn print_session_summary(stats: &SessionStats) {
    eprintln!();
    eprintln!("{}", "session summary".bold());
    eprintln!("  uptime:          {}", format_duration(stats.uptime_secs()));
    eprintln!(
        "  events:          {} seen, {} audited, {} duplicate(s), {} filtered",
        stats.events_seen, stats.events_audited, stats.duplicates, stats.filtered_out
    );
    eprintln!(
        "  findings:        {} [{} high, {} medium, {} low]",
        stats.total_findings(),
        stats.findings.high,
        stats.findings.medium,
        stats.findings.low
    );
    eprintln!(
        "  notices sent:    {} [{} warning(s), {} block(s), {} suggestion(s)]",
        stats.notices.total(),
        stats.notices.warnings,
        stats.notices.blocks,
        stats.notices.suggestions
    );
    if stats.malformed_lines > 0 {
        eprintln!("  malformed lines: {}", stats.malformed_lines);
    }
    if stats.feed_failures > 0 {
        eprintln!("  feed failures:   {}", stats.feed_failures);
    }
}

/// Plain-text report rendering, used by the gate and by `audit --format
/// pretty` when piped. No color codes.
#[must_use]
pub fn render_report_text(report: &AuditReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} event(s) audited, {} finding(s)\n",
        report.events_audited,
        report.total_findings()
    ));
    for finding in &report.findings {
        let location = finding
            .location
            .as_deref()
            .map(|l| format!(" ({l})"))
            .unwrap_or_default();
        out.push_str(&format!(
            "- [{}] {}/{}{} action={}: {}\n",
            finding.severity.label(),
            finding.category.label(),
            finding.rule,
            location,
            finding.action.label(),
            finding.evidence
        ));
        if let Some(suggestion) = &finding.suggestion {
            out.push_str(&format!("  suggestion: {suggestion}\n"));
        }
    }
    out
}

/// JSON report rendering. Serialization of plain counters and strings
/// cannot fail; the fallback object is unreachable in practice.
#[must_use]
pub fn render_report_json(report: &AuditReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// `1h 2m 3s` style duration, dropping leading zero units.
#[must_use]
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `12s ago` style age for the dashboard.
#[must_use]
pub fn format_age(then: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(then) = then else {
        return "never".to_string();
    };
    let secs = u64::try_from((now - then).num_seconds()).unwrap_or(0);
    format!("{} ago", format_duration(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::event::EventKind;
    use crate::rules::{Category, RuleAction};

    fn finding(severity: Severity) -> Finding {
        Finding {
            rule: "r".to_string(),
            category: Category::Security,
            severity,
            action: RuleAction::Warn,
            description: None,
            suggestion: None,
            instance: None,
            kind: EventKind::Tool,
            location: None,
            evidence: "e".to_string(),
        }
    }

    mod formatting {
        use super::*;

        #[test]
        fn duration_drops_leading_units() {
            assert_eq!(format_duration(5), "5s");
            assert_eq!(format_duration(65), "1m 5s");
            assert_eq!(format_duration(3723), "1h 2m 3s");
        }

        #[test]
        fn age_handles_never() {
            assert_eq!(format_age(None, Utc::now()), "never");
        }

        #[test]
        fn age_formats_elapsed_time() {
            let now = Utc::now();
            let then = now - Duration::seconds(12);
            assert_eq!(format_age(Some(then), now), "12s ago");
        }
    }

    mod totals {
        use super::*;

        #[test]
        fn session_absorbs_pass_reports() {
            let mut stats = SessionStats::new();
            let mut report = AuditReport::new();
            report.record(finding(Severity::High));
            report.record(finding(Severity::Low));
            report.events_audited = 2;
            stats.absorb_report(&report);

            let mut second = AuditReport::new();
            second.record(finding(Severity::High));
            second.events_audited = 1;
            stats.absorb_report(&second);

            assert_eq!(stats.events_audited, 3);
            assert_eq!(stats.total_findings(), 3);
            assert_eq!(stats.findings.high, 2);
            assert_eq!(stats.findings.low, 1);
            assert_eq!(stats.categories.security, 3);
        }

        #[test]
        fn shared_stats_survive_a_poisoned_lock() {
            let stats = shared_stats();
            let clone = Arc::clone(&stats);
            let _ = std::thread::spawn(move || {
                let _guard = clone.lock().unwrap();
                panic!("poison the mutex");
            })
            .join();
            lock_stats(&stats).events_seen += 1;
            assert_eq!(lock_stats(&stats).events_seen, 1);
        }
    }

    mod rendering {
        use super::*;

        #[test]
        fn text_report_lists_findings_with_actions() {
            let mut report = AuditReport::new();
            let mut f = finding(Severity::High);
            f.rule = "dangerous_rm".to_string();
            f.suggestion = Some("double-check the path".to_string());
            report.record(f);
            report.events_audited = 1;

            let text = render_report_text(&report);
            assert!(text.contains("1 event(s) audited, 1 finding(s)"));
            assert!(text.contains("[high] security/dangerous_rm action=warn"));
            assert!(text.contains("suggestion: double-check the path"));
        }

        #[test]
        fn json_report_round_trips() {
            let mut report = AuditReport::new();
            report.record(finding(Severity::Medium));
            let parsed: serde_json::Value =
                serde_json::from_str(&render_report_json(&report)).unwrap();
            assert_eq!(parsed["severities"]["medium"], 1);
            assert_eq!(parsed["findings"][0]["severity"], "medium");
        }
    }
}
