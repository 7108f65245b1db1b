//! Rule evaluation over events.
//!
//! The engine owns the compiled rule set and turns one event at a time
//! into findings:
//!
//! ```text
//! event ──► extract scope payloads (command / file text / message / full JSON)
//!       ──► evaluate EVERY rule whose scope has a payload
//!       ──► record findings into the pass's AuditReport
//! ```
//!
//! Every rule is evaluated independently; there is no short-circuiting and
//! no ordering dependency between rules. A rule produces at most one
//! finding per event. The report is an owned accumulator passed in by the
//! caller, not process-wide state.

use serde::Serialize;
use tracing::trace;

use crate::event::{truncate_display, AuditEvent, EventKind};
use crate::rules::{Category, RuleAction, RuleMatch, RuleScope, RuleSet, Severity};

/// Evidence excerpt cap, in characters.
const EVIDENCE_MAX_CHARS: usize = 120;

/// One rule match against one event.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub rule: String,
    pub category: Category,
    pub severity: Severity,
    pub action: RuleAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub evidence: String,
}

/// Finding counters keyed by severity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl SeverityCounts {
    /// Increment the counter for one severity.
    pub fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
        }
    }

    /// Read one severity's counter.
    #[must_use]
    pub const fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
        }
    }

    /// Sum across severities.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.low + self.medium + self.high
    }

    /// Add another counter set into this one.
    pub fn absorb(&mut self, other: &Self) {
        self.low += other.low;
        self.medium += other.medium;
        self.high += other.high;
    }
}

/// Finding counters keyed by category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub security: u64,
    pub quality: u64,
    pub compliance: u64,
}

impl CategoryCounts {
    /// Increment the counter for one category.
    pub fn bump(&mut self, category: Category) {
        match category {
            Category::Security => self.security += 1,
            Category::Quality => self.quality += 1,
            Category::Compliance => self.compliance += 1,
        }
    }

    /// Read one category's counter.
    #[must_use]
    pub const fn get(&self, category: Category) -> u64 {
        match category {
            Category::Security => self.security,
            Category::Quality => self.quality,
            Category::Compliance => self.compliance,
        }
    }

    /// Add another counter set into this one.
    pub fn absorb(&mut self, other: &Self) {
        self.security += other.security;
        self.quality += other.quality;
        self.compliance += other.compliance;
    }
}

/// Accumulator for one audit pass.
///
/// Mutated in place as rules are evaluated; read once per pass by the
/// reporting side, then folded into the session totals.
#[derive(Debug, Default, Serialize)]
pub struct AuditReport {
    pub findings: Vec<Finding>,
    pub severities: SeverityCounts,
    pub categories: CategoryCounts,
    pub events_audited: u64,
}

impl AuditReport {
    /// An empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finding, keeping the counters in step.
    pub fn record(&mut self, finding: Finding) {
        self.severities.bump(finding.severity);
        self.categories.bump(finding.category);
        self.findings.push(finding);
    }

    /// Total findings in this pass.
    #[must_use]
    pub const fn total_findings(&self) -> u64 {
        self.severities.total()
    }

    /// True when the pass produced no findings.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// True when any finding carries the block action.
    #[must_use]
    pub fn has_block_finding(&self) -> bool {
        self.findings.iter().any(|f| f.action.is_block())
    }
}

/// The rule evaluation engine.
#[derive(Debug)]
pub struct AuditEngine {
    rules: RuleSet,
}

impl AuditEngine {
    /// Build an engine over a compiled rule set.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// The rule set this engine evaluates.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate every rule against one event, recording findings into the
    /// report. Returns the number of findings added.
    pub fn audit_event(&self, event: &AuditEvent, report: &mut AuditReport) -> usize {
        let instance = event.instance().map(str::to_string);
        let kind = event.kind();
        let command = event.command();
        let file_text = event.file_text();
        let message = event.message_text();
        let location = event.file_path();
        let full_json = event.to_compact_json();

        let before = report.findings.len();
        for rule in self.rules.iter() {
            let payload = match rule.scope {
                RuleScope::Commands => command,
                RuleScope::FileEdits => file_text,
                RuleScope::Messages => message,
                RuleScope::Any => Some(full_json.as_str()),
            };
            let Some(payload) = payload else { continue };
            let Some(matched) = rule.evaluate(payload) else {
                continue;
            };

            let evidence = match matched {
                RuleMatch::Pattern { start, end } => excerpt(payload, start, end),
                RuleMatch::Threshold { lines, max } => {
                    format!("{lines} lines (threshold {max})")
                }
            };
            trace!(rule = %rule.name, kind = kind.label(), "rule matched");
            report.record(Finding {
                rule: rule.name.clone(),
                category: rule.category,
                severity: rule.severity,
                action: rule.action,
                description: rule.description.clone(),
                suggestion: rule.suggestion.clone(),
                instance: instance.clone(),
                kind,
                location: (rule.scope == RuleScope::FileEdits)
                    .then(|| location.map(str::to_string))
                    .flatten(),
                evidence,
            });
        }
        report.events_audited += 1;
        report.findings.len() - before
    }
}

/// Matched slice, whitespace-collapsed and capped for display.
fn excerpt(payload: &str, start: usize, end: usize) -> String {
    let matched = payload.get(start..end).unwrap_or("");
    let cleaned = matched.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        // Zero-width match (pure lookaround pattern): show the payload head.
        return truncate_display(payload.trim(), EVIDENCE_MAX_CHARS);
    }
    truncate_display(&cleaned, EVIDENCE_MAX_CHARS)
}
