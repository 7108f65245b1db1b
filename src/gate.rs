//! Git and CI gate.
//!
//! The one place a block-action rule actually stops anything. Hook
//! collectors turn pending changes into synthetic events, the regular
//! engine audits them, and the exit code carries the verdict. No feed,
//! no dedup: every invocation is a fresh pass over exactly what is
//! about to land.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::Command;

use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::engine::{AuditEngine, AuditReport};
use crate::event::AuditEvent;
use crate::report::render_report_text;

/// Default character budget for hook output; hooks echo into terminals
/// and CI logs, so the report stays short.
pub const DEFAULT_MAX_CHARS: usize = 4000;

const TRUNCATION_MARKER: &str = "… [truncated]";

/// Which hook invoked the gate, with its hook-specific input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateHook {
    /// Audit the staged index.
    PreCommit,
    /// Audit the commit message being edited.
    CommitMsg { message_file: PathBuf },
    /// Audit the commits about to be pushed (ranges on stdin).
    PrePush,
    /// Audit an explicit revision range, for CI.
    Ci { range: String },
}

impl GateHook {
    /// Hook name as spelled on the command line.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::CommitMsg { .. } => "commit-msg",
            Self::PrePush => "pre-push",
            Self::Ci { .. } => "ci",
        }
    }
}

/// Gate failures: the gate could not see the change. Rule problems are
/// caught before the gate runs.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("git command failed: {0}")]
    Git(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The audit pass plus the verdict derived from it.
#[derive(Debug)]
pub struct GateOutcome {
    pub report: AuditReport,
    /// True when any finding carries the block action.
    pub denied: bool,
}

/// Collect the hook's events and audit them.
///
/// # Errors
/// When git cannot be run or hook input cannot be read.
pub fn run_gate(engine: &AuditEngine, hook: &GateHook) -> Result<GateOutcome, GateError> {
    let events = collect_events(hook)?;
    debug!(hook = hook.label(), events = events.len(), "gate pass");
    Ok(audit_events(engine, &events))
}

/// Audit a batch of synthetic events and decide the verdict.
#[must_use]
pub fn audit_events(engine: &AuditEngine, events: &[AuditEvent]) -> GateOutcome {
    let mut report = AuditReport::new();
    for event in events {
        engine.audit_event(event, &mut report);
    }
    let denied = report.has_block_finding();
    GateOutcome { report, denied }
}

fn collect_events(hook: &GateHook) -> Result<Vec<AuditEvent>, GateError> {
    match hook {
        GateHook::PreCommit => staged_events(),
        GateHook::CommitMsg { message_file } => {
            let text = std::fs::read_to_string(message_file)?;
            Ok(vec![message_event(&text)])
        }
        GateHook::PrePush => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            push_events(&input)
        }
        GateHook::Ci { range } => range_events(std::slice::from_ref(range)),
    }
}

// Staged content comes from the index, not the worktree, so what gets
// audited is exactly what would be committed.
fn staged_events() -> Result<Vec<AuditEvent>, GateError> {
    let listing = git(&["diff", "--cached", "--name-only", "--diff-filter=ACM"])?;
    let mut events = Vec::new();
    for path in listing.lines().filter(|line| !line.is_empty()) {
        let staged = format!(":{path}");
        let content = git(&["show", &staged])?;
        events.push(file_event(path, &content));
    }
    Ok(events)
}

fn push_events(input: &str) -> Result<Vec<AuditEvent>, GateError> {
    let mut events = Vec::new();
    for range in parse_push_lines(input) {
        let args = range.rev_list_args();
        events.extend(range_events(&args)?);
    }
    Ok(events)
}

// Each commit contributes two events: its message and its patch.
fn range_events(rev_args: &[String]) -> Result<Vec<AuditEvent>, GateError> {
    let mut args: Vec<&str> = vec!["rev-list"];
    args.extend(rev_args.iter().map(String::as_str));
    let listing = git(&args)?;

    let mut events = Vec::new();
    for sha in listing.lines().filter(|line| !line.is_empty()) {
        let message = git(&["show", "-s", "--format=%B", sha])?;
        events.push(message_event(&message));
        let patch = git(&["show", "--format=", sha])?;
        let short = &sha[..sha.len().min(12)];
        events.push(file_event(&format!("commit {short}"), &patch));
    }
    Ok(events)
}

/// One `<local_ref> <local_sha> <remote_ref> <remote_sha>` line from the
/// pre-push hook, already filtered down to pushes that create commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRange {
    pub local_sha: String,
    /// `None` when the remote ref does not exist yet.
    pub remote_sha: Option<String>,
}

impl PushRange {
    /// Arguments for `git rev-list` covering the pushed commits. A new
    /// ref falls back to everything no remote has yet.
    #[must_use]
    pub fn rev_list_args(&self) -> Vec<String> {
        match &self.remote_sha {
            Some(remote) => vec![format!("{remote}..{}", self.local_sha)],
            None => vec![
                self.local_sha.clone(),
                "--not".to_string(),
                "--remotes".to_string(),
            ],
        }
    }
}

/// Parse pre-push stdin. Ref deletions and malformed lines drop out.
#[must_use]
pub fn parse_push_lines(input: &str) -> Vec<PushRange> {
    input
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return None;
            }
            let (local_sha, remote_sha) = (fields[1], fields[3]);
            if is_zero_sha(local_sha) {
                return None;
            }
            Some(PushRange {
                local_sha: local_sha.to_string(),
                remote_sha: (!is_zero_sha(remote_sha)).then(|| remote_sha.to_string()),
            })
        })
        .collect()
}

fn is_zero_sha(sha: &str) -> bool {
    !sha.is_empty() && sha.bytes().all(|b| b == b'0')
}

fn file_event(path: &str, content: &str) -> AuditEvent {
    AuditEvent::from_value(json!({
        "type": "tool",
        "instance": "git",
        "data": {
            "tool_name": "Edit",
            "tool_input": {"file_path": path, "new_string": content}
        }
    }))
}

fn message_event(text: &str) -> AuditEvent {
    AuditEvent::from_value(json!({
        "type": "message",
        "instance": "git",
        "text": text
    }))
}

fn git(args: &[&str]) -> Result<String, GateError> {
    let output = Command::new("git").args(args).output()?;
    if !output.status.success() {
        return Err(GateError::Git(format!(
            "git {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Render the gate report within a character budget. The verdict line
/// always survives truncation; only the findings body is trimmed.
#[must_use]
pub fn render_gate_report(outcome: &GateOutcome, max_chars: usize) -> String {
    let verdict = if outcome.denied {
        "audit gate: DENY"
    } else {
        "audit gate: ALLOW"
    };
    let body = if outcome.report.is_clean() {
        "no findings\n".to_string()
    } else {
        render_report_text(&outcome.report)
    };

    let budget = max_chars.saturating_sub(verdict.chars().count() + 1);
    let mut text = if body.chars().count() > budget {
        let kept: String = body
            .chars()
            .take(budget.saturating_sub(TRUNCATION_MARKER.chars().count() + 2))
            .collect();
        format!("{kept}\n{TRUNCATION_MARKER}\n")
    } else {
        body
    };
    text.push_str(verdict);
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::rules::builtin::builtin_rules;

    fn engine() -> AuditEngine {
        AuditEngine::new(builtin_rules())
    }

    mod push_parsing {
        use super::*;

        #[test]
        fn update_lines_become_ranges() {
            let input = "refs/heads/main aaa111 refs/heads/main bbb222\n";
            let ranges = parse_push_lines(input);
            assert_eq!(ranges.len(), 1);
            assert_eq!(ranges[0].local_sha, "aaa111");
            assert_eq!(ranges[0].remote_sha.as_deref(), Some("bbb222"));
            assert_eq!(ranges[0].rev_list_args(), vec!["bbb222..aaa111".to_string()]);
        }

        #[test]
        fn new_refs_audit_what_no_remote_has() {
            let zeros = "0".repeat(40);
            let input = format!("refs/heads/feature aaa111 refs/heads/feature {zeros}\n");
            let ranges = parse_push_lines(&input);
            assert_eq!(ranges[0].remote_sha, None);
            assert_eq!(
                ranges[0].rev_list_args(),
                vec!["aaa111".to_string(), "--not".to_string(), "--remotes".to_string()]
            );
        }

        #[test]
        fn deletions_and_garbage_drop_out() {
            let zeros = "0".repeat(40);
            let input = format!(
                "refs/heads/old {zeros} refs/heads/old bbb222\nnot a hook-line\n\n"
            );
            assert!(parse_push_lines(&input).is_empty());
        }
    }

    mod verdicts {
        use super::*;

        #[test]
        fn staged_secret_denies() {
            let events = vec![file_event(
                "config.py",
                "PASSWORD = \"hunter2hunter2\"\n",
            )];
            let outcome = audit_events(&engine(), &events);
            assert!(outcome.denied);
            assert!(outcome
                .report
                .findings
                .iter()
                .any(|f| f.rule == "hardcoded_secrets"));
        }

        #[test]
        fn suggestions_never_deny() {
            let events = vec![message_event("about to commit the parser fix")];
            let outcome = audit_events(&engine(), &events);
            assert!(!outcome.denied);
            assert_eq!(outcome.report.total_findings(), 1);
        }

        #[test]
        fn clean_changes_allow() {
            let events = vec![file_event("lib.py", "def add(a, b):\n    return a + b\n")];
            let outcome = audit_events(&engine(), &events);
            assert!(!outcome.denied);
            assert!(outcome.report.is_clean());
        }
    }

    mod rendering {
        use super::*;

        #[test]
        fn clean_report_reads_allow() {
            let outcome = audit_events(&engine(), &[]);
            let text = render_gate_report(&outcome, DEFAULT_MAX_CHARS);
            assert!(text.contains("no findings"));
            assert!(text.trim_end().ends_with("audit gate: ALLOW"));
        }

        #[test]
        fn denial_reads_deny_with_the_finding() {
            let events = vec![file_event("x.py", "API_KEY = \"abcdefghijkl\"")];
            let outcome = audit_events(&engine(), &events);
            let text = render_gate_report(&outcome, DEFAULT_MAX_CHARS);
            assert!(text.contains("hardcoded_secrets"));
            assert!(text.trim_end().ends_with("audit gate: DENY"));
        }

        #[test]
        fn truncation_respects_the_budget_and_keeps_the_verdict() {
            let events: Vec<AuditEvent> = (0..50)
                .map(|i| file_event(&format!("f{i}.py"), "TOKEN = \"abcdefghijklmnop\""))
                .collect();
            let outcome = audit_events(&engine(), &events);
            let text = render_gate_report(&outcome, 600);
            assert!(text.chars().count() <= 600);
            assert!(text.contains(TRUNCATION_MARKER));
            assert!(text.trim_end().ends_with("audit gate: DENY"));
        }
    }
}
