//! Notice composition.
//!
//! Findings turn into feed messages here; delivery is the transport's
//! job. Mode dampening happens at composition time: readonly composes
//! nothing, warn downgrades block-action findings to warnings, block
//! passes them through. Block notices are still advisory on the feed,
//! the receiving instance decides what to do with them.

use crate::config::Mode;
use crate::engine::Finding;
use crate::rules::RuleAction;

/// Notice flavor, in ascending loudness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Suggestion,
    Warning,
    Block,
}

impl NoticeKind {
    /// Message prefix as it appears on the feed.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Suggestion => "💡 AUDIT SUGGESTION:",
            Self::Warning => "⚠️ AUDIT WARNING:",
            Self::Block => "🚫 AUDIT BLOCK:",
        }
    }

    /// Intent tag passed to the feed CLI.
    #[must_use]
    pub const fn intent(&self) -> &'static str {
        match self {
            Self::Suggestion => "suggestion",
            Self::Warning => "warning",
            Self::Block => "block",
        }
    }
}

/// A composed notice, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    /// Instance to mention; `None` addresses the whole feed.
    pub target: Option<String>,
    pub body: String,
}

impl Notice {
    /// Full message text, with the target mention prepended.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.target {
            Some(target) => format!("@{target} {}", self.body),
            None => self.body.clone(),
        }
    }
}

/// Compose the notice for a finding under the given mode, or `None`
/// when the mode suppresses it.
#[must_use]
pub fn notice_for(finding: &Finding, mode: Mode) -> Option<Notice> {
    if mode.is_readonly() {
        return None;
    }
    let (kind, downgraded) = match finding.action {
        RuleAction::Suggest => (NoticeKind::Suggestion, false),
        RuleAction::Warn => (NoticeKind::Warning, false),
        RuleAction::Block => match mode {
            Mode::Block => (NoticeKind::Block, false),
            _ => (NoticeKind::Warning, true),
        },
    };

    let mut body = format!(
        "{} {}/{}",
        kind.prefix(),
        finding.category.label(),
        finding.rule
    );
    if downgraded {
        body.push_str(" (downgraded from block)");
    }
    if let Some(description) = &finding.description {
        body.push_str(": ");
        body.push_str(description);
    }
    body.push_str(" | evidence: ");
    body.push_str(&finding.evidence);
    if let Some(suggestion) = &finding.suggestion {
        body.push_str(" | suggestion: ");
        body.push_str(suggestion);
    }

    Some(Notice {
        kind,
        target: finding.instance.clone(),
        body,
    })
}

/// One-time session announcement, posted when polling starts. Readonly
/// sessions stay silent.
#[must_use]
pub fn announcement(agent: &str, mode: Mode) -> Option<String> {
    if mode.is_readonly() {
        return None;
    }
    Some(format!(
        "🔍 Audit agent {agent} online (mode: {}). Findings will be posted here.",
        mode.label()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::EventKind;
    use crate::rules::{Category, Severity};

    fn finding(action: RuleAction) -> Finding {
        Finding {
            rule: "dangerous_rm".to_string(),
            category: Category::Security,
            severity: Severity::High,
            action,
            description: Some("Recursive force delete aimed at a critical path".to_string()),
            suggestion: Some("Target a specific subdirectory instead".to_string()),
            instance: Some("alpha".to_string()),
            kind: EventKind::Tool,
            location: None,
            evidence: "rm -rf /var".to_string(),
        }
    }

    mod mode_dispatch {
        use super::*;

        #[test]
        fn readonly_composes_nothing() {
            for action in [RuleAction::Warn, RuleAction::Block, RuleAction::Suggest] {
                assert_eq!(notice_for(&finding(action), Mode::Readonly), None);
            }
        }

        #[test]
        fn warn_mode_downgrades_blocks() {
            let notice = notice_for(&finding(RuleAction::Block), Mode::Warn).unwrap();
            assert_eq!(notice.kind, NoticeKind::Warning);
            assert!(notice.body.contains("(downgraded from block)"));
            assert!(notice.body.starts_with("⚠️ AUDIT WARNING:"));
        }

        #[test]
        fn block_mode_passes_blocks_through() {
            let notice = notice_for(&finding(RuleAction::Block), Mode::Block).unwrap();
            assert_eq!(notice.kind, NoticeKind::Block);
            assert!(!notice.body.contains("downgraded"));
            assert!(notice.body.starts_with("🚫 AUDIT BLOCK:"));
        }

        #[test]
        fn suggestions_survive_every_posting_mode() {
            for mode in [Mode::Warn, Mode::Block] {
                let notice = notice_for(&finding(RuleAction::Suggest), mode).unwrap();
                assert_eq!(notice.kind, NoticeKind::Suggestion);
                assert!(notice.body.starts_with("💡 AUDIT SUGGESTION:"));
            }
        }
    }

    mod composition {
        use super::*;

        #[test]
        fn body_names_rule_evidence_and_suggestion() {
            let notice = notice_for(&finding(RuleAction::Warn), Mode::Warn).unwrap();
            assert!(notice.body.contains("security/dangerous_rm"));
            assert!(notice.body.contains("Recursive force delete"));
            assert!(notice.body.contains("| evidence: rm -rf /var"));
            assert!(notice.body.contains("| suggestion: Target a specific"));
        }

        #[test]
        fn bare_finding_still_reads_cleanly() {
            let mut bare = finding(RuleAction::Warn);
            bare.description = None;
            bare.suggestion = None;
            let notice = notice_for(&bare, Mode::Warn).unwrap();
            assert_eq!(
                notice.body,
                "⚠️ AUDIT WARNING: security/dangerous_rm | evidence: rm -rf /var"
            );
        }

        #[test]
        fn render_mentions_the_target() {
            let notice = notice_for(&finding(RuleAction::Warn), Mode::Warn).unwrap();
            assert!(notice.render().starts_with("@alpha ⚠️"));

            let mut untargeted = finding(RuleAction::Warn);
            untargeted.instance = None;
            let notice = notice_for(&untargeted, Mode::Warn).unwrap();
            assert!(notice.render().starts_with("⚠️"));
        }
    }

    mod announcements {
        use super::*;

        #[test]
        fn posting_modes_announce_readonly_does_not() {
            assert!(announcement("auditor", Mode::Readonly).is_none());
            let text = announcement("auditor", Mode::Warn).unwrap();
            assert!(text.contains("auditor"));
            assert!(text.contains("mode: warn"));
            assert!(announcement("auditor", Mode::Block)
                .unwrap()
                .contains("mode: block"));
        }
    }
}
