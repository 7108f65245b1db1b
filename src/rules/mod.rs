//! Rule model and compiled rule sets.
//!
//! A rule is a named check in one of three categories (`security`,
//! `quality`, `compliance`). Pattern rules carry a regex; threshold rules
//! carry a `max_lines` bound; a rule may carry both, in which case the
//! pattern is consulted first and at most one finding is produced per
//! event. Every rule has a severity, an action, and a scope that selects
//! which part of an event it inspects.
//!
//! Rule sets come from two places:
//! - [`builtin::builtin_rules`]: the compiled-in defaults, used when no
//!   rules file is configured.
//! - [`loader::load_rules_file`]: a YAML document, validated fail-fast at
//!   startup. A broken rules file is never partially applied.

pub mod builtin;
pub mod loader;
pub mod regex_engine;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use self::regex_engine::CompiledRegex;

/// Severity of a finding.
///
/// Ordering is semantic: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; worth a look when convenient.
    Low,
    /// Should be addressed; not immediately dangerous.
    Medium,
    /// Dangerous or policy-breaking; surfaced prominently.
    High,
}

impl Severity {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// What a matched rule asks the auditor to do.
///
/// `Block` is a soft block: it escalates the emitted notice but does not
/// prevent the underlying operation. The upstream feed offers no
/// enforcement hook, so a "blocked" action has already happened by the
/// time the notice lands. The one surface where `Block` maps to a hard
/// result is the git gate, where the exit code is honored by git itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Send a warning notice.
    Warn,
    /// Send a blocking-style notice (soft; see the enum docs).
    Block,
    /// Send a low-key suggestion.
    Suggest,
}

impl RuleAction {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Block => "block",
            Self::Suggest => "suggest",
        }
    }

    /// True for the soft-block action.
    #[must_use]
    pub const fn is_block(&self) -> bool {
        matches!(self, Self::Block)
    }
}

/// Which part of an event a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleScope {
    /// Shell command text from tool events.
    Commands,
    /// File content being written or edited.
    FileEdits,
    /// Status details and chat messages.
    Messages,
    /// The full event JSON (always available).
    Any,
}

impl RuleScope {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::FileEdits => "file-edits",
            Self::Messages => "messages",
            Self::Any => "any",
        }
    }
}

/// Rule category. Also the top-level key of the rules YAML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Quality,
    Compliance,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Self; 3] = [Self::Security, Self::Quality, Self::Compliance];

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Quality => "quality",
            Self::Compliance => "compliance",
        }
    }

    /// Parse a category from a YAML top-level key.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "security" => Some(Self::Security),
            "quality" => Some(Self::Quality),
            "compliance" => Some(Self::Compliance),
            _ => None,
        }
    }
}

/// One rule as written in the rules file, before compilation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default = "RuleSpec::default_severity")]
    pub severity: Severity,
    #[serde(default = "RuleSpec::default_action")]
    pub action: RuleAction,
    #[serde(default = "RuleSpec::default_scope")]
    pub scope: RuleScope,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub max_lines: Option<u32>,
}

impl RuleSpec {
    const fn default_severity() -> Severity {
        Severity::Medium
    }

    const fn default_action() -> RuleAction {
        RuleAction::Warn
    }

    const fn default_scope() -> RuleScope {
        RuleScope::Any
    }
}

/// How a rule matched a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    /// The pattern matched at these byte offsets.
    Pattern { start: usize, end: usize },
    /// The payload's line count exceeded the threshold.
    Threshold { lines: u32, max: u32 },
}

/// A rule with its pattern compiled, ready for evaluation.
#[derive(Debug)]
pub struct CompiledRule {
    pub name: String,
    pub category: Category,
    pub pattern: Option<CompiledRegex>,
    pub severity: Severity,
    pub action: RuleAction,
    pub scope: RuleScope,
    pub description: Option<String>,
    pub suggestion: Option<String>,
    pub max_lines: Option<u32>,
}

impl CompiledRule {
    /// Evaluate this rule against one payload.
    ///
    /// The pattern is consulted first; the line-count threshold second.
    /// At most one match is reported per payload.
    #[must_use]
    pub fn evaluate(&self, payload: &str) -> Option<RuleMatch> {
        if let Some(re) = &self.pattern {
            if let Some((start, end)) = re.find(payload) {
                return Some(RuleMatch::Pattern { start, end });
            }
        }
        if let Some(max) = self.max_lines {
            let lines = count_lines(payload);
            if lines > max {
                return Some(RuleMatch::Threshold { lines, max });
            }
        }
        None
    }
}

/// Where a rule set came from, for status lines and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// Compiled-in defaults.
    Builtin,
    /// A rules file on disk.
    File(PathBuf),
}

impl RuleSource {
    /// Human-readable description for status lines.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Builtin => "built-in defaults".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// An ordered collection of compiled rules plus their provenance.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    source: RuleSource,
}

impl RuleSet {
    /// Build a rule set from already-compiled rules.
    #[must_use]
    pub fn new(rules: Vec<CompiledRule>, source: RuleSource) -> Self {
        Self { rules, source }
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when the set holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate the rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Provenance of this set.
    #[must_use]
    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

fn count_lines(payload: &str) -> u32 {
    u32::try_from(payload.lines().count()).unwrap_or(u32::MAX)
}
