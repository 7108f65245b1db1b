//! Compiled-in default rules.
//!
//! Used when no rules file is configured. These carry the same data model
//! as file-loaded rules, so a rules file can replace them wholesale without
//! changing engine behavior. Patterns are deliberately blunt: they flag
//! things a reviewer would want to glance at, they do not try to prove
//! intent.

use tracing::error;

use super::regex_engine::CompiledRegex;
use super::{Category, CompiledRule, RuleAction, RuleScope, RuleSet, RuleSource, Severity};

struct BuiltinSpec {
    name: &'static str,
    category: Category,
    pattern: Option<&'static str>,
    severity: Severity,
    action: RuleAction,
    scope: RuleScope,
    description: &'static str,
    suggestion: &'static str,
    max_lines: Option<u32>,
}

const BUILTIN: &[BuiltinSpec] = &[
    // Recursive delete aimed at root, home, or $HOME.
    BuiltinSpec {
        name: "dangerous_rm",
        category: Category::Security,
        pattern: Some(r"rm\s+-rf\s+(/|~|\$HOME)"),
        severity: Severity::High,
        action: RuleAction::Block,
        scope: RuleScope::Commands,
        description: "recursive delete aimed at an absolute or home path",
        suggestion: "Double-check the target path; prefer a scoped relative path.",
        max_lines: None,
    },
    // Remote script piped straight into a shell.
    BuiltinSpec {
        name: "pipe_to_shell",
        category: Category::Security,
        pattern: Some(r"(curl|wget)[^|\n]*\|\s*(ba|z)?sh\b"),
        severity: Severity::High,
        action: RuleAction::Block,
        scope: RuleScope::Commands,
        description: "remote script piped straight into a shell",
        suggestion: "Download to a file, inspect it, then run it.",
        max_lines: None,
    },
    // World-writable permission grant.
    BuiltinSpec {
        name: "excessive_permissions",
        category: Category::Security,
        pattern: Some(r"chmod\s+(-[a-zA-Z]+\s+)?777"),
        severity: Severity::Medium,
        action: RuleAction::Warn,
        scope: RuleScope::Commands,
        description: "world-writable permission grant",
        suggestion: "Prefer 755 for directories and 644 for files.",
        max_lines: None,
    },
    // Errors thrown away instead of surfaced.
    BuiltinSpec {
        name: "redirect_dev_null",
        category: Category::Quality,
        pattern: Some(r"(>\s*/dev/null\s*2>&1|2>\s*/dev/null)"),
        severity: Severity::Medium,
        action: RuleAction::Warn,
        scope: RuleScope::Commands,
        description: "errors discarded instead of surfaced",
        suggestion: "Keep stderr visible or log it to a file.",
        max_lines: None,
    },
    // Credential-looking assignment with a quoted literal value.
    BuiltinSpec {
        name: "hardcoded_secrets",
        category: Category::Security,
        pattern: Some(r#"(?i)(password|secret|key|token).*?["'][^"']{10,}["']"#),
        severity: Severity::High,
        action: RuleAction::Block,
        scope: RuleScope::FileEdits,
        description: "possible credential committed to code",
        suggestion: "Move the value to an environment variable or a secret store.",
        max_lines: None,
    },
    // Query assembled by string building.
    BuiltinSpec {
        name: "sql_injection_risk",
        category: Category::Security,
        pattern: Some(r"execute\(.*(\+|%).*\)"),
        severity: Severity::High,
        action: RuleAction::Warn,
        scope: RuleScope::FileEdits,
        description: "query assembled by string building",
        suggestion: "Use parameterized queries instead of string concatenation.",
        max_lines: None,
    },
    // Publishing commands that deserve explicit confirmation.
    BuiltinSpec {
        name: "critical_command",
        category: Category::Compliance,
        pattern: Some(r"\b(git\s+push|docker\s+push|npm\s+publish|twine\s+upload)\b"),
        severity: Severity::High,
        action: RuleAction::Warn,
        scope: RuleScope::Commands,
        description: "publishing command that deserves explicit confirmation",
        suggestion: "Confirm the destination with the team before pushing or publishing.",
        max_lines: None,
    },
    // Commit chatter with no mention of tests. Needs lookahead.
    BuiltinSpec {
        name: "commit_without_tests",
        category: Category::Compliance,
        pattern: Some(r"(?is)\A(?!.*test).*\bcommit"),
        severity: Severity::Low,
        action: RuleAction::Suggest,
        scope: RuleScope::Messages,
        description: "commit activity with no mention of tests",
        suggestion: "Run the test suite before committing.",
        max_lines: None,
    },
    // Oversized block landing in a single edit.
    BuiltinSpec {
        name: "large_function",
        category: Category::Quality,
        pattern: None,
        severity: Severity::Medium,
        action: RuleAction::Warn,
        scope: RuleScope::FileEdits,
        description: "edit introduces an oversized block",
        suggestion: "Split the change into smaller functions or edits.",
        max_lines: Some(50),
    },
];

/// Build the default rule set.
///
/// Built-in patterns are fixed and covered by tests; a compile failure here
/// is a programming error, so the offending rule is skipped with an error
/// log rather than taking the process down.
#[must_use]
pub fn builtin_rules() -> RuleSet {
    let mut rules = Vec::with_capacity(BUILTIN.len());
    for spec in BUILTIN {
        let pattern = match spec.pattern {
            Some(p) => match CompiledRegex::new(p) {
                Ok(re) => Some(re),
                Err(message) => {
                    error!(rule = spec.name, %message, "built-in pattern failed to compile; rule skipped");
                    debug_assert!(false, "built-in pattern failed to compile: {message}");
                    continue;
                }
            },
            None => None,
        };
        rules.push(CompiledRule {
            name: spec.name.to_string(),
            category: spec.category,
            pattern,
            severity: spec.severity,
            action: spec.action,
            scope: spec.scope,
            description: Some(spec.description.to_string()),
            suggestion: Some(spec.suggestion.to_string()),
            max_lines: spec.max_lines,
        });
    }
    RuleSet::new(rules, RuleSource::Builtin)
}
