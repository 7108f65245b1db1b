//! YAML rules loading and fail-fast validation.
//!
//! The rules document is a map of category name to rule list. Any defect
//! (unreadable file, bad YAML, unknown category, bad regex, rule with
//! neither pattern nor threshold, duplicate name) aborts the load: a broken
//! rule set is never partially applied, since a half-applied policy is
//! worse than a loud startup failure.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::builtin;
use super::regex_engine::CompiledRegex;
use super::{Category, CompiledRule, RuleSet, RuleSource, RuleSpec};

/// Errors raised while loading or validating a rules document.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("rule '{rule}': invalid pattern: {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("{0}")]
    Validation(String),
}

/// Result alias for rule loading.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Load and validate a rules file.
///
/// # Errors
/// Any validation defect fails the whole load; see [`RuleError`].
pub fn load_rules_file(path: &Path) -> Result<RuleSet> {
    let text = fs::read_to_string(path).map_err(|source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: BTreeMap<String, Vec<RuleSpec>> =
        serde_yaml::from_str(&text).map_err(|source| RuleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let rules = compile_document(doc)?;
    info!(
        path = %path.display(),
        rules = rules.len(),
        "loaded rules file"
    );
    Ok(RuleSet::new(rules, RuleSource::File(path.to_path_buf())))
}

/// Resolve the effective rule set: a configured file, or the built-ins.
///
/// # Errors
/// Propagates any loading defect from the configured file.
pub fn effective_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(p) => load_rules_file(p),
        None => Ok(builtin::builtin_rules()),
    }
}

/// Compile a parsed rules document into rules, validating as it goes.
///
/// # Errors
/// See [`RuleError`]; the first defect aborts compilation.
pub fn compile_document(doc: BTreeMap<String, Vec<RuleSpec>>) -> Result<Vec<CompiledRule>> {
    let mut rules = Vec::new();
    let mut names: HashSet<String> = HashSet::new();
    for (key, specs) in doc {
        let category = Category::parse(&key).ok_or_else(|| {
            RuleError::Validation(format!(
                "unknown rule category '{key}' (expected security, quality, or compliance)"
            ))
        })?;
        for spec in specs {
            rules.push(compile_spec(category, spec, &mut names)?);
        }
    }
    Ok(rules)
}

fn compile_spec(
    category: Category,
    spec: RuleSpec,
    names: &mut HashSet<String>,
) -> Result<CompiledRule> {
    let name = spec.name.trim().to_string();
    if name.is_empty() {
        return Err(RuleError::Validation(format!(
            "rule with empty name in category '{}'",
            category.label()
        )));
    }
    if !names.insert(name.clone()) {
        return Err(RuleError::Validation(format!(
            "duplicate rule name '{name}'"
        )));
    }
    if spec.pattern.is_none() && spec.max_lines.is_none() {
        return Err(RuleError::Validation(format!(
            "rule '{name}' has neither a pattern nor a max_lines threshold"
        )));
    }

    let pattern = match &spec.pattern {
        Some(p) => Some(
            CompiledRegex::new(p).map_err(|message| RuleError::InvalidPattern {
                rule: name.clone(),
                message,
            })?,
        ),
        None => None,
    };

    debug!(rule = %name, category = category.label(), "compiled rule");

    Ok(CompiledRule {
        name,
        category,
        pattern,
        severity: spec.severity,
        action: spec.action,
        scope: spec.scope,
        description: spec.description,
        suggestion: spec.suggestion,
        max_lines: spec.max_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::rules::{RuleAction, RuleScope, Severity};

    fn write_rules(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const GOOD_RULES: &str = r#"
security:
  - name: hardcoded_secrets
    pattern: '(?i)secret'
    severity: high
    action: block
    scope: file-edits
quality:
  - name: large_function
    max_lines: 50
    severity: medium
    action: warn
    scope: file-edits
"#;

    mod happy_path {
        use super::*;

        #[test]
        fn loads_a_valid_file() {
            let file = write_rules(GOOD_RULES);
            let set = load_rules_file(file.path()).unwrap();
            assert_eq!(set.len(), 2);
            assert_eq!(
                set.source(),
                &crate::rules::RuleSource::File(file.path().to_path_buf())
            );

            let secrets = set.get("hardcoded_secrets").unwrap();
            assert_eq!(secrets.severity, Severity::High);
            assert_eq!(secrets.action, RuleAction::Block);
            assert_eq!(secrets.scope, RuleScope::FileEdits);

            let large = set.get("large_function").unwrap();
            assert!(large.pattern.is_none());
            assert_eq!(large.max_lines, Some(50));
        }

        #[test]
        fn effective_rules_falls_back_to_builtins() {
            let set = effective_rules(None).unwrap();
            assert_eq!(set.source(), &crate::rules::RuleSource::Builtin);
            assert!(!set.is_empty());
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn missing_file_is_an_io_error() {
            let err = load_rules_file(Path::new("/nonexistent/rules.yaml")).unwrap_err();
            assert!(matches!(err, RuleError::Io { .. }));
        }

        #[test]
        fn unknown_category_fails() {
            let file = write_rules("styling:\n  - name: x\n    pattern: y\n");
            let err = load_rules_file(file.path()).unwrap_err();
            assert!(err.to_string().contains("unknown rule category 'styling'"));
        }

        #[test]
        fn bad_regex_names_the_rule() {
            let file = write_rules("security:\n  - name: broken\n    pattern: '(unclosed'\n");
            let err = load_rules_file(file.path()).unwrap_err();
            match err {
                RuleError::InvalidPattern { rule, .. } => assert_eq!(rule, "broken"),
                other => panic!("expected InvalidPattern, got {other:?}"),
            }
        }

        #[test]
        fn rule_without_pattern_or_threshold_fails() {
            let file = write_rules("quality:\n  - name: empty_rule\n    severity: low\n");
            let err = load_rules_file(file.path()).unwrap_err();
            assert!(err.to_string().contains("neither a pattern nor a max_lines"));
        }

        #[test]
        fn duplicate_names_fail_across_categories() {
            let doc = r"
security:
  - name: dup
    pattern: a
quality:
  - name: dup
    pattern: b
";
            let file = write_rules(doc);
            let err = load_rules_file(file.path()).unwrap_err();
            assert!(err.to_string().contains("duplicate rule name 'dup'"));
        }

        #[test]
        fn unknown_severity_is_a_parse_error() {
            let file = write_rules("security:\n  - name: x\n    pattern: y\n    severity: wild\n");
            assert!(matches!(
                load_rules_file(file.path()).unwrap_err(),
                RuleError::Parse { .. }
            ));
        }

        #[test]
        fn misspelled_field_is_a_parse_error() {
            let file = write_rules("security:\n  - name: x\n    patern: y\n");
            assert!(matches!(
                load_rules_file(file.path()).unwrap_err(),
                RuleError::Parse { .. }
            ));
        }
    }
}
