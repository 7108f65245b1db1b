//! Dual regex engine selection for rule patterns.
//!
//! Most rule patterns compile on the linear-time `regex` crate, which gives
//! O(n) matching and no pathological backtracking. Rules files may also use
//! lookaround or backreferences (the upstream tool's operators paste such
//! patterns in routinely); those compile on `fancy_regex` instead.
//! [`CompiledRegex::new`] inspects the pattern and picks the engine.

/// A compiled rule pattern that auto-selects between linear-time and
/// backtracking engines.
///
/// Use this instead of `fancy_regex::Regex` directly when the pattern may not
/// require backtracking features. The `regex` crate provides O(n) guarantees
/// but doesn't support lookahead/lookbehind.
#[derive(Debug)]
pub enum CompiledRegex {
    /// Linear-time regex (O(n) guaranteed, no backtracking).
    Linear(regex::Regex),
    /// Backtracking regex (supports lookahead/lookbehind).
    Backtracking(fancy_regex::Regex),
}

impl CompiledRegex {
    /// Compile a pattern, auto-selecting the appropriate engine.
    ///
    /// Uses the linear-time `regex` crate unless the pattern contains
    /// features that require backtracking:
    /// - Lookahead: `(?=...)`, `(?!...)`
    /// - Lookbehind: `(?<=...)`, `(?<!...)`
    /// - Backreferences: `\1`, `\2`, etc.
    ///
    /// # Errors
    /// Returns an error message if the pattern fails to compile.
    pub fn new(pattern: &str) -> Result<Self, String> {
        if needs_backtracking_engine(pattern) {
            fancy_regex::Regex::new(pattern)
                .map(Self::Backtracking)
                .map_err(|e| format!("fancy_regex compile error: {e}"))
        } else {
            regex::Regex::new(pattern)
                .map(Self::Linear)
                .map_err(|e| format!("regex compile error: {e}"))
        }
    }

    /// Check if the pattern matches the text.
    ///
    /// For the backtracking engine, returns `false` on regex execution errors.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Linear(re) => re.is_match(text),
            Self::Backtracking(re) => re.is_match(text).unwrap_or(false),
        }
    }

    /// Find the first match in the text.
    ///
    /// Returns the start and end byte offsets of the match.
    #[must_use]
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        match self {
            Self::Linear(re) => re.find(text).map(|m| (m.start(), m.end())),
            Self::Backtracking(re) => re.find(text).ok().flatten().map(|m| (m.start(), m.end())),
        }
    }

    /// Get the pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Linear(re) => re.as_str(),
            Self::Backtracking(re) => re.as_str(),
        }
    }

    /// Check if this regex uses the backtracking engine.
    #[must_use]
    pub const fn uses_backtracking(&self) -> bool {
        matches!(self, Self::Backtracking(_))
    }
}

/// Check if a pattern requires the backtracking engine.
///
/// Returns `true` if the pattern contains features not supported by the
/// linear-time `regex` crate. This is a syntactic heuristic; false positives
/// (like `\1` inside a character class) are safe since they only select the
/// slower engine unnecessarily.
#[must_use]
pub fn needs_backtracking_engine(pattern: &str) -> bool {
    // Lookahead: (?= positive, (?! negative
    // Lookbehind: (?<= positive, (?<! negative
    // Atomic groups: (?>
    if pattern.contains("(?=")
        || pattern.contains("(?!")
        || pattern.contains("(?<=")
        || pattern.contains("(?<!")
        || pattern.contains("(?>")
    {
        return true;
    }

    // Possessive quantifiers: *+, ++, ?+, {n,m}+
    if pattern.contains("*+")
        || pattern.contains("++")
        || pattern.contains("?+")
        || pattern.contains("}+")
    {
        return true;
    }

    // Backreferences: \1 through \9
    let bytes = pattern.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'\\' {
            let next = bytes[i + 1];
            if next.is_ascii_digit() && next != b'0' {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    mod engine_selection {
        use super::*;

        #[test]
        fn simple_pattern_uses_linear_engine() {
            let re = CompiledRegex::new(r"rm\s+-rf").unwrap();
            assert!(!re.uses_backtracking());
        }

        #[test]
        fn lookahead_uses_backtracking_engine() {
            let re = CompiledRegex::new(r"commit(?=.*push)").unwrap();
            assert!(re.uses_backtracking());
        }

        #[test]
        fn negative_lookahead_detected() {
            assert!(needs_backtracking_engine(r"(?i)\A(?!.*test).*commit"));
        }

        #[test]
        fn backreference_detected() {
            assert!(needs_backtracking_engine(r"(['\x22])secret\1"));
        }

        #[test]
        fn escaped_zero_is_not_a_backreference() {
            assert!(!needs_backtracking_engine(r"null\0byte"));
        }

        #[test]
        fn case_insensitive_flag_stays_linear() {
            let re = CompiledRegex::new(r"(?i)secret").unwrap();
            assert!(!re.uses_backtracking());
        }
    }

    mod matching {
        use super::*;

        #[test]
        fn linear_engine_matches() {
            let re = CompiledRegex::new(r"chmod\s+777").unwrap();
            assert!(re.is_match("chmod 777 /tmp/x"));
            assert!(!re.is_match("chmod 644 /tmp/x"));
        }

        #[test]
        fn backtracking_engine_matches() {
            let re = CompiledRegex::new(r"(?i)\A(?!.*test).*commit").unwrap();
            assert!(re.is_match("about to commit the fix"));
            assert!(!re.is_match("commit after running tests"));
        }

        #[test]
        fn find_reports_byte_offsets() {
            let re = CompiledRegex::new(r"777").unwrap();
            assert_eq!(re.find("chmod 777"), Some((6, 9)));
        }

        #[test]
        fn invalid_pattern_reports_error() {
            let err = CompiledRegex::new(r"(unclosed").unwrap_err();
            assert!(err.contains("compile error"));
        }

        #[test]
        fn pattern_text_round_trips() {
            let re = CompiledRegex::new(r"(?i)secret").unwrap();
            assert_eq!(re.as_str(), r"(?i)secret");
        }
    }
}
