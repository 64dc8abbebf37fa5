//! Target pattern matching.
//!
//! Patterns are deliberately small: a literal, the wildcard `*` (alias
//! `all`), a `prefix-*`, or a `*-suffix`. Matching is case-sensitive and
//! a wildcard never matches the empty target.

use vigil_types::ValidationError;

/// Check whether `pattern` applies to the concrete `target`.
pub fn matches(pattern: &str, target: &str) -> bool {
    if target.is_empty() {
        return false;
    }
    if pattern == "all" || pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return target.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return target.ends_with(suffix);
    }
    pattern == target
}

/// Validate that a pattern uses one of the supported glob forms: at most
/// one `*`, and only in the first or last position.
pub fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    if pattern.is_empty() {
        return Err(ValidationError::Empty { field: "target" });
    }
    let stars = pattern.matches('*').count();
    let valid = match stars {
        0 => true,
        1 => pattern.starts_with('*') || pattern.ends_with('*'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::BadPattern {
            pattern: pattern.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches_any_nonempty() {
        assert!(matches("*", "web-1"));
        assert!(matches("all", "db-primary"));
        assert!(!matches("*", ""));
        assert!(!matches("all", ""));
    }

    #[test]
    fn test_prefix_glob() {
        assert!(matches("web-*", "web-1"));
        assert!(matches("web-*", "web-"));
        assert!(!matches("web-*", "db-1"));
    }

    #[test]
    fn test_suffix_glob() {
        assert!(matches("*-primary", "db-primary"));
        assert!(!matches("*-primary", "db-replica"));
    }

    #[test]
    fn test_literal_is_case_sensitive() {
        assert!(matches("web-1", "web-1"));
        assert!(!matches("web-1", "Web-1"));
        assert!(!matches("web-1", "web-10"));
    }

    #[test]
    fn test_pattern_validation() {
        for ok in ["all", "*", "web-*", "*-suffix", "literal"] {
            assert!(validate_pattern(ok).is_ok(), "{ok} should validate");
        }
        for bad in ["", "a*b", "*mid*", "**"] {
            assert!(validate_pattern(bad).is_err(), "{bad} should be rejected");
        }
    }
}
