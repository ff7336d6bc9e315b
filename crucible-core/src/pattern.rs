//! Shared regex matching for the `when` and hardware constraint languages
//!
//! Both surface languages expose `~` / `!~` operators. They route through
//! this single helper so the semantics stay identical: unanchored *search*
//! over the value, with surrounding whitespace of the pattern stripped.

use crate::error::ExpressionError;
use regex::Regex;

/// Return whether `pattern` is found anywhere in `text`.
pub fn search(pattern: &str, text: &str) -> Result<bool, ExpressionError> {
    let regex = compile(pattern)?;
    Ok(regex.is_match(text))
}

/// Compile a user-supplied pattern, trimming surrounding whitespace.
pub fn compile(pattern: &str) -> Result<Regex, ExpressionError> {
    let trimmed = pattern.trim();
    Regex::new(trimmed).map_err(|err| ExpressionError::InvalidPattern {
        pattern: trimmed.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_is_unanchored() {
        assert!(search("edora", "fedora-33").unwrap());
        assert!(!search("^edora", "fedora-33").unwrap());
    }

    #[test]
    fn test_pattern_whitespace_stripped() {
        assert!(search("  fedora ", "fedora-33").unwrap());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = search("fed(ora", "fedora").unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidPattern { .. }));
    }
}
