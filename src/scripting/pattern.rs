//! Regular expression inputs from scripts

use regex::Regex;
use std::borrow::Cow;

use crate::error::AssertionError;

/// A pattern given as a compiled regex or as source text
#[derive(Debug, Clone)]
pub enum Pattern {
    Compiled(Regex),
    Source(String),
}

impl Pattern {
    /// Compile the pattern, normalizing `/pattern/flags` literals first
    pub fn compile(&self) -> Result<Cow<'_, Regex>, AssertionError> {
        match self {
            Pattern::Compiled(regex) => Ok(Cow::Borrowed(regex)),
            Pattern::Source(source) => {
                let normalized = normalize_pattern(source);
                Regex::new(normalized)
                    .map(Cow::Owned)
                    .map_err(|e| AssertionError::InvalidPattern {
                        pattern: source.clone(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// Pattern text as given
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Compiled(regex) => regex.as_str(),
            Pattern::Source(source) => source,
        }
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Compiled(regex)
    }
}

impl From<&Regex> for Pattern {
    fn from(regex: &Regex) -> Self {
        Pattern::Compiled(regex.clone())
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern::Source(source.to_string())
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Pattern::Source(source)
    }
}

/// Strip `/.../flags` delimiters from a regex literal.
///
/// Returns the text between the first and last `/`; flags are dropped,
/// so `/abc/i` matches case-sensitively. Other input is returned as is.
pub fn normalize_pattern(source: &str) -> &str {
    if !source.starts_with('/') {
        return source;
    }

    match source.rfind('/') {
        Some(end) if end > 0 => &source[1..end],
        _ => source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_literal() {
        assert_eq!(normalize_pattern("/^abc/i"), "^abc");
        assert_eq!(normalize_pattern("/a/b/gm"), "a/b");
        assert_eq!(normalize_pattern("/x/"), "x");
    }

    #[test]
    fn test_normalize_leaves_plain_patterns() {
        assert_eq!(normalize_pattern("^abc"), "^abc");
        assert_eq!(normalize_pattern("/"), "/");
        assert_eq!(normalize_pattern("a/b"), "a/b");
    }

    #[test]
    fn test_compile_sources() {
        let literal = Pattern::from("/^abc/i");
        let plain = Pattern::from("^abc");
        assert_eq!(
            literal.compile().unwrap().as_str(),
            plain.compile().unwrap().as_str()
        );

        let compiled = Pattern::from(Regex::new(r"\d+").unwrap());
        assert!(compiled.compile().unwrap().is_match("42"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Pattern::from("/(unclosed/").compile().unwrap_err();
        assert!(matches!(
            err,
            AssertionError::InvalidPattern { ref pattern, .. } if pattern == "/(unclosed/"
        ));
    }
}
