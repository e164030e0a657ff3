//! Wildcard matching for API name filters
//!
//! Pattern syntax:
//! - `.` matches exactly one character
//! - `*` matches any run of characters, including the empty run
//! - every other character matches itself
//!
//! Matches are anchored at both ends: the whole text must be consumed.

use std::fmt;

/// A wildcard pattern decoded into characters once, at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    source: String,
    chars: Vec<char>,
}

impl WildcardPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let chars = source.chars().collect();
        Self { source, chars }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        match_chars(&self.chars, &text)
    }
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Match `text` against `pattern` without precompiling the pattern.
pub fn matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_chars(&pattern, &text)
}

/// Backtracking matcher over character slices.
///
/// Worst case is exponential in the number of `*`s. Patterns come from
/// operator configuration and are short, so no memoization is done.
fn match_chars(mut pattern: &[char], mut text: &[char]) -> bool {
    while let Some(&p) = pattern.first() {
        match p {
            '*' => {
                return match_chars(&pattern[1..], text)
                    || (!text.is_empty() && match_chars(pattern, &text[1..]));
            }
            '.' => {
                if text.is_empty() {
                    return false;
                }
            }
            literal => {
                if text.first() != Some(&literal) {
                    return false;
                }
            }
        }
        pattern = &pattern[1..];
        text = &text[1..];
    }
    text.is_empty()
}
