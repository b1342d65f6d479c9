use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::tokenizer::AnchorActive;

/// A regex wrapper that serializes as a string but compiles lazily at runtime.
///
/// Patterns containing `\G` need a second compiled version where the anchor can't match,
/// see [`AnchorActive`].
pub struct Regex {
    pattern: String,
    compiled: OnceLock<Option<Arc<onig::Regex>>>,
    compiled_without_g: OnceLock<Option<Arc<onig::Regex>>>,
}

impl Clone for Regex {
    fn clone(&self) -> Self {
        // Create a new regex with the same pattern but fresh lazy compilation
        Regex::new(self.pattern.clone())
    }
}

impl PartialEq for Regex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for Regex {}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

impl Regex {
    pub fn new(pattern: String) -> Self {
        Self {
            pattern,
            compiled: OnceLock::new(),
            compiled_without_g: OnceLock::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The compiled regex for the given anchor state, `None` if the pattern is invalid
    pub fn compiled(&self, anchor: AnchorActive) -> Option<&Arc<onig::Regex>> {
        let cell = if anchor == AnchorActive::G || !self.pattern.contains("\\G") {
            &self.compiled
        } else {
            &self.compiled_without_g
        };
        cell.get_or_init(|| {
            onig::Regex::new(&anchor.replace_anchors(&self.pattern))
                .ok()
                .map(Arc::new)
        })
        .as_ref()
    }

    /// Validate that this regex pattern compiles successfully.
    /// Back-references are replaced by an empty string first since they are
    /// only resolved when a region is opened.
    pub fn validate(&self) -> Result<(), String> {
        let pattern = if self.has_backreferences() {
            resolve_backreferences(&self.pattern, "", &[])
        } else {
            self.pattern.clone()
        };
        onig::Regex::new(&pattern)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    pub fn has_backreferences(&self) -> bool {
        let mut chars = self.pattern.chars();
        while let Some(c) = chars.next() {
            if c == '\\'
                && let Some(next) = chars.next()
                && matches!(next, '1'..='9')
            {
                return true;
            }
        }
        false
    }
}

impl Serialize for Regex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for Regex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        Ok(Regex::new(pattern))
    }
}

fn escape_regex_char(c: char, out: &mut String) {
    if matches!(
        c,
        '\\' | '|'
            | '-'
            | '*'
            | '+'
            | '?'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '^'
            | '$'
            | '.'
            | '#'
            | ' '
            | '/'
    ) {
        out.push('\\');
    }
    out.push(c);
}

/// Replaces `\1` to `\9` in an end pattern with the literal text captured by the begin match.
/// The captured text is escaped so it matches literally.
/// Groups that did not participate in the match are replaced by nothing.
pub fn resolve_backreferences(
    pattern: &str,
    text: &str,
    captures: &[Option<(usize, usize)>],
) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d @ '1'..='9') => {
                let group = d as usize - '0' as usize;
                if let Some(Some((start, end))) = captures.get(group)
                    && let Some(captured) = text.get(*start..*end)
                {
                    for ch in captured.chars() {
                        escape_regex_char(ch, &mut out);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
