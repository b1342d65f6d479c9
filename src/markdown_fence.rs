use std::collections::BTreeMap;

/// The info string of a fenced code block, eg `rust,linenos,name=example`
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedFence<'f> {
    /// The first bare word, empty if there is none
    pub lang: &'f str,
    /// Bare words after the language
    pub flags: Vec<&'f str>,
    /// `key=value` pairs
    pub rest: BTreeMap<&'f str, &'f str>,
}

/// Splits a fence info string on commas or whitespace.
/// This is how embedded regions pick the language of their content.
pub fn parse_markdown_fence(fence: &str) -> ParsedFence<'_> {
    let mut language = None;
    let mut flags = Vec::new();
    let mut rest = BTreeMap::new();

    for token in fence.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        match token.split_once('=') {
            Some((key, value)) => {
                rest.insert(key.trim(), value.trim());
            }
            None if language.is_none() => language = Some(token),
            None => flags.push(token),
        }
    }

    ParsedFence {
        lang: language.unwrap_or(""),
        flags,
        rest,
    }
}
