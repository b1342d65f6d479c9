use std::ops::Range;

use serde::Serialize;

use crate::tree::{NodeRef, SyntaxTree};

/// A range of text and the highlight tag that applies to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightSpan<'t> {
    pub range: Range<usize>,
    pub tag: &'t str,
}

/// Options for span merging behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergingOptions {
    /// Whitespace-only leaves extend the span before them instead of starting a new one
    pub merge_whitespaces: bool,
    /// Adjacent spans with the same tag become one
    pub merge_same_tag_spans: bool,
}

impl Default for MergingOptions {
    fn default() -> Self {
        Self {
            merge_whitespaces: true,
            merge_same_tag_spans: true,
        }
    }
}

/// The tag of the innermost node around `leaf` that has one
fn tag_of<'t>(leaf: NodeRef<'t>) -> Option<&'t str> {
    std::iter::once(leaf)
        .chain(leaf.ancestors())
        .find_map(|node| node.node_type()?.highlight_tag())
}

/// Highlight spans of a tree, in text order.
///
/// Every leaf gets the tag of its innermost tagged ancestor, text under untagged nodes
/// only (eg the document root) has no span.
pub fn highlights<'t>(
    tree: &'t SyntaxTree,
    text: &str,
    options: MergingOptions,
) -> Vec<HighlightSpan<'t>> {
    let mut spans: Vec<HighlightSpan<'t>> = Vec::new();

    for leaf in tree.leaves() {
        let range = leaf.range();
        if range.is_empty() {
            continue;
        }

        if let Some(last) = spans.last_mut()
            && last.range.end == range.start
        {
            let is_whitespace = text
                .get(range.clone())
                .is_some_and(|s| s.chars().all(char::is_whitespace));
            if options.merge_whitespaces && is_whitespace && !leaf.is_error() {
                last.range.end = range.end;
                continue;
            }
            let tag = tag_of(leaf);
            if options.merge_same_tag_spans && tag == Some(last.tag) {
                last.range.end = range.end;
                continue;
            }
            if let Some(tag) = tag {
                spans.push(HighlightSpan { range, tag });
            }
            continue;
        }

        if let Some(tag) = tag_of(leaf) {
            spans.push(HighlightSpan { range, tag });
        }
    }

    spans
}
