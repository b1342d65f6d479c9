//! Editor queries driven by the node type metadata declared in grammars.

use std::ops::Range;

use crate::tree::{NodeRef, SyntaxTree, floor_char_boundary};

/// What indentation queries need to know about the editor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentContext {
    /// Width of one indentation level, in columns. A tab counts as one unit.
    pub unit: usize,
}

impl IndentContext {
    pub fn new(unit: usize) -> Self {
        Self { unit }
    }
}

impl Default for IndentContext {
    fn default() -> Self {
        Self { unit: 4 }
    }
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |i| i + 1)
}

fn line_at(text: &str, pos: usize) -> &str {
    let start = line_start(text, pos);
    let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
    text[start..end].trim_end_matches('\r')
}

fn leading_columns(line: &str, unit: usize) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { unit } else { 1 })
        .sum()
}

/// Whether the region of the node was still open when the text ended
fn is_unterminated(node: NodeRef<'_>) -> bool {
    match node.last_child() {
        Some(last) if last.range().end == node.range().end => {
            (last.kind().is_error() && last.range().is_empty()) || is_unterminated(last)
        }
        _ => false,
    }
}

impl SyntaxTree {
    /// The range that can be folded for `node`, if its type has a fold directive
    pub fn fold_range(&self, node: NodeRef<'_>, text: &str) -> Option<Range<usize>> {
        let directive = node.node_type()?.fold?;
        let inner = match (node.first_child(), node.last_child()) {
            (Some(first), Some(last)) if first != last => {
                Some((first.range().end, last.range().start))
            }
            _ => None,
        };
        directive.fold_range(text, node.range(), inner)
    }

    /// Every foldable range spanning more than one line, in tree order
    pub fn foldable_ranges(&self, text: &str) -> Vec<Range<usize>> {
        (0..self.records.len())
            .filter_map(|index| self.node(index))
            .filter(|node| !node.is_filler())
            .filter_map(|node| self.fold_range(node, text))
            .filter(|range| text.get(range.clone()).is_some_and(|s| s.contains('\n')))
            .collect()
    }

    /// Indentation in columns of the line containing `pos`.
    ///
    /// Uses the innermost node starting before `pos` with an indent directive, relative to
    /// the indentation of the line that node starts on. `None` when no such node exists.
    pub fn indentation(&self, text: &str, pos: usize, ctx: &IndentContext) -> Option<usize> {
        let pos = floor_char_boundary(text, pos);
        let line = line_at(text, pos);

        // descend to the innermost node around pos, open regions at the end included
        let mut path = vec![self.root()];
        'descend: loop {
            let node = path[path.len() - 1];
            for child in node.children().filter(|c| !c.is_filler()) {
                let range = child.range();
                if range.start < pos
                    && (pos < range.end || (pos == range.end && is_unterminated(child)))
                {
                    path.push(child);
                    continue 'descend;
                }
            }
            break;
        }

        path.iter().rev().find_map(|node| {
            let directive = node.node_type()?.indent.as_ref()?;
            let start = node.range().start;
            let base = leading_columns(&text[line_start(text, start)..], ctx.unit);
            Some(directive.apply(base, ctx.unit, line))
        })
    }

    /// The node closing or opening `node` according to the `closedBy`/`openedBy` names of
    /// its type, looking at its siblings and skipping nested pairs of the same kind.
    pub fn matching_bracket<'t>(&'t self, node: NodeRef<'t>) -> Option<NodeRef<'t>> {
        let node_type = node.node_type()?;

        let (candidates, step): (&[String], fn(&NodeRef<'t>) -> Option<NodeRef<'t>>) =
            if !node_type.closed_by.is_empty() {
                (&node_type.closed_by, NodeRef::next_sibling)
            } else if !node_type.opened_by.is_empty() {
                (&node_type.opened_by, NodeRef::prev_sibling)
            } else {
                return None;
            };

        let mut depth = 0usize;
        for sibling in std::iter::successors(step(&node), step) {
            let name = sibling.name();
            if candidates.iter().any(|c| c == name) {
                if depth == 0 {
                    return Some(sibling);
                }
                depth -= 1;
            } else if name == node_type.name {
                depth += 1;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::parse_with;

    #[test]
    fn folds_inside_blocks() {
        let text = "{\n  1\n}";
        let (tree, _) = parse_with("blocks", text);
        let block = tree.find_all("meta.block").next().unwrap();
        assert_eq!(tree.fold_range(block, text), Some(1..6));
        assert_eq!(tree.foldable_ranges(text), vec![1..6]);
    }

    #[test]
    fn single_line_folds_are_skipped() {
        let text = "{ 1 }";
        let (tree, _) = parse_with("blocks", text);
        let block = tree.find_all("meta.block").next().unwrap();
        assert_eq!(tree.fold_range(block, text), Some(1..4));
        assert!(tree.foldable_ranges(text).is_empty());
    }

    #[test]
    fn comments_fold_past_their_first_line() {
        let text = "/* a\n b */";
        let (tree, _) = parse_with("blocks", text);
        assert_eq!(tree.foldable_ranges(text), vec![4..10]);
    }

    #[test]
    fn indents_inside_blocks() {
        let text = "{\n  {\n    1\n  }\n}";
        let (tree, _) = parse_with("blocks", text);
        let ctx = IndentContext::new(2);
        // line of `1`
        assert_eq!(tree.indentation(text, 10, &ctx), Some(4));
        // line of the inner `}`
        assert_eq!(tree.indentation(text, 14, &ctx), Some(2));
        // line of the outer `}`
        assert_eq!(tree.indentation(text, 16, &ctx), Some(0));
        // first line, not inside any block
        assert_eq!(tree.indentation(text, 0, &ctx), None);
    }

    #[test]
    fn positions_inside_a_char_are_moved_to_its_start() {
        let text = "{\n  \"é\"\n}";
        let (tree, _) = parse_with("blocks", text);
        let ctx = IndentContext::new(2);
        // `é` is 5..7
        assert_eq!(tree.indentation(text, 6, &ctx), Some(2));
        assert_eq!(tree.indentation(text, 6, &ctx), tree.indentation(text, 5, &ctx));
        assert_eq!(
            tree.indentation(text, 100, &ctx),
            tree.indentation(text, text.len(), &ctx)
        );
    }

    #[test]
    fn indents_inside_unterminated_blocks() {
        let text = "\t{\n";
        let (tree, _) = parse_with("blocks", text);
        assert_eq!(
            tree.indentation(text, text.len(), &IndentContext::default()),
            Some(8)
        );
    }

    #[test]
    fn matches_brackets() {
        let text = "{ { } }";
        let (tree, _) = parse_with("blocks", text);
        let opens: Vec<_> = tree.find_all("punctuation.block.begin").collect();
        let closes: Vec<_> = tree.find_all("punctuation.block.end").collect();
        assert_eq!(tree.matching_bracket(opens[0]), Some(closes[1]));
        assert_eq!(tree.matching_bracket(opens[1]), Some(closes[0]));
        assert_eq!(tree.matching_bracket(closes[1]), Some(opens[0]));

        let block = tree.find_all("meta.block").next().unwrap();
        assert_eq!(tree.matching_bracket(block), None);
    }
}
