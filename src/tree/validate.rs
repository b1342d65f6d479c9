use std::fmt;

use crate::tree::SyntaxTree;

/// A structural problem found by [`SyntaxTree::validate`].
///
/// Those can't happen with trees built by a parser, finding one is a bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDefect {
    /// The root doesn't start at 0
    RootSpan { from: usize, to: usize, len: usize },
    InvertedRange { node: usize },
    ChildOutsideParent { node: usize, parent: usize },
    /// A node starts before the end of its previous sibling
    SiblingOverlap { node: usize, previous: usize },
    /// Text between two leaves that no leaf covers
    TilingGap { from: usize, to: usize },
    /// A leaf starting before the end of the previous one
    TilingOverlap { node: usize },
}

impl fmt::Display for TreeDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeDefect::RootSpan { from, to, len } => {
                write!(f, "root spans [{from}..{to}] for a text of length {len}")
            }
            TreeDefect::InvertedRange { node } => write!(f, "node {node} ends before it starts"),
            TreeDefect::ChildOutsideParent { node, parent } => {
                write!(f, "node {node} is not contained in its parent {parent}")
            }
            TreeDefect::SiblingOverlap { node, previous } => {
                write!(f, "node {node} overlaps its previous sibling {previous}")
            }
            TreeDefect::TilingGap { from, to } => write!(f, "no leaf covers [{from}..{to}]"),
            TreeDefect::TilingOverlap { node } => {
                write!(f, "leaf {node} overlaps the previous leaf")
            }
        }
    }
}

impl SyntaxTree {
    /// Checks the structural invariants of the tree: containment, sibling order and
    /// that leaves cover the text exactly once.
    /// Returns every defect found, an empty list for a valid tree.
    pub fn validate(&self) -> Vec<TreeDefect> {
        let mut defects = Vec::new();
        let Some(root) = self.records.first() else {
            return defects;
        };
        if root.from != 0 {
            defects.push(TreeDefect::RootSpan {
                from: root.from as usize,
                to: root.to as usize,
                len: self.len(),
            });
        }

        // last child seen of every node
        let mut previous_child: Vec<Option<usize>> = vec![None; self.records.len()];
        let mut covered = 0;

        for (i, record) in self.records.iter().enumerate() {
            if record.from > record.to {
                defects.push(TreeDefect::InvertedRange { node: i });
            }

            let parent = self.parents[i];
            if parent != super::NO_PARENT {
                let parent = parent as usize;
                let p = &self.records[parent];
                if record.from < p.from || record.to > p.to {
                    defects.push(TreeDefect::ChildOutsideParent { node: i, parent });
                }
                if let Some(previous) = previous_child[parent]
                    && record.from < self.records[previous].to
                {
                    defects.push(TreeDefect::SiblingOverlap { node: i, previous });
                }
                previous_child[parent] = Some(i);
            }

            if record.descendants == 0 {
                let from = record.from as usize;
                if from > covered {
                    defects.push(TreeDefect::TilingGap {
                        from: covered,
                        to: from,
                    });
                } else if from < covered {
                    defects.push(TreeDefect::TilingOverlap { node: i });
                }
                covered = covered.max(record.to as usize);
            }
        }

        if covered != self.len() {
            defects.push(TreeDefect::TilingGap {
                from: covered,
                to: self.len(),
            });
        }

        defects
    }
}
