//! The syntax tree produced by a parse.
//!
//! Nodes live in a flat buffer in pre-order. Each record knows how many descendants
//! follow it, which is all that is needed to walk the tree: the first child of a node is
//! the next record and its next sibling is `descendants + 1` records later.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::node_types::{NodeType, NodeTypeId, NodeTypeRegistry};

mod builder;
mod cursor;
mod metadata;
mod validate;

pub(crate) use builder::TreeBuilder;
pub use cursor::TreeCursor;
pub use metadata::IndentContext;
pub use validate::TreeDefect;

const NO_PARENT: u32 = u32::MAX;

/// Longest texts a tree can describe, offsets are stored on 32 bits
pub const MAX_TEXT_LEN: usize = u32::MAX as usize;

/// `pos` clamped to the text and moved back to the start of the char it falls in
pub(crate) fn floor_char_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeRecord {
    pub from: u32,
    pub to: u32,
    pub kind: NodeTypeId,
    /// Number of records following this one that belong to its subtree
    pub descendants: u32,
}

impl NodeRecord {
    pub fn range(&self) -> Range<usize> {
        self.from as usize..self.to as usize
    }
}

/// An immutable syntax tree.
///
/// Node type lookups go through the registries of every grammar of the registry it was
/// parsed with, so nodes of embedded languages resolve too.
#[derive(Clone)]
pub struct SyntaxTree {
    records: Vec<NodeRecord>,
    parents: Vec<u32>,
    node_types: Arc<[Arc<NodeTypeRegistry>]>,
}

impl SyntaxTree {
    pub(crate) fn from_records(
        records: Vec<NodeRecord>,
        node_types: Arc<[Arc<NodeTypeRegistry>]>,
    ) -> Self {
        let mut parents = vec![NO_PARENT; records.len()];
        let mut open: Vec<usize> = Vec::new();
        for (i, parent) in parents.iter_mut().enumerate() {
            while let Some(&p) = open.last()
                && i > p + records[p].descendants as usize
            {
                open.pop();
            }
            if let Some(&p) = open.last() {
                *parent = p as u32;
            }
            open.push(i);
        }

        Self {
            records,
            parents,
            node_types,
        }
    }

    /// Length of the text that was parsed
    pub fn len(&self) -> usize {
        self.records.first().map_or(0, |r| r.to as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node, in pre-order
    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            index: 0,
        }
    }

    pub fn node(&self, index: usize) -> Option<NodeRef<'_>> {
        if index < self.records.len() {
            Some(NodeRef { tree: self, index })
        } else {
            None
        }
    }

    /// The deepest node containing `pos`.
    /// Zero-width nodes are never returned, except for the root of an empty text.
    pub fn node_at(&self, pos: usize) -> NodeRef<'_> {
        let mut node = self.root();
        'descend: loop {
            for child in node.children() {
                let range = child.range();
                if range.start <= pos && pos < range.end {
                    node = child;
                    continue 'descend;
                }
                if range.start > pos {
                    break;
                }
            }
            return node;
        }
    }

    /// Every node overlapping `range`, in pre-order.
    /// Zero-width nodes are included if they sit inside the range.
    pub fn nodes_in(&self, range: Range<usize>) -> Vec<NodeRef<'_>> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.records.len() {
            let record = &self.records[i];
            let (from, to) = (record.from as usize, record.to as usize);
            let overlaps = if from == to {
                range.start <= from && from <= range.end
            } else {
                from < range.end && to > range.start
            };
            if overlaps {
                out.push(NodeRef {
                    tree: self,
                    index: i,
                });
                i += 1;
            } else {
                // none of its descendants can overlap either
                i += record.descendants as usize + 1;
            }
        }
        out
    }

    /// The leaves, in text order. Together they cover the text exactly once.
    pub fn leaves(&self) -> impl Iterator<Item = NodeRef<'_>> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.descendants == 0)
            .map(move |(index, _)| NodeRef { tree: self, index })
    }

    pub fn node_type(&self, id: NodeTypeId) -> Option<&NodeType> {
        self.node_types.get(id.grammar.as_index())?.get(id)
    }

    /// Looks up a node type of the grammar the text was parsed with
    pub fn node_type_by_name(&self, name: &str) -> Option<&NodeType> {
        let grammar = self.records.first()?.kind.grammar;
        self.node_types.get(grammar.as_index())?.by_name(name)
    }

    /// Every node whose type is named `name`, including nodes of embedded languages
    pub fn find_all<'t>(&'t self, name: &'t str) -> impl Iterator<Item = NodeRef<'t>> + 't {
        (0..self.records.len())
            .map(move |index| NodeRef { tree: self, index })
            .filter(move |node| node.name() == name)
    }

    pub fn cursor(&self) -> TreeCursor<'_> {
        TreeCursor::new(self.root())
    }

    fn subtree_end(&self, index: usize) -> usize {
        index + self.records[index].descendants as usize + 1
    }
}

impl PartialEq for SyntaxTree {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl Eq for SyntaxTree {}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("len", &self.len())
            .field("nodes", &self.records.len())
            .finish()
    }
}

/// Outline of the tree, one node per line
impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // where the subtrees of the ancestors of the current node end
        let mut open: Vec<usize> = Vec::new();
        for (i, record) in self.records.iter().enumerate() {
            while let Some(&end) = open.last()
                && i >= end
            {
                open.pop();
            }
            let node = NodeRef {
                tree: self,
                index: i,
            };
            writeln!(
                f,
                "{}{} [{}..{}]",
                "  ".repeat(open.len()),
                node.name(),
                record.from,
                record.to
            )?;
            open.push(self.subtree_end(i));
        }
        Ok(())
    }
}

/// A node of a [`SyntaxTree`]
#[derive(Copy, Clone)]
pub struct NodeRef<'t> {
    tree: &'t SyntaxTree,
    index: usize,
}

impl<'t> NodeRef<'t> {
    fn record(&self) -> &'t NodeRecord {
        &self.tree.records[self.index]
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    /// Position of this node in [`SyntaxTree::records`]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> NodeTypeId {
        self.record().kind
    }

    pub fn node_type(&self) -> Option<&'t NodeType> {
        self.tree.node_type(self.kind())
    }

    pub fn name(&self) -> &'t str {
        self.node_type().map_or("", |t| t.name.as_str())
    }

    pub fn range(&self) -> Range<usize> {
        self.record().range()
    }

    pub fn text<'s>(&self, text: &'s str) -> &'s str {
        text.get(self.range()).unwrap_or("")
    }

    pub fn is_leaf(&self) -> bool {
        self.record().descendants == 0
    }

    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }

    /// Text of a node not claimed by any of its more specific children
    pub fn is_filler(&self) -> bool {
        self.is_leaf() && self.parent().is_some_and(|p| p.kind() == self.kind())
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        let parent = self.tree.parents[self.index];
        if parent == NO_PARENT {
            None
        } else {
            self.tree.node(parent as usize)
        }
    }

    pub fn first_child(&self) -> Option<NodeRef<'t>> {
        if self.is_leaf() {
            None
        } else {
            self.tree.node(self.index + 1)
        }
    }

    pub fn last_child(&self) -> Option<NodeRef<'t>> {
        self.children().last()
    }

    pub fn next_sibling(&self) -> Option<NodeRef<'t>> {
        let parent = self.parent()?;
        let next = self.tree.subtree_end(self.index);
        if next < self.tree.subtree_end(parent.index) {
            self.tree.node(next)
        } else {
            None
        }
    }

    pub fn prev_sibling(&self) -> Option<NodeRef<'t>> {
        self.parent()?
            .children()
            .take_while(|child| child.index < self.index)
            .last()
    }

    pub fn children(&self) -> Children<'t> {
        Children {
            tree: self.tree,
            next: self.index + 1,
            end: self.tree.subtree_end(self.index),
        }
    }

    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    /// Parent, grand-parent and so on up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        std::iter::successors(self.parent(), |node| node.parent())
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.index == other.index
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}..{}]", self.name(), self.record().from, self.record().to)
    }
}

pub struct Children<'t> {
    tree: &'t SyntaxTree,
    next: usize,
    end: usize,
}

impl<'t> Iterator for Children<'t> {
    type Item = NodeRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let index = self.next;
        self.next = self.tree.subtree_end(index);
        Some(NodeRef {
            tree: self.tree,
            index,
        })
    }
}
