use std::ops::Range;
use std::sync::Arc;

use crate::node_types::{NodeTypeId, NodeTypeRegistry};
use crate::tokenizer::{EventSink, ScanEvent};
use crate::tree::{NodeRecord, SyntaxTree};

/// A node that has been pushed but not popped yet
#[derive(Debug)]
struct OpenNode {
    /// Where its record is
    index: usize,
    kind: NodeTypeId,
    /// Children that are not filler of the node own type
    real_children: usize,
    /// Record of the last filler leaf, to merge adjacent ones
    last_filler: Option<usize>,
}

/// Turns scan events into a [`SyntaxTree`] in a single pass.
///
/// Only the currently open nodes are kept on the side so memory outside of the records
/// themselves is proportional to the nesting depth.
pub(crate) struct TreeBuilder<'t, R> {
    text: &'t str,
    records: Vec<NodeRecord>,
    stack: Vec<OpenNode>,
    /// Parses the content of embedded regions, `None` if the language isn't available
    resolve_embed: R,
}

impl<'t, R> TreeBuilder<'t, R>
where
    R: FnMut(&str, &str) -> Option<SyntaxTree>,
{
    pub fn new(text: &'t str, top: NodeTypeId, resolve_embed: R) -> Self {
        Self {
            text,
            records: vec![NodeRecord {
                from: 0,
                to: text.len() as u32,
                kind: top,
                descendants: 0,
            }],
            stack: vec![OpenNode {
                index: 0,
                kind: top,
                real_children: 0,
                last_filler: None,
            }],
            resolve_embed,
        }
    }

    fn open(&mut self, kind: NodeTypeId, at: usize) {
        if let Some(parent) = self.stack.last_mut() {
            parent.real_children += 1;
        }
        self.stack.push(OpenNode {
            index: self.records.len(),
            kind,
            real_children: 0,
            last_filler: None,
        });
        self.records.push(NodeRecord {
            from: at as u32,
            to: at as u32,
            kind,
            descendants: 0,
        });
    }

    fn leaf(&mut self, span: Range<usize>, kind: NodeTypeId) {
        let last = self.records.len() - 1;
        let Some(node) = self.stack.last_mut() else {
            return;
        };

        if kind == node.kind {
            // merge with the previous filler when nothing happened in between
            if let Some(filler) = node.last_filler
                && filler == last
                && self.records[filler].to as usize == span.start
            {
                self.records[filler].to = span.end as u32;
                return;
            }
            node.last_filler = Some(self.records.len());
        } else {
            node.real_children += 1;
        }

        self.records.push(NodeRecord {
            from: span.start as u32,
            to: span.end as u32,
            kind,
            descendants: 0,
        });
    }

    fn close(&mut self, at: usize) {
        // the root is closed by `finish`
        if self.stack.len() <= 1 {
            #[cfg(feature = "debug")]
            log::warn!("[TreeBuilder] pop at {at} without an open node");
            return;
        }
        let Some(node) = self.stack.pop() else {
            return;
        };

        let descendants = self.records.len() - node.index - 1;
        if node.real_children == 0 {
            // Only its own filler inside: becomes a leaf
            self.records.truncate(node.index + 1);
            let record = &mut self.records[node.index];
            record.to = at as u32;
            record.descendants = 0;
        } else {
            let record = &mut self.records[node.index];
            record.to = at as u32;
            record.descendants = descendants as u32;
        }
    }

    fn embed(&mut self, language: &str, range: Range<usize>) {
        let text = self.text;
        let sub_tree = text
            .get(range.clone())
            .and_then(|content| (self.resolve_embed)(language, content));

        let Some(sub_tree) = sub_tree else {
            #[cfg(feature = "debug")]
            log::debug!("[TreeBuilder] no grammar for embedded language {language:?}");
            let kind = self.stack.last().map(|n| n.kind).unwrap_or(self.records[0].kind);
            self.leaf(range, kind);
            return;
        };

        if let Some(parent) = self.stack.last_mut() {
            parent.real_children += 1;
        }
        // The embedded root becomes a child, positions shifted to the host text
        let offset = range.start as u32;
        self.records
            .extend(sub_tree.records.iter().map(|record| NodeRecord {
                from: record.from + offset,
                to: record.to + offset,
                ..*record
            }));
    }

    pub fn finish(mut self, node_types: Arc<[Arc<NodeTypeRegistry>]>) -> SyntaxTree {
        let len = self.text.len();
        while self.stack.len() > 1 {
            self.close(len);
        }
        let descendants = self.records.len() - 1;
        let root = &mut self.records[0];
        root.to = len as u32;
        root.descendants = descendants as u32;

        SyntaxTree::from_records(self.records, node_types)
    }
}

impl<R> EventSink for TreeBuilder<'_, R>
where
    R: FnMut(&str, &str) -> Option<SyntaxTree>,
{
    fn event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Push { kind, at } => self.open(kind, at),
            ScanEvent::Token(token) => self.leaf(token.span, token.kind),
            ScanEvent::Pop { at } => self.close(at),
            ScanEvent::Embed { language, range } => self.embed(&language, range),
        }
    }
}
