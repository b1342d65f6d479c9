use std::fmt;

use crate::grammars::{GlobalRuleRef, Regex};

#[derive(Clone, Debug)]
pub struct StackFrame {
    /// Global rule ref that created this stack element
    pub rule_ref: GlobalRuleRef,
    /// Where the begin match of this region started
    pub start: usize,
    /// Where the begin match ended, the only position where `\G` can match
    pub anchor: Option<usize>,
    /// End pattern with `\1`, `\2` etc. resolved from the begin match.
    /// Only lives as long as the region is open.
    pub end_pattern: Option<Regex>,
    /// Whether a node was opened for the `name` of the rule
    pub has_name_node: bool,
    /// Whether a node was opened for the `contentName` of the rule
    pub has_content_node: bool,
    /// Set when this region or one of its parents can't span lines
    pub line_bound: bool,
    /// Language the content of this region is delegated to
    pub embed: Option<String>,
}

impl StackFrame {
    fn root(rule_ref: GlobalRuleRef) -> Self {
        Self {
            rule_ref,
            start: 0,
            anchor: None,
            end_pattern: None,
            has_name_node: false,
            has_content_node: false,
            line_bound: false,
            embed: None,
        }
    }
}

/// Current offset plus the regions open at that offset.
/// The first frame is the grammar root and is never popped.
#[derive(Clone)]
pub struct ScanState {
    pub offset: usize,
    pub frames: Vec<StackFrame>,
}

impl ScanState {
    pub fn new(root: GlobalRuleRef) -> Self {
        Self {
            offset: 0,
            frames: vec![StackFrame::root(root)],
        }
    }

    /// Starts a nested scan over a capture: the frames are kept so `$self` and friends
    /// still make sense and a frame for the capture rule goes on top.
    pub fn for_capture(&self, rule_ref: GlobalRuleRef, start: usize) -> Self {
        let mut frames = self.frames.clone();
        frames.push(StackFrame {
            rule_ref,
            start,
            anchor: None,
            end_pattern: None,
            has_name_node: false,
            has_content_node: false,
            line_bound: self.top().line_bound,
            embed: None,
        });
        Self {
            offset: start,
            frames,
        }
    }

    /// Called when entering a nested context: when a BeginEnd begin pattern matches
    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Exits the current context, getting back to the parent.
    /// The root frame stays.
    pub fn pop(&mut self) -> Option<StackFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Access the top frame of the stack
    pub fn top(&self) -> &StackFrame {
        // the root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Identifies the stack independently from the offset, used to detect a scan that
    /// would come back to a state it has already been in without moving forward
    pub fn key(&self) -> Vec<GlobalRuleRef> {
        self.frames.iter().map(|f| f.rule_ref).collect()
    }

    /// Whether `rule_ref` already has a region opened exactly at `offset`
    pub fn entered_at(&self, rule_ref: GlobalRuleRef, offset: usize) -> bool {
        self.frames[1..]
            .iter()
            .any(|f| f.rule_ref == rule_ref && f.start == offset)
    }
}

impl fmt::Debug for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ScanState at {}:", self.offset)?;

        for (depth, frame) in self.frames.iter().enumerate() {
            let indent = "  ".repeat(depth);

            write!(
                f,
                "{}grammar={}, rule={}, start={}",
                indent, frame.rule_ref.grammar.0, frame.rule_ref.rule.0, frame.start
            )?;

            if let Some(pattern) = &frame.end_pattern {
                write!(f, ", end_pattern=\"{}\"", pattern.pattern())?;
            }

            write!(f, ", anchor={:?}", frame.anchor)?;

            if frame.line_bound {
                write!(f, ", single_line")?;
            }
            if let Some(lang) = &frame.embed {
                write!(f, ", embed={lang}")?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}
