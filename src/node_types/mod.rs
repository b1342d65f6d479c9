//! Node types are the typed identities of tree nodes.
//!
//! Every grammar owns a [`NodeTypeRegistry`] assigning ids in first-declaration order,
//! so compiling the same grammar twice yields the same ids. Ids are namespaced by grammar
//! which means nodes coming from an embedded grammar never collide with the host ones.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::grammars::{GrammarId, RawRule};

mod directives;

pub use directives::{FoldDirective, IndentDirective};

/// The document root
pub const TOP: &str = "Top";
/// A line break crossed inside a region that can't span lines, or at the root
pub const NEWLINE: &str = "Newline";
/// A single code point no rule matched
pub const ERROR_UNRECOGNIZED: &str = "ErrorUnrecognized";
/// Marks a region still open when the input ended
pub const ERROR_INCOMPLETE: &str = "ErrorIncomplete";

const RESERVED: [&str; 4] = [TOP, NEWLINE, ERROR_UNRECOGNIZED, ERROR_INCOMPLETE];

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeTypeId {
    pub grammar: GrammarId,
    pub local: u16,
}

impl NodeTypeId {
    pub(crate) const TOP: u16 = 0;
    pub(crate) const NEWLINE: u16 = 1;
    pub(crate) const ERROR_UNRECOGNIZED: u16 = 2;
    pub(crate) const ERROR_INCOMPLETE: u16 = 3;

    pub fn top(grammar: GrammarId) -> Self {
        Self {
            grammar,
            local: Self::TOP,
        }
    }

    pub fn newline(grammar: GrammarId) -> Self {
        Self {
            grammar,
            local: Self::NEWLINE,
        }
    }

    pub fn error_unrecognized(grammar: GrammarId) -> Self {
        Self {
            grammar,
            local: Self::ERROR_UNRECOGNIZED,
        }
    }

    pub fn error_incomplete(grammar: GrammarId) -> Self {
        Self {
            grammar,
            local: Self::ERROR_INCOMPLETE,
        }
    }

    pub fn is_reserved(&self) -> bool {
        (self.local as usize) < RESERVED.len()
    }

    pub fn is_top(&self) -> bool {
        self.local == Self::TOP
    }

    pub fn is_error(&self) -> bool {
        self.local == Self::ERROR_UNRECOGNIZED || self.local == Self::ERROR_INCOMPLETE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub id: NodeTypeId,
    /// The scope name, eg `string.quoted.double`
    pub name: String,
    /// Highlight classification, if different from the name
    pub tag: Option<String>,
    pub fold: Option<FoldDirective>,
    pub indent: Option<IndentDirective>,
    /// Names of the node types this one closes, eg `}` is opened by `{`
    pub opened_by: Vec<String>,
    /// Names of the node types closing this one
    pub closed_by: Vec<String>,
    pub groups: Vec<String>,
}

impl NodeType {
    fn new(id: NodeTypeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            tag: None,
            fold: None,
            indent: None,
            opened_by: Vec::new(),
            closed_by: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// The highlight tag: explicit `tag` first, then the scope name.
    /// Reserved types have none unless they are errors.
    pub fn highlight_tag(&self) -> Option<&str> {
        if let Some(tag) = &self.tag {
            return Some(tag);
        }
        if self.id.is_error() {
            return Some("invalid");
        }
        if self.id.is_reserved() {
            return None;
        }
        Some(&self.name)
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn is_error(&self) -> bool {
        self.id.is_error()
    }

    pub fn is_top(&self) -> bool {
        self.id.is_top()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeRegistry {
    grammar: GrammarId,
    types: Vec<NodeType>,
    by_name: HashMap<String, u16>,
}

impl NodeTypeRegistry {
    /// A registry with only the reserved node types
    pub fn new(grammar: GrammarId) -> Self {
        let mut registry = Self {
            grammar,
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        for name in RESERVED {
            registry.register_or_lookup(name);
        }
        registry
    }

    pub fn grammar(&self) -> GrammarId {
        self.grammar
    }

    /// Returns the id of `name`, assigning the next one if it's the first time we see it
    pub fn register_or_lookup(&mut self, name: &str) -> NodeTypeId {
        if let Some(local) = self.by_name.get(name) {
            return NodeTypeId {
                grammar: self.grammar,
                local: *local,
            };
        }

        let id = NodeTypeId {
            grammar: self.grammar,
            local: self.types.len() as u16,
        };
        self.types.push(NodeType::new(id, name));
        self.by_name.insert(name.to_owned(), id.local);
        id
    }

    /// Registers `name` and attaches the metadata declared by the rule.
    ///
    /// The same name can be declared by several rules, the first declaration setting a
    /// field wins. Directives that can't be parsed are pushed to `invalid`.
    pub(crate) fn declare(
        &mut self,
        name: &str,
        rule: &RawRule,
        invalid: &mut Vec<String>,
    ) -> NodeTypeId {
        let id = self.register_or_lookup(name);
        if !rule.has_metadata() {
            return id;
        }

        let node_type = &mut self.types[id.local as usize];
        if node_type.tag.is_none() {
            node_type.tag = rule.tag.clone();
        }
        if let Some(fold) = &rule.fold {
            match FoldDirective::parse(fold) {
                Some(directive) if node_type.fold.is_none() => node_type.fold = Some(directive),
                Some(_) => {}
                None => invalid.push(fold.clone()),
            }
        }
        if let Some(indent) = &rule.indent {
            match IndentDirective::parse(indent) {
                Some(directive) if node_type.indent.is_none() => {
                    node_type.indent = Some(directive)
                }
                Some(_) => {}
                None => invalid.push(indent.clone()),
            }
        }
        if node_type.opened_by.is_empty() {
            node_type.opened_by = rule.opened_by.clone();
        }
        if node_type.closed_by.is_empty() {
            node_type.closed_by = rule.closed_by.clone();
        }
        if node_type.groups.is_empty() {
            node_type.groups = rule.group.clone();
        }
        id
    }

    pub fn get(&self, id: NodeTypeId) -> Option<&NodeType> {
        if id.grammar != self.grammar {
            return None;
        }
        self.types.get(id.local as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&NodeType> {
        self.by_name
            .get(name)
            .and_then(|local| self.types.get(*local as usize))
    }

    /// All node types, in id order
    pub fn iter(&self) -> impl Iterator<Item = &NodeType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
