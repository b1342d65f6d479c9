//! Grammar-driven syntax trees.
//!
//! TextMate-style JSON grammars are compiled and linked in a [`Registry`], which gives a
//! [`Parser`] per language. Parsing never fails: text no rule matches ends up in error
//! nodes and the resulting [`SyntaxTree`] always covers the whole input.
//!
//! ```no_run
//! use scopetree::Registry;
//!
//! let mut registry = Registry::default();
//! registry.add_grammar_from_path("grammars/json.json").unwrap();
//! registry.link().unwrap();
//! let tree = registry.parser("json").unwrap().parse(r#"{"a": [1, 2]}"#);
//! print!("{tree}");
//! ```

mod error;
pub mod grammars;
mod highlight;
mod markdown_fence;
pub mod node_types;
mod parser;
mod registry;
mod tokenizer;
mod tree;

#[cfg(test)]
mod test_utils;

pub use error::{CompileError, Error, ScopeTreeResult};
pub use grammars::{CompiledGrammar, GrammarId, RawGrammar};
pub use highlight::{HighlightSpan, MergingOptions, highlights};
pub use markdown_fence::{ParsedFence, parse_markdown_fence};
pub use node_types::{FoldDirective, IndentDirective, NodeType, NodeTypeId, NodeTypeRegistry};
pub use parser::{Edit, MAX_EMBED_DEPTH, Parser};
pub use registry::Registry;
pub use tokenizer::{EventSink, ScanEvent, Token};
pub use tree::{
    IndentContext, MAX_TEXT_LEN, NodeRecord, NodeRef, SyntaxTree, TreeCursor, TreeDefect,
};
