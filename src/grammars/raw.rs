use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use crate::error::ScopeTreeResult;

/// Capture groups of a `match`, `begin` or `end` pattern, keyed by group index.
///
/// # Examples
/// ```json
/// {
///   "1": { "name": "entity.name.tag" },
///   "2": { "name": "string.inline", "patterns": [{ "include": "#escape" }] }
/// }
/// ```
///
/// Keys that are not integers are ignored, like vscode-textmate does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures(pub BTreeMap<usize, RawRule>);

impl Captures {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &usize> {
        self.0.keys()
    }
}

impl<'de> Deserialize<'de> for Captures {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CapturesVisitor;

        impl<'de> Visitor<'de> for CapturesVisitor {
            type Value = Captures;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of capture index to rule")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = BTreeMap::new();
                while let Some((key, rule)) = map.next_entry::<String, RawRule>()? {
                    if let Ok(idx) = key.trim().parse::<usize>() {
                        out.insert(idx, rule);
                    }
                }
                Ok(Captures(out))
            }

            // Some grammars use an array, index in the array being the group
            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut out = BTreeMap::new();
                let mut idx = 0;
                while let Some(rule) = seq.next_element::<RawRule>()? {
                    out.insert(idx, rule);
                    idx += 1;
                }
                Ok(Captures(out))
            }
        }

        deserializer.deserialize_any(CapturesVisitor)
    }
}

/// `applyEndPatternLast` is written as either `1` or `true` depending on the grammar
fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoolOrInt;

    impl Visitor<'_> for BoolOrInt {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean or an integer")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            Ok(v != 0)
        }
    }

    deserializer.deserialize_any(BoolOrInt)
}

/// Bracket and group lists accept a single string as well as a list of strings
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrSeq;

    impl<'de> Visitor<'de> for StringOrSeq {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.split_whitespace().map(ToOwned::to_owned).collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(v) = seq.next_element::<String>()? {
                out.push(v);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrSeq)
}

/// Delegates the content of a `begin`/`end` region to another grammar.
///
/// # Examples
/// ```json
/// { "languageCapture": 2 }
/// ```
///
/// ```json
/// { "language": "json" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct RawEmbed {
    /// A fixed language name, alias, scope name or file type
    #[serde(default)]
    pub language: Option<String>,
    /// Which capture of the `begin` match holds the language tag.
    /// The captured text is read as a fence info string, eg `rust,linenos`
    #[serde(default)]
    pub language_capture: Option<usize>,
}

/// A single rule of a grammar.
///
/// All rule kinds share this shape, what a rule is is decided by which fields are set:
/// - `include` set: a reference to another rule, every other field is ignored
/// - `match` set: a `Match` rule
/// - `begin` and `end` set: a `BeginEnd` region
/// - only `patterns`: a container of rules
/// - only `name`: a scope-only rule, mostly used for captures
///
/// # Examples
/// ```json
/// {
///   "name": "string.quoted.double",
///   "begin": "\"",
///   "end": "\"",
///   "singleLine": true,
///   "patterns": [{ "match": "\\\\.", "name": "constant.character.escape" }]
/// }
/// ```
///
/// ```json
/// {
///   "name": "meta.block",
///   "begin": "\\{",
///   "end": "\\}",
///   "fold": "inside",
///   "indent": "delimited(})",
///   "patterns": [{ "include": "$self" }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct RawRule {
    /// Reference to patterns to include
    /// - "#name" - reference to repository entry, innermost repository first
    /// - "source.lang" - reference to another grammar's root patterns
    /// - "source.lang#name" - reference to a repository entry in another grammar
    /// - "$self" / "$base" - reference to current grammar's root patterns
    pub include: Option<String>,
    /// Node type created for the whole match or region
    pub name: Option<String>,
    /// Node type created for the text between `begin` and `end`
    pub content_name: Option<String>,
    #[serde(rename(deserialize = "match"))]
    pub match_: Option<String>,
    /// Used for both begin and end if they don't have their own captures
    pub captures: Captures,
    pub begin: Option<String>,
    pub begin_captures: Captures,
    /// Can reference captures from begin pattern using \\1, \\2, etc.
    pub end: Option<String>,
    pub end_captures: Captures,
    pub patterns: Vec<RawRule>,
    pub repository: IndexMap<String, RawRule>,
    #[serde(deserialize_with = "bool_or_int")]
    pub apply_end_pattern_last: bool,
    /// Whether a match inside this region is allowed to cross a line break
    pub single_line: bool,
    pub embed: Option<RawEmbed>,

    // Node type metadata
    /// Highlight classification, defaults to the node name
    pub tag: Option<String>,
    /// `inside`, `past_first_line`, `offset(a,b)` or `whole`
    pub fold: Option<String>,
    /// `flat`, `continued`, `continued(pattern)`, `delimited(token)`, `add(n)` or `set(n)`
    pub indent: Option<String>,
    #[serde(deserialize_with = "string_or_seq")]
    pub opened_by: Vec<String>,
    #[serde(deserialize_with = "string_or_seq")]
    pub closed_by: Vec<String>,
    #[serde(deserialize_with = "string_or_seq")]
    pub group: Vec<String>,
}

impl RawRule {
    /// Whether this rule carries any node type metadata
    pub(crate) fn has_metadata(&self) -> bool {
        self.tag.is_some()
            || self.fold.is_some()
            || self.indent.is_some()
            || !self.opened_by.is_empty()
            || !self.closed_by.is_empty()
            || !self.group.is_empty()
    }
}

/// Top-level structure representing a complete grammar definition
///
/// # Examples
/// ```json
/// {
///   "name": "Markdown",
///   "scopeName": "text.markdown",
///   "fileTypes": ["md"],
///   "patterns": [{ "include": "#fence" }],
///   "repository": {
///     "fence": {
///       "name": "markup.fenced_code",
///       "begin": "^```([^\\n]*)\\n",
///       "end": "^```",
///       "embed": { "languageCapture": 1 }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct RawGrammar {
    /// Human-readable name of the language, used to ask for a parser
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// File extensions this grammar applies to
    /// Example: ["md", "markdown"]
    #[serde(default)]
    pub file_types: Vec<String>,
    /// Unique identifier for this grammar, also its identity in a registry
    /// Example: "source.js", "text.markdown"
    pub scope_name: String,
    /// Named rules that can be referenced by includes, in declaration order
    #[serde(default)]
    pub repository: IndexMap<String, RawRule>,
    /// Root patterns
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    /// Optional regex to identify files by their first line content
    #[serde(default)]
    pub first_line_match: Option<String>,
}

impl RawGrammar {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ScopeTreeResult<Self> {
        let file = File::open(&path)?;
        let raw_grammar = serde_json::from_reader(BufReader::new(file))?;
        Ok(raw_grammar)
    }

    pub fn load_from_str(content: &str) -> ScopeTreeResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}
