use crate::Registry;
use crate::grammars::{CompiledGrammar, GrammarId};
use crate::node_types::{NodeTypeId, NodeTypeRegistry};
use crate::tokenizer::{EventSink, ScanEvent, Scanner};
use crate::tree::{MAX_TEXT_LEN, SyntaxTree, TreeBuilder, floor_char_boundary};

/// How many languages can be embedded in each other before embedded content is left
/// as is
pub const MAX_EMBED_DEPTH: usize = 8;

/// A change made to a text: `[from, to)` of the old text was replaced by `inserted` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub from: usize,
    pub to: usize,
    pub inserted: usize,
}

/// `text` cut to at most `max` bytes on a char boundary
fn parsable_prefix(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    #[cfg(feature = "debug")]
    log::warn!(
        "[parse] text of {} bytes is too long, only the first {max} are parsed",
        text.len()
    );
    &text[..floor_char_boundary(text, max)]
}

impl Edit {
    pub fn new(from: usize, to: usize, inserted: usize) -> Self {
        Self { from, to, inserted }
    }

    /// Where a position of the old text is in the new text.
    /// Positions inside the replaced range go to the end of the inserted text.
    pub fn map_pos(&self, pos: usize) -> usize {
        if pos <= self.from {
            pos
        } else if pos >= self.to {
            pos - (self.to - self.from) + self.inserted
        } else {
            self.from + self.inserted
        }
    }

    /// Length of the text after applying `edits` in order to a text of `len` bytes,
    /// `None` if an edit doesn't fit the text it applies to
    pub fn apply_len(len: usize, edits: &[Edit]) -> Option<usize> {
        edits.iter().try_fold(len, |len, edit| {
            if edit.from > edit.to || edit.to > len {
                return None;
            }
            Some(len - (edit.to - edit.from) + edit.inserted)
        })
    }
}

/// Parses texts with one grammar of a linked [`Registry`].
///
/// A parser is cheap to create and to copy: everything it needs is owned by the registry.
#[derive(Debug, Clone, Copy)]
pub struct Parser<'r> {
    registry: &'r Registry,
    grammar_id: GrammarId,
    /// How deep in embedded languages this parser is
    depth: usize,
}

impl<'r> Parser<'r> {
    pub(crate) fn new(registry: &'r Registry, grammar_id: GrammarId, depth: usize) -> Self {
        Self {
            registry,
            grammar_id,
            depth,
        }
    }

    pub fn grammar(&self) -> &'r CompiledGrammar {
        &self.registry.grammars[self.grammar_id]
    }

    pub fn node_types(&self) -> &'r NodeTypeRegistry {
        &self.grammar().node_types
    }

    /// Sends the raw scan events for `text` to `sink`, without building a tree.
    /// Embedded regions are reported as such and not parsed.
    pub fn scan_into<S: EventSink>(&self, text: &str, sink: &mut S) {
        let text = parsable_prefix(text, MAX_TEXT_LEN);
        Scanner::new(self.grammar_id, self.registry).scan(text, sink);
    }

    pub fn scan(&self, text: &str) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        self.scan_into(text, &mut events);
        events
    }

    /// Parses the whole text.
    ///
    /// This never fails: text no rule matches and regions left open end up as error
    /// nodes in the tree. Only the first [`MAX_TEXT_LEN`] bytes of longer texts are parsed.
    pub fn parse(&self, text: &str) -> SyntaxTree {
        let text = parsable_prefix(text, MAX_TEXT_LEN);
        let mut builder = TreeBuilder::new(
            text,
            NodeTypeId::top(self.grammar_id),
            |language: &str, content: &str| self.parse_embedded(language, content),
        );
        self.scan_into(text, &mut builder);
        let tree = builder.finish(self.registry.node_types());

        #[cfg(all(debug_assertions, feature = "debug"))]
        {
            for defect in tree.validate() {
                log::error!("[parse] {}: {defect}", self.grammar().scope_name);
            }
        }

        tree
    }

    /// Parses `text` again after `edits` were applied to the text `previous` was parsed from.
    ///
    /// The new tree is always built from scratch, ids and ranges are deterministic so
    /// unchanged parts of the tree are identical to what they were in `previous`.
    pub fn reparse(&self, previous: &SyntaxTree, edits: &[Edit], text: &str) -> SyntaxTree {
        let expected = Edit::apply_len(previous.len(), edits);
        if expected != Some(text.len()) {
            #[cfg(feature = "debug")]
            log::warn!(
                "[reparse] edits give a text of {expected:?} bytes, got {}",
                text.len()
            );
        }
        self.parse(text)
    }

    fn parse_embedded(&self, language: &str, content: &str) -> Option<SyntaxTree> {
        if self.depth + 1 >= MAX_EMBED_DEPTH {
            #[cfg(feature = "debug")]
            log::warn!("[parse_embedded] too deep to embed {language}");
            return None;
        }
        let grammar_id = self.registry.grammar_id(language)?;
        Some(Parser::new(self.registry, grammar_id, self.depth + 1).parse(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{load_fixture, registry_from_json, registry_with};

    fn outline(registry: &Registry, text: &str) -> String {
        let tree = registry.parser("t").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);
        tree.to_string()
    }

    #[test]
    fn unmatched_text_is_reported_per_code_point() {
        let registry = registry_from_json(
            r#"{"name": "t", "scopeName": "source.t", "patterns": [{"match": "\\d+", "name": "number"}]}"#,
        );
        insta::assert_snapshot!(outline(&registry, "12 ab 34"), @r"
        Top [0..8]
          number [0..2]
          ErrorUnrecognized [2..3]
          ErrorUnrecognized [3..4]
          ErrorUnrecognized [4..5]
          ErrorUnrecognized [5..6]
          number [6..8]
        ");
    }

    #[test]
    fn unterminated_regions_end_with_error_incomplete() {
        let registry = registry_from_json(
            r#"{"name": "t", "scopeName": "source.t", "patterns": [{"begin": "\"", "end": "\"", "name": "string"}]}"#,
        );
        insta::assert_snapshot!(outline(&registry, "\"abc"), @r"
        Top [0..4]
          string [0..4]
            string [0..4]
            ErrorIncomplete [4..4]
        ");
    }

    #[test]
    fn end_patterns_use_the_begin_captures() {
        let registry = registry_from_json(
            r##"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{"include": "#tag"}],
              "repository": {
                "tag": {
                  "begin": "<(\\w+)>", "end": "</\\1>", "name": "tag",
                  "endCaptures": {"0": {"name": "tag.end"}},
                  "patterns": [{"include": "#tag"}]
                }
              }
            }"##,
        );
        let text = "<a>x</a>";
        let tree = registry.parser("t").unwrap().parse(text);
        let tag = tree.root().first_child().unwrap();
        assert_eq!(tag.name(), "tag");
        assert_eq!(tag.range(), 0..8);
        assert_eq!(tree.find_all("tag.end").next().unwrap().text(text), "</a>");

        // `</b>` doesn't close `<a>`
        insta::assert_snapshot!(outline(&registry, "<a><b></a></b>"), @r"
        Top [0..14]
          tag [0..14]
            tag [0..3]
            tag [3..14]
              tag [3..10]
              tag.end [10..14]
            ErrorIncomplete [14..14]
        ");
    }

    #[test]
    fn earlier_rules_win_ties() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [
                {"match": "if", "name": "keyword"},
                {"match": "\\w+", "name": "identifier"}
              ]
            }"#,
        );
        insta::assert_snapshot!(outline(&registry, "iffy"), @r"
        Top [0..4]
          keyword [0..2]
          identifier [2..4]
        ");
    }

    #[test]
    fn end_pattern_last_lets_content_win_ties() {
        let json = |last: bool| {
            format!(
                r#"{{
                  "name": "t",
                  "scopeName": "source.t",
                  "patterns": [{{
                    "begin": "<", "end": ">", "name": "angle", "applyEndPatternLast": {last},
                    "patterns": [{{"match": ">", "name": "inner"}}]
                  }}]
                }}"#
            )
        };
        let text = "<>";
        let first = registry_from_json(&json(false));
        let tree = first.parser("t").unwrap().parse(text);
        assert_eq!(tree.find_all("inner").count(), 0);

        let last = registry_from_json(&json(true));
        let tree = last.parser("t").unwrap().parse(text);
        assert_eq!(tree.find_all("inner").count(), 1);
        assert_eq!(tree.find_all("ErrorIncomplete").count(), 1);
    }

    #[test]
    fn content_names_wrap_the_region_content() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "begin": "\\(", "end": "\\)", "name": "paren", "contentName": "paren.content",
                "patterns": [{"match": "\\d", "name": "digit"}]
              }]
            }"#,
        );
        insta::assert_snapshot!(outline(&registry, "(1 2)"), @r"
        Top [0..5]
          paren [0..5]
            paren [0..1]
            paren.content [1..4]
              digit [1..2]
              paren.content [2..3]
              digit [3..4]
            paren [4..5]
        ");
    }

    #[test]
    fn anchors_only_match_after_the_begin() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "begin": "@", "end": "$", "name": "directive",
                "patterns": [{"match": "\\G\\w+", "name": "directive.name"}, {"match": "\\w+", "name": "argument"}]
              }]
            }"#,
        );
        let text = "@set x";
        let tree = registry.parser("t").unwrap().parse(text);
        let names: Vec<_> = tree.find_all("directive.name").map(|n| n.text(text)).collect();
        let arguments: Vec<_> = tree.find_all("argument").map(|n| n.text(text)).collect();
        assert_eq!(names, vec!["set"]);
        assert_eq!(arguments, vec!["x"]);
    }

    #[test]
    fn long_texts_are_cut_on_char_boundaries() {
        assert_eq!(parsable_prefix("abc", 3), "abc");
        assert_eq!(parsable_prefix("abcd", 3), "abc");
        // `é` is 1..3
        assert_eq!(parsable_prefix("aéb", 2), "a");
        assert_eq!(parsable_prefix("aéb", 3), "aé");
    }

    #[test]
    fn regions_nest_inside_themselves() {
        fn depth_of(tree: &SyntaxTree, leaf: &str, text: &str, region: &str) -> usize {
            let leaf = tree
                .leaves()
                .find(|l| l.text(text) == leaf)
                .unwrap();
            leaf.ancestors().filter(|a| a.name() == region).count()
        }

        let registry = registry_with(&["blocks", "json"]);
        let text = "{ { 1 } }";
        let tree = registry.parser("blocks").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);
        assert!(tree.leaves().all(|leaf| !leaf.is_error()));
        assert_eq!(depth_of(&tree, "1", text, "meta.block"), 2);
        let blocks: Vec<_> = tree.find_all("meta.block").map(|n| n.range()).collect();
        assert_eq!(blocks, vec![0..9, 2..7]);

        let text = r#"{"a":{"b":[[1]]}}"#;
        let tree = registry.parser("json").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);
        assert!(tree.leaves().all(|leaf| !leaf.is_error()));
        assert_eq!(depth_of(&tree, "1", text, "meta.structure.dictionary"), 2);
        assert_eq!(depth_of(&tree, "1", text, "meta.structure.array"), 2);
    }

    #[test]
    fn single_line_regions_cross_line_breaks_with_newlines() {
        let registry = registry_with(&["blocks"]);
        let text = "\"a\nb\"";
        let tree = registry.parser("blocks").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);
        let string = tree.root().first_child().unwrap();
        assert_eq!(string.name(), "string.quoted.double");
        assert_eq!(string.range(), 0..5);
        assert!(string.children().any(|c| c.name() == "Newline" && c.range() == (2..3)));
    }

    #[test]
    fn embedded_languages_use_their_own_node_types() {
        let registry = registry_with(&["fenced", "json"]);
        let fenced = registry.grammar_id("fenced").unwrap();
        let json = registry.grammar_id("json").unwrap();
        let text = "# Title\n```json\n{\"a\": [1]}\n```\n";
        let tree = registry.parser("fenced").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);

        let fence = tree.find_all("markup.fenced_code").next().unwrap();
        assert_eq!(fence.kind().grammar, fenced);
        let object = tree.find_all("meta.structure.dictionary").next().unwrap();
        assert_eq!(object.kind().grammar, json);
        assert_eq!(object.text(text), "{\"a\": [1]}");
        let embedded_root = object.parent().unwrap();
        assert_eq!(embedded_root.kind(), NodeTypeId::top(json));
        assert_eq!(embedded_root.parent(), Some(fence));

        insta::assert_snapshot!(tree.to_string(), @r#"
        Top [0..31]
          markup.heading [0..7]
          Newline [7..8]
          markup.fenced_code [8..30]
            punctuation.fence.begin [8..16]
              punctuation.fence.begin [8..11]
              fence.info [11..15]
              punctuation.fence.begin [15..16]
            Top [16..27]
              meta.structure.dictionary [16..26]
                punctuation.definition.dictionary.begin [16..17]
                string.quoted.double [17..20]
                punctuation.separator.dictionary.key-value [20..21]
                meta.structure.dictionary [21..22]
                meta.structure.array [22..25]
                  punctuation.definition.array.begin [22..23]
                  constant.numeric [23..24]
                  punctuation.definition.array.end [24..25]
                punctuation.definition.dictionary.end [25..26]
              Newline [26..27]
            punctuation.fence.end [27..30]
          Newline [30..31]
        "#);
    }

    #[test]
    fn unknown_embedded_languages_stay_plain_content() {
        let registry = registry_with(&["fenced", "json"]);
        let text = "```cobol\nMOVE A\n```";
        let tree = registry.parser("fenced").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);
        let fence = tree.find_all("markup.fenced_code").next().unwrap();
        assert!(fence.children().all(|c| !c.kind().is_top()));
        assert!(fence.children().any(|c| c.text(text) == "MOVE A\n"));
    }

    #[test]
    fn includes_of_other_grammars_are_followed() {
        let registry = registry_with(&["fenced", "json"]);
        let json = registry.grammar_id("json").unwrap();
        let text = "~~~\n[true]\n~~~";
        let tree = registry.parser("fenced").unwrap().parse(text);
        assert_eq!(tree.validate(), vec![]);
        let array = tree.find_all("meta.structure.array").next().unwrap();
        assert_eq!(array.kind().grammar, json);
        assert_eq!(array.parent().unwrap().name(), "markup.json_block");
    }

    #[test]
    fn embedding_depth_is_bounded() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{"begin": "<", "end": "[^\\s\\S]", "name": "nest", "embed": {"language": "t"}}]
            }"#,
        );
        let text = "<".repeat(20);
        let tree = registry.parser("t").unwrap().parse(&text);
        assert_eq!(tree.validate(), vec![]);
        assert_eq!(tree.find_all("Top").count(), MAX_EMBED_DEPTH);
    }

    #[test]
    fn parsing_is_deterministic() {
        let registry = registry_with(&["blocks"]);
        let other = registry_with(&["blocks"]);
        let text = "{ [1, 2.5] /* c\n */ \"s\\\"\" } ]";
        let a = registry.parser("blocks").unwrap().parse(text);
        let b = registry.parser("blocks").unwrap().parse(text);
        let c = other.parser("blocks").unwrap().parse(text);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.records(), c.records());
    }

    #[test]
    fn node_type_ids_are_stable() {
        let a = registry_with(&["json", "blocks"]);
        let b = registry_with(&["json", "blocks"]);
        let blocks = a.grammar_id("blocks").unwrap();
        let pa = a.parser("blocks").unwrap();
        let pb = b.parser("blocks").unwrap();
        assert_eq!(pa.node_types(), pb.node_types());
        assert_eq!(pa.node_types().grammar(), blocks);
        assert_eq!(
            CompiledGrammar::from_raw_grammar(load_fixture("blocks"), blocks)
                .unwrap()
                .node_types
                .as_ref(),
            pa.node_types()
        );
    }

    #[test]
    fn maps_positions_through_edits() {
        let edit = Edit::new(2, 5, 1);
        assert_eq!(edit.map_pos(1), 1);
        assert_eq!(edit.map_pos(2), 2);
        assert_eq!(edit.map_pos(3), 3);
        assert_eq!(edit.map_pos(5), 3);
        assert_eq!(edit.map_pos(9), 7);
        assert_eq!(Edit::apply_len(10, &[edit, Edit::new(0, 0, 4)]), Some(12));
        assert_eq!(Edit::apply_len(3, &[edit]), None);
    }

    #[test]
    fn reparse_gives_the_same_tree_as_parse() {
        let registry = registry_with(&["blocks"]);
        let parser = registry.parser("blocks").unwrap();
        let before = "{ 1 }";
        let after = "{ [12] }";
        let previous = parser.parse(before);
        let tree = parser.reparse(&previous, &[Edit::new(2, 3, 4)], after);
        assert_eq!(tree, parser.parse(after));
        assert_eq!(tree.len(), after.len());
    }

    #[test]
    fn raw_events_cover_the_text() {
        let registry = registry_with(&["blocks"]);
        let events = registry.parser("blocks").unwrap().scan("[1]");
        assert!(matches!(events.first(), Some(ScanEvent::Push { at: 0, .. })));
        assert!(matches!(events.last(), Some(ScanEvent::Pop { at: 3 })));
    }

    mod properties {
        use proptest::prelude::*;

        use crate::test_utils::registry_with;

        fn check(grammar: &str, text: &str) {
            let registry = registry_with(&[grammar]);
            let parser = registry.parser(grammar).unwrap();
            let tree = parser.parse(text);
            assert_eq!(tree.len(), text.len());
            assert_eq!(tree.validate(), vec![]);
            assert_eq!(tree, parser.parse(text));
        }

        proptest! {
            #[test]
            fn any_text_gives_a_valid_tree(text in "\\PC{0,64}") {
                check("blocks", &text);
            }

            #[test]
            fn bracket_soup_gives_a_valid_tree(text in "[{}\\[\\]\"/* 0-9\\\\\n\r]{0,64}") {
                check("blocks", &text);
            }

            #[test]
            fn zero_width_rules_always_advance(text in "[abcx<>\n ]{0,48}") {
                check("pathological", &text);
            }

            #[test]
            fn fences_give_a_valid_tree(text in "(```(json|x)?\n|~~~\n|[{}\\[\\]:,\"0-9a ]|\n){0,24}") {
                let registry = registry_with(&["fenced", "json"]);
                let tree = registry.parser("fenced").unwrap().parse(&text);
                prop_assert_eq!(tree.len(), text.len());
                prop_assert_eq!(tree.validate(), vec![]);
            }
        }
    }
}
