//! The scanning engine, following the matching rules of <https://github.com/microsoft/vscode-textmate>
//! but scanning the whole text at once instead of line by line.
//!
//! It emits a stream of [`ScanEvent`] covering every byte of the input exactly once,
//! which the tree builder turns into a syntax tree.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use onig::{Region, SearchOptions};

use crate::Registry;
use crate::grammars::{
    BeginEnd, CompiledGrammar, EmbedLanguage, GlobalRuleRef, GrammarId, Match, PatternSet,
    PatternSetMatch, Regex, Rule, RuleId, resolve_backreferences,
};
use crate::markdown_fence::parse_markdown_fence;
use crate::node_types::NodeTypeId;

mod anchors;
mod stack;

pub use anchors::AnchorActive;
pub use stack::{ScanState, StackFrame};

/// How many captures with patterns can be re-scanned inside each other
const MAX_CAPTURE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte span within the text (start inclusive, end exclusive, 0-based)
    pub span: Range<usize>,
    pub kind: NodeTypeId,
}

/// What the scanner produces, in text order.
///
/// `Push` and `Pop` open and close interior nodes, a `Token` is always a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Push { kind: NodeTypeId, at: usize },
    Token(Token),
    Pop { at: usize },
    /// A range whose content belongs to another language
    Embed { language: String, range: Range<usize> },
}

pub trait EventSink {
    fn event(&mut self, event: ScanEvent);
}

impl EventSink for Vec<ScanEvent> {
    fn event(&mut self, event: ScanEvent) {
        self.push(event);
    }
}

/// Small wrapper so we only produce valid tokens: every byte before `last_end` has been
/// emitted exactly once, and anything not claimed by a more specific node becomes a
/// token of the innermost open node.
struct Emitter<'s, S> {
    sink: &'s mut S,
    /// Position up to which tokens have been generated
    /// (start of next token to be produced)
    last_end: usize,
    top: NodeTypeId,
    /// Kinds of the nodes currently opened by the scanner, innermost last
    open: Vec<NodeTypeId>,
}

impl<'s, S: EventSink> Emitter<'s, S> {
    fn new(sink: &'s mut S, top: NodeTypeId) -> Self {
        Self {
            sink,
            last_end: 0,
            top,
            open: Vec::new(),
        }
    }

    fn current_kind(&self) -> NodeTypeId {
        self.open.last().copied().unwrap_or(self.top)
    }

    fn in_named_node(&self) -> bool {
        !self.open.is_empty()
    }

    fn produce(&mut self, end: usize) {
        // Skip empty tokens (can happen with zero-width matches)
        if self.last_end >= end {
            return;
        }

        #[cfg(feature = "debug")]
        log::trace!(
            "[produce]: [{}..{end}] {:?}",
            self.last_end,
            self.current_kind()
        );
        self.sink.event(ScanEvent::Token(Token {
            span: self.last_end..end,
            kind: self.current_kind(),
        }));
        self.last_end = end;
    }

    fn open(&mut self, at: usize, kind: NodeTypeId) {
        self.produce(at);
        let at = at.max(self.last_end);
        self.sink.event(ScanEvent::Push { kind, at });
        self.open.push(kind);
    }

    fn close(&mut self, at: usize) {
        self.produce(at);
        let at = at.max(self.last_end);
        self.sink.event(ScanEvent::Pop { at });
        self.open.pop();
    }

    fn leaf(&mut self, span: Range<usize>, kind: NodeTypeId) {
        self.produce(span.start);
        self.last_end = self.last_end.max(span.end);
        self.sink.event(ScanEvent::Token(Token { span, kind }));
    }

    fn embed(&mut self, language: &str, range: Range<usize>) {
        self.produce(range.start);
        self.last_end = self.last_end.max(range.end);
        self.sink.event(ScanEvent::Embed {
            language: language.to_owned(),
            range,
        });
    }
}

#[derive(Debug)]
pub(crate) struct Scanner<'g> {
    /// The grammar we start from, also the namespace of the reserved node types
    base_grammar_id: GrammarId,
    /// All the grammars in the registry
    registry: &'g Registry,
    /// Runtime pattern cache by rule and whether `\G` can match
    pattern_cache: HashMap<(GlobalRuleRef, AnchorActive), PatternSet>,
    capture_depth: usize,
}

impl<'g> Scanner<'g> {
    pub fn new(base_grammar_id: GrammarId, registry: &'g Registry) -> Self {
        Self {
            base_grammar_id,
            registry,
            pattern_cache: HashMap::new(),
            capture_depth: 0,
        }
    }

    /// Scans the whole text, sending events to `sink`.
    /// Regions still open at the end of the text get an `ErrorIncomplete` leaf.
    pub fn scan<S: EventSink>(&mut self, text: &str, sink: &mut S) {
        let mut out = Emitter::new(sink, NodeTypeId::top(self.base_grammar_id));
        let mut state = ScanState::new(GlobalRuleRef::root(self.base_grammar_id));

        self.scan_until(&mut state, text, text.len(), &mut out);
        self.close_open_frames(&mut state, 1, text.len(), &mut out);
        out.produce(text.len());
    }

    fn grammar(&self, id: GrammarId) -> &'g CompiledGrammar {
        let registry: &'g Registry = self.registry;
        &registry.grammars[id]
    }

    fn rule(&self, rule_ref: GlobalRuleRef) -> &'g Rule {
        &self.grammar(rule_ref.grammar).rules[rule_ref.rule]
    }

    fn build_pattern_set(&self, rule_ref: GlobalRuleRef, anchor: AnchorActive) -> PatternSet {
        let patterns: Vec<_> = self
            .grammar(rule_ref.grammar)
            .candidates(rule_ref.rule)
            .iter()
            .filter_map(|candidate| {
                let re = self
                    .grammar(candidate.grammar)
                    .candidate_pattern(candidate.rule)?;
                Some((*candidate, anchor.replace_anchors(re.pattern()).into_owned()))
            })
            .collect();

        match PatternSet::new(patterns) {
            Ok(set) => set,
            Err(_err) => {
                // every pattern compiled on its own when the grammar was compiled
                #[cfg(feature = "debug")]
                log::warn!("[build_pattern_set] {rule_ref:?}: {_err}");
                PatternSet::empty()
            }
        }
    }

    /// Finds the first candidate matching at or after `pos`
    fn find_candidate(
        &mut self,
        top: &StackFrame,
        haystack: &str,
        pos: usize,
    ) -> Option<PatternSetMatch> {
        let key = (top.rule_ref, AnchorActive::new(top.anchor, pos));
        if !self.pattern_cache.contains_key(&key) {
            let set = self.build_pattern_set(key.0, key.1);
            #[cfg(feature = "debug")]
            log::debug!("[find_candidate] Active patterns for {:?}: {set:?}", key.0);
            self.pattern_cache.insert(key, set);
        }
        self.pattern_cache[&key].find_at(haystack, pos)
    }

    /// Finds where the region on top of the stack ends
    fn find_end(&self, top: &StackFrame, haystack: &str, pos: usize) -> Option<PatternSetMatch> {
        let Rule::BeginEnd(b) = self.rule(top.rule_ref) else {
            return None;
        };
        let re = top
            .end_pattern
            .as_ref()
            .unwrap_or(&self.grammar(top.rule_ref.grammar).regexes[b.end]);
        // An end pattern whose resolved backreferences don't compile never matches
        let compiled = re.compiled(AnchorActive::new(top.anchor, pos))?;

        let mut region = Region::new();
        compiled.search_with_options(
            haystack,
            pos,
            haystack.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;
        let (start, end) = region.pos(0)?;

        Some(PatternSetMatch {
            rule_ref: top.rule_ref,
            start,
            end,
            capture_pos: (0..region.len()).map(|i| region.pos(i)).collect(),
        })
    }

    fn scan_until<S: EventSink>(
        &mut self,
        state: &mut ScanState,
        text: &str,
        limit: usize,
        out: &mut Emitter<'_, S>,
    ) {
        // Stacks we've been in at the current offset. A transition that doesn't consume
        // anything is only allowed if it leads somewhere new.
        let mut seen: HashSet<Vec<GlobalRuleRef>> = HashSet::new();
        let mut seen_at = None;

        loop {
            let pos = state.offset;
            if seen_at != Some(pos) {
                seen.clear();
                seen_at = Some(pos);
            }
            seen.insert(state.key());

            let top = state.top();
            let bound = if top.line_bound {
                line_end(text, pos, limit)
            } else {
                limit
            };
            let haystack = &text[..bound];

            #[cfg(feature = "debug")]
            log::trace!("[scan_until] Scanning {pos}: |{:?}|", &haystack[pos..]);

            let end_match = self.find_end(top, haystack, pos);
            // Nothing but the end of the region can happen at a line or text end
            let candidate = if pos < bound && top.embed.is_none() {
                self.find_candidate(top, haystack, pos)
            } else {
                None
            };
            let apply_end_last = matches!(
                self.rule(top.rule_ref),
                Rule::BeginEnd(BeginEnd {
                    apply_end_pattern_last: true,
                    ..
                })
            );

            let (is_end, m) = match (end_match, candidate) {
                (None, None) => {
                    #[cfg(feature = "debug")]
                    log::debug!("[scan_until] no more matches before {bound}");
                    self.emit_gap(state, pos, bound, text, out);
                    state.offset = bound;
                    if bound < limit {
                        self.cross_line_break(state, text, limit, out);
                        continue;
                    }
                    break;
                }
                (Some(end), None) => (true, end),
                (None, Some(found)) => (false, found),
                (Some(end), Some(found)) => {
                    if found.start < end.start || (found.start == end.start && apply_end_last) {
                        (false, found)
                    } else {
                        (true, end)
                    }
                }
            };

            #[cfg(feature = "debug")]
            log::debug!(
                "[scan_until] Matched {:?} (end: {is_end}) from {} to {} => {:?}",
                m.rule_ref,
                m.start,
                m.end,
                &text[m.start..m.end]
            );

            self.emit_gap(state, pos, m.start, text, out);
            if m.start != pos {
                state.offset = m.start;
                seen.clear();
                seen_at = Some(m.start);
                seen.insert(state.key());
            }
            let zero_width = m.start == m.end;

            if is_end {
                if zero_width {
                    let mut key = state.key();
                    key.pop();
                    if seen.contains(&key) {
                        if !self.force_advance(state, text, bound, limit, out) {
                            break;
                        }
                        continue;
                    }
                }
                self.pop_region(state, &m, text, out);
                continue;
            }

            match self.rule(m.rule_ref) {
                Rule::Match(rule) if !zero_width => {
                    self.emit_match(state, m.rule_ref.grammar, rule, &m, text, out);
                }
                Rule::BeginEnd(rule) => {
                    if zero_width {
                        let mut key = state.key();
                        key.push(m.rule_ref);
                        if state.entered_at(m.rule_ref, m.start) || seen.contains(&key) {
                            #[cfg(feature = "debug")]
                            log::warn!("Region {:?} pushed without advancing", m.rule_ref);
                            if !self.force_advance(state, text, bound, limit, out) {
                                break;
                            }
                            continue;
                        }
                    }
                    self.push_region(state, m.rule_ref, rule, &m, text, out);
                }
                // A match that doesn't consume anything can't make progress
                _ => {
                    #[cfg(feature = "debug")]
                    log::warn!("Match rule {:?} didn't advance", m.rule_ref);
                    if !self.force_advance(state, text, bound, limit, out) {
                        break;
                    }
                }
            }
        }
    }

    /// Emits text that no rule matched.
    ///
    /// Inside a named node it's part of that node, inside an embedded region it goes to
    /// the other language. Otherwise every code point is an error, line breaks excepted.
    fn emit_gap<S: EventSink>(
        &self,
        state: &ScanState,
        from: usize,
        to: usize,
        text: &str,
        out: &mut Emitter<'_, S>,
    ) {
        if from >= to {
            return;
        }
        if let Some(language) = &state.top().embed {
            out.embed(language, from..to);
            return;
        }
        if out.in_named_node() {
            out.produce(to);
            return;
        }

        let grammar = self.base_grammar_id;
        let mut chars = text[from..to].char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let start = from + i;
            match c {
                '\r' if chars.peek().is_some_and(|(_, next)| *next == '\n') => {
                    chars.next();
                    out.leaf(start..start + 2, NodeTypeId::newline(grammar));
                }
                '\n' | '\r' => out.leaf(start..start + 1, NodeTypeId::newline(grammar)),
                _ => out.leaf(
                    start..start + c.len_utf8(),
                    NodeTypeId::error_unrecognized(grammar),
                ),
            }
        }
    }

    /// Moves over the line break at the current offset, in a region that can't span lines
    fn cross_line_break<S: EventSink>(
        &self,
        state: &mut ScanState,
        text: &str,
        limit: usize,
        out: &mut Emitter<'_, S>,
    ) {
        let pos = state.offset;
        let end = if text[pos..].starts_with("\r\n") {
            pos + 2
        } else {
            pos + 1
        };
        let end = end.min(limit);
        out.leaf(pos..end, NodeTypeId::newline(self.base_grammar_id));
        state.offset = end;
    }

    /// Consumes one code point as an error when the grammar would otherwise not advance.
    /// Returns false when there is nothing left to consume.
    fn force_advance<S: EventSink>(
        &self,
        state: &mut ScanState,
        text: &str,
        bound: usize,
        limit: usize,
        out: &mut Emitter<'_, S>,
    ) -> bool {
        let pos = state.offset;
        if pos < bound {
            let len = text[pos..].chars().next().map_or(1, char::len_utf8);
            out.leaf(
                pos..pos + len,
                NodeTypeId::error_unrecognized(self.base_grammar_id),
            );
            state.offset = pos + len;
            true
        } else if bound < limit {
            self.cross_line_break(state, text, limit, out);
            true
        } else {
            false
        }
    }

    fn emit_match<S: EventSink>(
        &mut self,
        state: &mut ScanState,
        grammar: GrammarId,
        rule: &Match,
        m: &PatternSetMatch,
        text: &str,
        out: &mut Emitter<'_, S>,
    ) {
        if let Some(kind) = rule.node_type {
            out.open(m.start, kind);
        }
        self.emit_captures(
            state,
            grammar,
            &rule.captures,
            &m.capture_pos,
            m.start..m.end,
            text,
            out,
        );
        out.produce(m.end);
        if rule.node_type.is_some() {
            out.close(m.end);
        }
        state.offset = m.end;
    }

    fn push_region<S: EventSink>(
        &mut self,
        state: &mut ScanState,
        rule_ref: GlobalRuleRef,
        rule: &BeginEnd,
        m: &PatternSetMatch,
        text: &str,
        out: &mut Emitter<'_, S>,
    ) {
        #[cfg(feature = "debug")]
        log::debug!("[push_region] Pushing {rule_ref:?} at {}", m.start);

        if let Some(kind) = rule.node_type {
            out.open(m.start, kind);
        }
        self.emit_captures(
            state,
            rule_ref.grammar,
            &rule.begin_captures,
            &m.capture_pos,
            m.start..m.end,
            text,
            out,
        );
        out.produce(m.end);
        if let Some(kind) = rule.content_node_type {
            out.open(m.end, kind);
        }

        let end_pattern = if rule.end_has_backrefs {
            let template = &self.grammar(rule_ref.grammar).regexes[rule.end];
            Some(Regex::new(resolve_backreferences(
                template.pattern(),
                text,
                &m.capture_pos,
            )))
        } else {
            None
        };

        let embed = rule.embed.as_ref().map(|embed| match embed {
            EmbedLanguage::Fixed(language) => language.clone(),
            EmbedLanguage::Capture(index) => m
                .capture_pos
                .get(*index)
                .copied()
                .flatten()
                .and_then(|(start, end)| text.get(start..end))
                .map(|info| parse_markdown_fence(info).lang.to_owned())
                .unwrap_or_default(),
        });

        let line_bound = rule.single_line || state.top().line_bound;
        state.push(StackFrame {
            rule_ref,
            start: m.start,
            anchor: Some(m.end),
            end_pattern,
            has_name_node: rule.node_type.is_some(),
            has_content_node: rule.content_node_type.is_some(),
            line_bound,
            embed,
        });
        state.offset = m.end;
    }

    fn pop_region<S: EventSink>(
        &mut self,
        state: &mut ScanState,
        m: &PatternSetMatch,
        text: &str,
        out: &mut Emitter<'_, S>,
    ) {
        let Some(frame) = state.pop() else {
            return;
        };
        #[cfg(feature = "debug")]
        log::debug!("[pop_region] Popping {:?} at {}", frame.rule_ref, m.end);

        if frame.has_content_node {
            out.close(m.start);
        }
        if let Rule::BeginEnd(rule) = self.rule(frame.rule_ref) {
            self.emit_captures(
                state,
                frame.rule_ref.grammar,
                &rule.end_captures,
                &m.capture_pos,
                m.start..m.end,
                text,
                out,
            );
        }
        out.produce(m.end);
        if frame.has_name_node {
            out.close(m.end);
        }
        state.offset = m.end;
    }

    /// Closes every frame above `keep`, innermost first, at `at`
    fn close_open_frames<S: EventSink>(
        &self,
        state: &mut ScanState,
        keep: usize,
        at: usize,
        out: &mut Emitter<'_, S>,
    ) {
        while state.depth() > keep {
            let Some(frame) = state.pop() else {
                break;
            };
            #[cfg(feature = "debug")]
            log::debug!("[close_open_frames] {:?} still open at {at}", frame.rule_ref);
            out.leaf(at..at, NodeTypeId::error_incomplete(self.base_grammar_id));
            if frame.has_content_node {
                out.close(at);
            }
            if frame.has_name_node {
                out.close(at);
            }
        }
    }

    /// Emits the capture nodes of a match.
    ///
    /// Captures are nested by position: a group inside another one becomes its child.
    /// Captures with patterns have their text scanned again with those patterns.
    #[allow(clippy::too_many_arguments)]
    fn emit_captures<S: EventSink>(
        &mut self,
        state: &ScanState,
        grammar: GrammarId,
        rule_captures: &[Option<RuleId>],
        captures: &[Option<(usize, usize)>],
        bounds: Range<usize>,
        text: &str,
        out: &mut Emitter<'_, S>,
    ) {
        if rule_captures.is_empty() {
            return;
        }

        // end positions of the capture nodes currently open
        let mut local_stack: Vec<usize> = Vec::with_capacity(2);

        for (i, rule_id) in rule_captures.iter().enumerate() {
            let Some(rule_id) = rule_id else {
                continue;
            };
            let Some(Some((start, end))) = captures.get(i) else {
                continue;
            };

            // pop captures while needed
            while let Some(&open_end) = local_stack.last()
                && open_end <= *start
            {
                out.close(open_end);
                local_stack.pop();
            }

            // Lookarounds can capture outside the match and groups can overlap,
            // only keep what fits
            let cap_start = (*start).max(bounds.start).max(out.last_end);
            let mut cap_end = (*end).min(bounds.end);
            if let Some(&open_end) = local_stack.last() {
                cap_end = cap_end.min(open_end);
            }
            // Nothing captured
            if cap_start >= cap_end {
                continue;
            }

            let rule_ref = GlobalRuleRef {
                grammar,
                rule: *rule_id,
            };
            let rule = self.rule(rule_ref);

            if let Rule::IncludeOnly(include) = rule
                && !self.grammar(grammar).candidates(*rule_id).is_empty()
                && self.capture_depth < MAX_CAPTURE_DEPTH
            {
                #[cfg(feature = "debug")]
                log::debug!(
                    "[emit_captures] Scanning capture {i} again at [{cap_start}..{cap_end}]: {:?}",
                    &text[cap_start..cap_end]
                );
                match include.node_type {
                    Some(kind) => out.open(cap_start, kind),
                    None => out.produce(cap_start),
                }
                let mut nested = state.for_capture(rule_ref, cap_start);
                let keep = nested.depth();
                self.capture_depth += 1;
                self.scan_until(&mut nested, text, cap_end, out);
                self.capture_depth -= 1;
                self.close_open_frames(&mut nested, keep, cap_end, out);
                out.produce(cap_end);
                if include.node_type.is_some() {
                    out.close(cap_end);
                }
                continue;
            }

            if let Some(kind) = rule.node_type() {
                out.open(cap_start, kind);
                local_stack.push(cap_end);
            }
        }

        while let Some(end) = local_stack.pop() {
            out.close(end);
        }
    }
}

/// Start of the next line break at or after `pos`, or `limit`
fn line_end(text: &str, pos: usize, limit: usize) -> usize {
    text[pos..limit]
        .find(|c| c == '\n' || c == '\r')
        .map_or(limit, |i| pos + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::registry_from_json;

    fn events(registry: &Registry, text: &str) -> Vec<ScanEvent> {
        let mut out = Vec::new();
        Scanner::new(GrammarId(0), registry).scan(text, &mut out);
        out
    }

    /// Makes sure the leaves cover the text exactly once, in order
    fn assert_tiles(events: &[ScanEvent], len: usize) {
        let mut expected = 0;
        for event in events {
            match event {
                ScanEvent::Token(token) => {
                    assert_eq!(token.span.start, expected, "{events:?}");
                    expected = token.span.end;
                }
                ScanEvent::Embed { range, .. } => {
                    assert_eq!(range.start, expected, "{events:?}");
                    expected = range.end;
                }
                ScanEvent::Push { at, .. } | ScanEvent::Pop { at } => {
                    assert_eq!(*at, expected, "{events:?}");
                }
            }
        }
        assert_eq!(expected, len);
    }

    fn kind(registry: &Registry, name: &str) -> NodeTypeId {
        registry.grammars[GrammarId(0)]
            .node_types
            .by_name(name)
            .unwrap()
            .id
    }

    #[test]
    fn line_end_finds_both_line_breaks() {
        assert_eq!(line_end("ab\ncd", 0, 5), 2);
        assert_eq!(line_end("ab\r\ncd", 1, 6), 2);
        assert_eq!(line_end("abcd", 1, 4), 4);
        assert_eq!(line_end("ab\ncd", 3, 5), 5);
    }

    #[test]
    fn unmatched_root_text_is_one_error_per_code_point() {
        let registry = registry_from_json(
            r#"{"name": "t", "scopeName": "source.t", "patterns": [{"match": "\\d+", "name": "number"}]}"#,
        );
        let text = "1é\n2";
        let events = events(&registry, text);
        assert_tiles(&events, text.len());
        let number = kind(&registry, "number");
        assert_eq!(
            events,
            vec![
                ScanEvent::Push { kind: number, at: 0 },
                ScanEvent::Token(Token {
                    span: 0..1,
                    kind: number
                }),
                ScanEvent::Pop { at: 1 },
                ScanEvent::Token(Token {
                    span: 1..3,
                    kind: NodeTypeId::error_unrecognized(GrammarId(0))
                }),
                ScanEvent::Token(Token {
                    span: 3..4,
                    kind: NodeTypeId::newline(GrammarId(0))
                }),
                ScanEvent::Push { kind: number, at: 4 },
                ScanEvent::Token(Token {
                    span: 4..5,
                    kind: number
                }),
                ScanEvent::Pop { at: 5 },
            ]
        );
    }

    #[test]
    fn zero_width_matches_are_forced_forward() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [
                {"match": "(?=a)", "name": "nothing"},
                {"begin": "(?=b)", "end": "(?=b)", "name": "stuck"}
              ]
            }"#,
        );
        let text = "abab";
        let events = events(&registry, text);
        assert_tiles(&events, text.len());
        let errors = events
            .iter()
            .filter(|e| {
                matches!(e, ScanEvent::Token(t) if t.kind == NodeTypeId::error_unrecognized(GrammarId(0)))
            })
            .count();
        assert!(errors >= 2, "{events:?}");
    }

    #[test]
    fn single_line_regions_emit_newlines() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{"begin": "'", "end": "'", "name": "string", "singleLine": true}]
            }"#,
        );
        let text = "'ab\ncd'";
        let events = events(&registry, text);
        assert_tiles(&events, text.len());
        assert!(events.contains(&ScanEvent::Token(Token {
            span: 3..4,
            kind: NodeTypeId::newline(GrammarId(0))
        })));
        assert_eq!(events.last(), Some(&ScanEvent::Pop { at: 7 }));
    }

    #[test]
    fn open_regions_get_error_incomplete_innermost_first() {
        let registry = registry_from_json(
            r##"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{"include": "#paren"}],
              "repository": {
                "paren": {"begin": "\\(", "end": "\\)", "name": "paren", "patterns": [{"include": "#paren"}]}
              }
            }"##,
        );
        let text = "((";
        let events = events(&registry, text);
        assert_tiles(&events, text.len());
        let incomplete = NodeTypeId::error_incomplete(GrammarId(0));
        assert_eq!(
            &events[events.len() - 4..],
            &[
                ScanEvent::Token(Token {
                    span: 2..2,
                    kind: incomplete
                }),
                ScanEvent::Pop { at: 2 },
                ScanEvent::Token(Token {
                    span: 2..2,
                    kind: incomplete
                }),
                ScanEvent::Pop { at: 2 },
            ]
        );
    }

    #[test]
    fn nested_captures_become_nested_nodes() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "match": "((a)b)c",
                "name": "whole",
                "captures": {"1": {"name": "outer"}, "2": {"name": "inner"}}
              }]
            }"#,
        );
        let events = events(&registry, "abc");
        assert_tiles(&events, 3);
        let pushes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Push { kind, at } => Some((*kind, *at)),
                _ => None,
            })
            .collect();
        assert_eq!(
            pushes,
            vec![
                (kind(&registry, "whole"), 0),
                (kind(&registry, "outer"), 0),
                (kind(&registry, "inner"), 0)
            ]
        );
    }

    #[test]
    fn captures_with_patterns_are_scanned_again() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "match": "\\[(.*)\\]",
                "name": "list",
                "captures": {"1": {"name": "items", "patterns": [{"match": "\\d", "name": "digit"}]}}
              }]
            }"#,
        );
        let events = events(&registry, "[1,2]");
        assert_tiles(&events, 5);
        let digit = kind(&registry, "digit");
        let digits = events
            .iter()
            .filter(|e| matches!(e, ScanEvent::Push { kind, .. } if *kind == digit))
            .count();
        assert_eq!(digits, 2);
    }

    #[test]
    fn embedded_content_is_delegated() {
        let registry = registry_from_json(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "begin": "^```(.*)\\n", "end": "^```", "name": "fence",
                "embed": {"languageCapture": 1}
              }]
            }"#,
        );
        let text = "```json,linenos\n{}\n```";
        let events = events(&registry, text);
        assert_tiles(&events, text.len());
        assert!(events.contains(&ScanEvent::Embed {
            language: "json".into(),
            range: 16..19
        }));
    }
}
