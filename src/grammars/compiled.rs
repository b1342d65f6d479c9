use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{Deref, Index};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::grammars::raw::{Captures, RawGrammar, RawRule};
use crate::grammars::regex::Regex;
use crate::node_types::{NodeTypeId, NodeTypeRegistry};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrammarId(pub u16);

impl GrammarId {
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl Index<GrammarId> for Vec<CompiledGrammar> {
    type Output = CompiledGrammar;

    fn index(&self, index: GrammarId) -> &Self::Output {
        &self[index.as_index()]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u16);

impl RuleId {
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl Deref for RuleId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Index<RuleId> for Vec<Rule> {
    type Output = Rule;

    fn index(&self, index: RuleId) -> &Self::Output {
        &self[index.as_index()]
    }
}

/// The rule holding the root patterns of a grammar
pub const ROOT_RULE_ID: RuleId = RuleId(0);

/// A rule in any grammar of a registry
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GlobalRuleRef {
    pub grammar: GrammarId,
    pub rule: RuleId,
}

impl GlobalRuleRef {
    pub fn root(grammar: GrammarId) -> Self {
        Self {
            grammar,
            rule: ROOT_RULE_ID,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegexId(u16);

impl Index<RegexId> for Vec<Regex> {
    type Output = Regex;

    fn index(&self, index: RegexId) -> &Self::Output {
        &self[index.0 as usize]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(u16);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Repository(HashMap<String, RuleId>);

impl Repository {
    /// Look up a rule by name in this repository
    pub fn get(&self, name: &str) -> Option<&RuleId> {
        self.0.get(name)
    }
}

/// The repositories visible from a rule, outermost first.
/// `#key` includes are looked up from the innermost one outwards.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
pub struct RepositoryStack(Vec<RepositoryId>);

impl RepositoryStack {
    pub fn push(&self, id: RepositoryId) -> Self {
        let mut stack = self.0.clone();
        stack.push(id);
        Self(stack)
    }

    pub fn innermost_first(&self) -> impl Iterator<Item = RepositoryId> + '_ {
        self.0.iter().rev().copied()
    }
}

/// What an `include` points to:
///  * self, e.g. `$self`
///  * base, e.g. `$base`, which we treat like `$self`
///  * Relative scope reference, e.g. `#entity.name.class`
///  * Scope Name, e.g. `source.ts`
///  * Top level scope reference, e.g. `source.ts#entity.name.class`
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    Self_,
    Base,
    Local(String),
    OtherComplete(String),
    OtherSpecific(String, String),
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        match value {
            "$self" => Self::Self_,
            "$base" => Self::Base,
            s if s.starts_with('#') => Self::Local(s[1..].to_string()),
            s => match s.split_once('#') {
                Some((scope, rule)) => Self::OtherSpecific(scope.to_string(), rule.to_string()),
                None => Self::OtherComplete(s.to_string()),
            },
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Self_ => f.write_str("$self"),
            Reference::Base => f.write_str("$base"),
            Reference::Local(key) => write!(f, "#{key}"),
            Reference::OtherComplete(scope) => f.write_str(scope),
            Reference::OtherSpecific(scope, key) => write!(f, "{scope}#{key}"),
        }
    }
}

impl Reference {
    pub fn external_scope(&self) -> Option<&str> {
        match self {
            Reference::OtherComplete(scope) | Reference::OtherSpecific(scope, _) => Some(scope),
            _ => None,
        }
    }
}

/// Patterns are either rules defined inline or includes, the latter are only
/// resolved when the registry is linked.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum RuleIdOrReference {
    RuleId(RuleId),
    Reference(Reference),
}

/// Where the language of an embedded region comes from
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum EmbedLanguage {
    Fixed(String),
    /// Index of the begin capture holding a fence info string
    Capture(usize),
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: RuleId,
    // some match only care about the captures
    pub node_type: Option<NodeTypeId>,
    /// None for capture rules that only assign a node type
    pub regex_id: Option<RegexId>,
    pub captures: Vec<Option<RuleId>>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct IncludeOnly {
    pub id: RuleId,
    /// Only used when this rule is a capture re-scanning its captured text
    pub node_type: Option<NodeTypeId>,
    pub repository_stack: RepositoryStack,
    pub patterns: Vec<RuleIdOrReference>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BeginEnd {
    pub id: RuleId,
    pub node_type: Option<NodeTypeId>,
    pub content_node_type: Option<NodeTypeId>,
    pub begin: RegexId,
    pub begin_captures: Vec<Option<RuleId>>,
    pub end: RegexId,
    pub end_has_backrefs: bool,
    pub end_captures: Vec<Option<RuleId>>,
    pub apply_end_pattern_last: bool,
    pub single_line: bool,
    pub embed: Option<EmbedLanguage>,
    pub patterns: Vec<RuleIdOrReference>,
    pub repository_stack: RepositoryStack,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Rule {
    Match(Match),
    IncludeOnly(IncludeOnly),
    BeginEnd(BeginEnd),
    Noop,
}

impl Rule {
    pub fn node_type(&self) -> Option<NodeTypeId> {
        match self {
            Rule::Match(m) => m.node_type,
            Rule::IncludeOnly(i) => i.node_type,
            Rule::BeginEnd(b) => b.node_type,
            Rule::Noop => None,
        }
    }

    pub fn patterns(&self) -> &[RuleIdOrReference] {
        match self {
            Rule::IncludeOnly(i) => &i.patterns,
            Rule::BeginEnd(b) => &b.patterns,
            Rule::Match(_) | Rule::Noop => &[],
        }
    }

    pub fn repository_stack(&self) -> Option<&RepositoryStack> {
        match self {
            Rule::IncludeOnly(i) => Some(&i.repository_stack),
            Rule::BeginEnd(b) => Some(&b.repository_stack),
            Rule::Match(_) | Rule::Noop => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledGrammar {
    pub id: GrammarId,
    pub name: String,
    pub display_name: Option<String>,
    pub scope_name: String,
    pub file_types: Vec<String>,
    pub regexes: Vec<Regex>,
    pub rules: Vec<Rule>,
    pub repositories: Vec<Repository>,
    pub node_types: Arc<NodeTypeRegistry>,
    /// For each rule, the rules that can match while it is on top of the stack, with
    /// includes flattened. Filled when the registry is linked.
    pub(crate) candidates: Vec<Vec<GlobalRuleRef>>,
}

/// Highest capture group number a grammar can style
const MAX_CAPTURE_GROUP: usize = 999;

/// Mutable state while compiling a single grammar
struct Compiler {
    grammar: CompiledGrammar,
    node_types: NodeTypeRegistry,
    errors: Vec<CompileError>,
}

impl CompiledGrammar {
    /// Compiles every rule of the grammar, collecting all the errors found.
    /// Includes are left unresolved until the grammar is linked in a registry.
    pub fn from_raw_grammar(raw: RawGrammar, id: GrammarId) -> Result<Self, Vec<CompileError>> {
        let mut compiler = Compiler {
            grammar: Self {
                id,
                name: raw.name,
                display_name: raw.display_name,
                scope_name: raw.scope_name,
                file_types: raw.file_types,
                regexes: Vec::new(),
                rules: Vec::new(),
                repositories: Vec::new(),
                node_types: Arc::new(NodeTypeRegistry::new(id)),
                candidates: Vec::new(),
            },
            node_types: NodeTypeRegistry::new(id),
            errors: Vec::new(),
        };

        let root_rule = RawRule {
            patterns: raw.patterns,
            repository: raw.repository,
            ..Default::default()
        };
        let root_rule_id = compiler.compile_root(root_rule);
        debug_assert_eq!(root_rule_id, ROOT_RULE_ID);

        let Compiler {
            mut grammar,
            node_types,
            errors,
        } = compiler;
        if !errors.is_empty() {
            return Err(errors);
        }
        grammar.node_types = Arc::new(node_types);
        Ok(grammar)
    }

    /// The repository of the root rule, used by `scope#key` includes from other grammars
    pub fn root_repository(&self) -> Option<&Repository> {
        let stack = self.rules.first()?.repository_stack()?;
        let id = stack.innermost_first().next()?;
        self.repositories.get(id.0 as usize)
    }

    /// Looks up `#name` from the given repository stack, innermost repository first
    pub fn lookup_local(&self, stack: &RepositoryStack, name: &str) -> Option<RuleId> {
        stack
            .innermost_first()
            .find_map(|repo_id| self.repositories[repo_id.0 as usize].get(name).copied())
    }

    /// Every grammar scope referenced by an include of this grammar
    pub fn external_scopes(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .flat_map(|rule| rule.patterns())
            .filter_map(|p| match p {
                RuleIdOrReference::Reference(r) => r.external_scope(),
                RuleIdOrReference::RuleId(_) => None,
            })
            .filter(|scope| *scope != self.scope_name)
            .collect()
    }

    /// Rules that can match when `rule` is on top of the stack.
    /// Empty until the registry is linked.
    pub fn candidates(&self, rule: RuleId) -> &[GlobalRuleRef] {
        self.candidates
            .get(rule.as_index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The regex a candidate rule is matched with: the `match` of a Match rule or the
    /// `begin` of a region
    pub fn candidate_pattern(&self, rule: RuleId) -> Option<&Regex> {
        match &self.rules[rule] {
            Rule::Match(Match {
                regex_id: Some(re), ..
            }) => Some(&self.regexes[*re]),
            Rule::BeginEnd(b) => Some(&self.regexes[b.begin]),
            _ => None,
        }
    }

    /// A human readable name for a rule, used in diagnostics
    pub(crate) fn rule_label(&self, rule: RuleId) -> String {
        if rule == ROOT_RULE_ID {
            return "$self".to_owned();
        }
        if let Some(name) = self
            .rules
            .get(rule.as_index())
            .and_then(|r| r.node_type())
            .and_then(|id| self.node_types.get(id))
            .map(|t| t.name.clone())
        {
            return name;
        }
        self.repositories
            .iter()
            .flat_map(|repo| repo.0.iter())
            .find(|(_, id)| **id == rule)
            .map(|(name, _)| format!("#{name}"))
            .unwrap_or_else(|| format!("rule {}", rule.0))
    }
}

impl Compiler {
    fn compile_root(&mut self, mut raw_rule: RawRule) -> RuleId {
        // The root always keeps its repository, even without patterns, so
        // `scope#key` includes can reach it
        let id = self.reserve_rule();
        let (stack, repository) = self.reserve_repository(
            &RepositoryStack::default(),
            std::mem::take(&mut raw_rule.repository),
        );
        let patterns = self.compile_patterns(raw_rule.patterns, &stack);
        if let Some((repo_id, raw_repository)) = repository {
            self.compile_repository(repo_id, raw_repository, &stack);
        }
        self.grammar.rules[id.as_index()] = Rule::IncludeOnly(IncludeOnly {
            id,
            node_type: None,
            repository_stack: stack,
            patterns,
        });
        id
    }

    fn reserve_rule(&mut self) -> RuleId {
        let id = RuleId(self.grammar.rules.len() as u16);
        // push a no-op to reserve its spot
        self.grammar.rules.push(Rule::Noop);
        id
    }

    /// Allocates the repository slot before compiling anything so that node types are
    /// registered in declaration order: patterns first, repository entries after.
    fn reserve_repository(
        &mut self,
        repository_stack: &RepositoryStack,
        raw_repository: IndexMap<String, RawRule>,
    ) -> (RepositoryStack, Option<(RepositoryId, IndexMap<String, RawRule>)>) {
        if raw_repository.is_empty() {
            return (repository_stack.clone(), None);
        }
        let repo_id = RepositoryId(self.grammar.repositories.len() as u16);
        self.grammar.repositories.push(Repository::default());
        (repository_stack.push(repo_id), Some((repo_id, raw_repository)))
    }

    fn compile_rule(&mut self, mut raw_rule: RawRule, repository_stack: &RepositoryStack) -> RuleId {
        let id = self.reserve_rule();

        let node_type = raw_rule
            .name
            .as_deref()
            .map(|name| self.declare_node_type(name, &raw_rule));
        let content_node_type = raw_rule.content_name.as_deref().map(|name| {
            if node_type.is_some() {
                self.node_types.register_or_lookup(name)
            } else {
                self.declare_node_type(name, &raw_rule)
            }
        });

        let (stack, repository) =
            self.reserve_repository(repository_stack, std::mem::take(&mut raw_rule.repository));

        // https://github.com/microsoft/vscode-textmate/blob/f03a6a8790af81372d0e81facae75554ec5e97ef/src/rule.ts#L389-L447
        let rule = if let Some(pat) = raw_rule.match_ {
            let (regex_id, _) = self.compile_regex(pat);
            Rule::Match(Match {
                id,
                node_type,
                regex_id: Some(regex_id),
                captures: self.compile_captures(raw_rule.captures, &stack),
            })
        } else if let Some(begin_pat) = raw_rule.begin {
            if let Some(end_pat) = raw_rule.end {
                let (begin, _) = self.compile_regex(begin_pat);
                let (end, end_has_backrefs) = self.compile_regex(end_pat);
                let begin_captures = self.compile_captures(raw_rule.begin_captures, &stack);
                let end_captures = self.compile_captures(raw_rule.end_captures, &stack);
                // `captures` applies to both begin and end when they don't have their own
                let shared = self.compile_captures(raw_rule.captures, &stack);
                let patterns = self.compile_patterns(raw_rule.patterns, &stack);
                let embed = raw_rule.embed.and_then(|e| {
                    e.language_capture
                        .map(EmbedLanguage::Capture)
                        .or_else(|| e.language.map(EmbedLanguage::Fixed))
                });

                Rule::BeginEnd(BeginEnd {
                    id,
                    node_type,
                    content_node_type,
                    begin,
                    begin_captures: if begin_captures.is_empty() {
                        shared.clone()
                    } else {
                        begin_captures
                    },
                    end,
                    end_has_backrefs,
                    end_captures: if end_captures.is_empty() {
                        shared
                    } else {
                        end_captures
                    },
                    apply_end_pattern_last: raw_rule.apply_end_pattern_last,
                    single_line: raw_rule.single_line,
                    embed,
                    patterns,
                    repository_stack: stack.clone(),
                })
            } else {
                // a rule that has begin without end is just a match, probably a typo
                let (regex_id, _) = self.compile_regex(begin_pat);
                Rule::Match(Match {
                    id,
                    node_type,
                    regex_id: Some(regex_id),
                    captures: self.compile_captures(raw_rule.begin_captures, &stack),
                })
            }
        } else {
            // vscode-textmate does something funny here:
            // - if patterns are NOT present and includes are, it moves includes to patterns;
            // - however, if patterns ARE present, includes are ignored
            // https://github.com/microsoft/vscode-textmate/blob/f03a6a8790af81372d0e81facae75554ec5e97ef/src/rule.ts#L404
            let patterns = if raw_rule.patterns.is_empty() {
                if let Some(include) = raw_rule.include {
                    vec![RawRule {
                        include: Some(include),
                        ..Default::default()
                    }]
                } else {
                    raw_rule.patterns
                }
            } else {
                raw_rule.patterns
            };

            if patterns.is_empty() {
                if node_type.is_some() {
                    // Scope-only rule, eg a capture that only assigns a node type
                    Rule::Match(Match {
                        id,
                        node_type,
                        regex_id: None,
                        captures: Vec::new(),
                    })
                } else {
                    Rule::Noop
                }
            } else {
                Rule::IncludeOnly(IncludeOnly {
                    id,
                    node_type,
                    repository_stack: stack.clone(),
                    patterns: self.compile_patterns(patterns, &stack),
                })
            }
        };

        if let Some((repo_id, raw_repository)) = repository {
            self.compile_repository(repo_id, raw_repository, &stack);
        }

        self.grammar.rules[id.as_index()] = rule;
        id
    }

    fn declare_node_type(&mut self, name: &str, raw_rule: &RawRule) -> NodeTypeId {
        let mut invalid = Vec::new();
        let id = self.node_types.declare(name, raw_rule, &mut invalid);
        for directive in invalid {
            self.errors.push(CompileError::InvalidDirective {
                scope: self.grammar.scope_name.clone(),
                node: name.to_owned(),
                directive,
            });
        }
        id
    }

    fn compile_regex(&mut self, pattern: String) -> (RegexId, bool) {
        let regex_id = RegexId(self.grammar.regexes.len() as u16);
        let re = Regex::new(pattern);
        if let Err(error) = re.validate() {
            self.errors.push(CompileError::InvalidRegex {
                scope: self.grammar.scope_name.clone(),
                pattern: re.pattern().to_owned(),
                error,
            });
        }
        let has_backrefs = re.has_backreferences();
        self.grammar.regexes.push(re);

        (regex_id, has_backrefs)
    }

    fn compile_repository(
        &mut self,
        repo_id: RepositoryId,
        raw_repository: IndexMap<String, RawRule>,
        repository_stack: &RepositoryStack,
    ) {
        let mut rules = HashMap::with_capacity(raw_repository.len());

        for (name, raw_rule) in raw_repository {
            let rule_id = self.compile_rule(raw_rule, repository_stack);
            rules.insert(name, rule_id);
        }

        self.grammar.repositories[repo_id.0 as usize] = Repository(rules);
    }

    fn compile_captures(
        &mut self,
        captures: Captures,
        repository_stack: &RepositoryStack,
    ) -> Vec<Option<RuleId>> {
        if captures.is_empty() {
            return Vec::new();
        }

        let max_capture = captures
            .keys()
            .copied()
            .filter(|key| *key <= MAX_CAPTURE_GROUP)
            .max()
            .unwrap_or_default();
        let mut out: Vec<Option<RuleId>> = vec![None; max_capture + 1];

        for (key, rule) in captures.0 {
            if key > MAX_CAPTURE_GROUP {
                self.errors.push(CompileError::InvalidCapture {
                    scope: self.grammar.scope_name.clone(),
                    capture: key,
                });
                continue;
            }
            out[key] = Some(self.compile_rule(rule, repository_stack));
        }

        out
    }

    fn compile_patterns(
        &mut self,
        rules: Vec<RawRule>,
        repository_stack: &RepositoryStack,
    ) -> Vec<RuleIdOrReference> {
        let mut out = Vec::with_capacity(rules.len());

        for r in rules {
            if let Some(include) = &r.include {
                // vscode ignores other rule contents is there's an include
                // https://github.com/microsoft/vscode-textmate/blob/f03a6a8790af81372d0e81facae75554ec5e97ef/src/rule.ts#L495
                out.push(RuleIdOrReference::Reference(include.as_str().into()));
            } else {
                out.push(RuleIdOrReference::RuleId(
                    self.compile_rule(r, repository_stack),
                ));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::load_fixture;

    fn compile(json: &str) -> Result<CompiledGrammar, Vec<CompileError>> {
        CompiledGrammar::from_raw_grammar(RawGrammar::load_from_str(json).unwrap(), GrammarId(0))
    }

    #[test]
    fn can_parse_references() {
        assert_eq!(Reference::from("$self"), Reference::Self_);
        assert_eq!(Reference::from("$base"), Reference::Base);
        assert_eq!(Reference::from("#value"), Reference::Local("value".into()));
        assert_eq!(
            Reference::from("source.json"),
            Reference::OtherComplete("source.json".into())
        );
        assert_eq!(
            Reference::from("source.json#value"),
            Reference::OtherSpecific("source.json".into(), "value".into())
        );
    }

    #[test]
    fn registers_node_types_in_declaration_order() {
        let grammar = compile(
            r##"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [
                { "match": "\\d+", "name": "number" },
                { "include": "#string" },
                { "match": "[a-z]+", "name": "word" }
              ],
              "repository": {
                "string": { "begin": "\"", "end": "\"", "name": "string", "contentName": "string.content" },
                "comment": { "match": "//.*", "name": "comment" }
              }
            }"##,
        )
        .unwrap();
        let names: Vec<_> = grammar
            .node_types
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "Top",
                "Newline",
                "ErrorUnrecognized",
                "ErrorIncomplete",
                "number",
                "word",
                "string",
                "string.content",
                "comment"
            ]
        );
    }

    #[test]
    fn compiling_twice_gives_identical_ids() {
        let raw = load_fixture("blocks");
        let a = CompiledGrammar::from_raw_grammar(raw.clone(), GrammarId(0)).unwrap();
        let b = CompiledGrammar::from_raw_grammar(raw, GrammarId(0)).unwrap();
        assert_eq!(a.node_types, b.node_types);
        assert_eq!(a.rules, b.rules);
    }

    #[test]
    fn collects_every_invalid_regex() {
        let errors = compile(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [
                { "match": "(unclosed", "name": "a" },
                { "begin": "[", "end": "x", "name": "b" }
              ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[0],
            CompileError::InvalidRegex { pattern, .. } if pattern == "(unclosed"
        ));
        assert!(matches!(
            &errors[1],
            CompileError::InvalidRegex { pattern, .. } if pattern == "["
        ));
    }

    #[test]
    fn rejects_out_of_range_capture_groups() {
        let errors = compile(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "match": "(a)",
                "name": "a",
                "captures": {"1": {"name": "x"}, "99999999": {"name": "y"}}
              }]
            }"#,
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec![CompileError::InvalidCapture {
                scope: "source.t".into(),
                capture: 99999999
            }]
        );
    }

    #[test]
    fn reports_invalid_directives() {
        let errors = compile(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{ "match": "x", "name": "x", "fold": "sideways", "indent": "add(two)" }]
            }"#,
        )
        .unwrap_err();
        assert_eq!(
            errors,
            vec![
                CompileError::InvalidDirective {
                    scope: "source.t".into(),
                    node: "x".into(),
                    directive: "sideways".into()
                },
                CompileError::InvalidDirective {
                    scope: "source.t".into(),
                    node: "x".into(),
                    directive: "add(two)".into()
                }
            ]
        );
    }

    #[test]
    fn captures_are_shared_by_begin_and_end() {
        let grammar = compile(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{
                "begin": "(<)", "end": "(>)",
                "captures": { "1": { "name": "punct" } }
              }]
            }"#,
        )
        .unwrap();
        let Rule::BeginEnd(b) = &grammar.rules[RuleId(1)] else {
            panic!("expected a region");
        };
        assert_eq!(b.begin_captures, b.end_captures);
        assert!(b.begin_captures[1].is_some());
    }

    #[test]
    fn end_backreferences_are_detected() {
        let grammar = compile(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{ "begin": "<(\\w+)>", "end": "</\\1>", "name": "tag" }]
            }"#,
        )
        .unwrap();
        let Rule::BeginEnd(b) = &grammar.rules[RuleId(1)] else {
            panic!("expected a region");
        };
        assert!(b.end_has_backrefs);
    }

    #[test]
    fn local_lookup_prefers_innermost_repository() {
        let grammar = compile(
            r##"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [{ "include": "#outer" }],
              "repository": {
                "item": { "match": "a", "name": "outer.item" },
                "outer": {
                  "begin": "\\(", "end": "\\)",
                  "patterns": [{ "include": "#item" }],
                  "repository": { "item": { "match": "b", "name": "inner.item" } }
                }
              }
            }"##,
        )
        .unwrap();
        let outer = grammar.root_repository().unwrap().get("outer").copied().unwrap();
        let stack = grammar.rules[outer].repository_stack().unwrap();
        let item = grammar.lookup_local(stack, "item").unwrap();
        let node_type = grammar.rules[item].node_type().unwrap();
        assert_eq!(grammar.node_types.get(node_type).unwrap().name, "inner.item");

        let root_stack = grammar.rules[ROOT_RULE_ID].repository_stack().unwrap();
        let item = grammar.lookup_local(root_stack, "item").unwrap();
        let node_type = grammar.rules[item].node_type().unwrap();
        assert_eq!(grammar.node_types.get(node_type).unwrap().name, "outer.item");
    }

    #[test]
    fn lists_external_scopes() {
        let grammar = compile(
            r#"{
              "name": "t",
              "scopeName": "source.t",
              "patterns": [
                { "include": "source.json" },
                { "include": "source.css#rule" },
                { "include": "source.t" }
              ]
            }"#,
        )
        .unwrap();
        let scopes: Vec<_> = grammar.external_scopes().into_iter().collect();
        assert_eq!(scopes, vec!["source.css", "source.json"]);
    }
}
