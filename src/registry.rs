use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Error, ScopeTreeResult};
use crate::grammars::{
    CompiledGrammar, GlobalRuleRef, GrammarId, Match, RawGrammar, Reference, Rule, RuleId,
    RuleIdOrReference,
};
use crate::node_types::NodeTypeRegistry;
use crate::parser::Parser;

/// Includes of every rule of every grammar, once resolved
type ResolvedPatterns = Vec<Vec<Vec<GlobalRuleRef>>>;

/// The main struct in scopetree.
///
/// Holds all the grammars and hands out parsers for them. Grammars can reference each
/// other by scope name so they all need to be added before calling [`Registry::link`].
/// A linked registry is immutable and can be shared between threads.
#[derive(Serialize, Deserialize, Default)]
pub struct Registry {
    // Vector of compiled grammars for ID-based access
    pub(crate) grammars: Vec<CompiledGrammar>,
    // grammar scope name -> grammar ID lookup, this is the identity of a grammar
    grammar_id_by_scope_name: HashMap<String, GrammarId>,
    // lowercased names, display names, file types and aliases -> grammar ID
    // this is what end users will refer to
    grammar_id_by_name: HashMap<String, GrammarId>,
    // Parsers can only be created once all the includes are resolved
    linked: bool,
    // Node types of every grammar, indexed by grammar ID. Shared with every tree.
    #[serde(skip)]
    node_types: Arc<[Arc<NodeTypeRegistry>]>,
    // What a language name as given by a caller resolves to
    #[serde(skip)]
    language_cache: papaya::HashMap<String, Option<GrammarId>>,
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            grammars: self.grammars.clone(),
            grammar_id_by_scope_name: self.grammar_id_by_scope_name.clone(),
            grammar_id_by_name: self.grammar_id_by_name.clone(),
            linked: self.linked,
            node_types: Arc::clone(&self.node_types),
            language_cache: papaya::HashMap::new(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field(
                "grammars",
                &self
                    .grammars
                    .iter()
                    .map(|g| g.scope_name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("linked", &self.linked)
            .finish()
    }
}

impl Registry {
    /// Compiles a grammar and adds it to the registry.
    ///
    /// The scope name is the identity of a grammar: adding a grammar whose scope name is
    /// already registered keeps the existing one and returns its id.
    pub fn add_grammar(&mut self, raw_grammar: RawGrammar) -> ScopeTreeResult<GrammarId> {
        if let Some(grammar_id) = self.grammar_id_by_scope_name.get(&raw_grammar.scope_name) {
            #[cfg(feature = "debug")]
            log::debug!(
                "[add_grammar] {} is already registered",
                raw_grammar.scope_name
            );
            return Ok(*grammar_id);
        }

        let grammar_id = GrammarId(self.grammars.len() as u16);
        let grammar = CompiledGrammar::from_raw_grammar(raw_grammar, grammar_id)?;

        self.grammar_id_by_scope_name
            .insert(grammar.scope_name.clone(), grammar_id);
        let names = std::iter::once(&grammar.name)
            .chain(grammar.display_name.as_ref())
            .chain(std::iter::once(&grammar.scope_name))
            .chain(grammar.file_types.iter());
        for name in names {
            // first grammar claiming a name keeps it
            self.grammar_id_by_name
                .entry(name.to_lowercase())
                .or_insert(grammar_id);
        }

        self.grammars.push(grammar);
        self.linked = false;
        self.language_cache.pin().clear();
        Ok(grammar_id)
    }

    /// Reads the file and add it as a grammar.
    pub fn add_grammar_from_path(&mut self, path: impl AsRef<Path>) -> ScopeTreeResult<GrammarId> {
        let raw_grammar = RawGrammar::load_from_file(path)?;
        self.add_grammar(raw_grammar)
    }

    /// Adds an alias for the given grammar, overriding what the alias pointed to
    pub fn add_alias(&mut self, grammar_name: &str, alias: &str) {
        if let Some(grammar_id) = self.grammar_id(grammar_name) {
            self.grammar_id_by_name
                .insert(alias.to_lowercase(), grammar_id);
            self.language_cache.pin().clear();
        }
    }

    /// Finds a grammar by name, display name, alias, scope name or file type.
    /// Names are case-insensitive.
    pub fn grammar_id(&self, language: &str) -> Option<GrammarId> {
        let cache = self.language_cache.pin();
        if let Some(grammar_id) = cache.get(language) {
            return *grammar_id;
        }

        let key = language.trim().to_lowercase();
        let grammar_id = self
            .grammar_id_by_name
            .get(&key)
            .or_else(|| self.grammar_id_by_scope_name.get(language.trim()))
            .copied();
        cache.insert(language.to_owned(), grammar_id);
        grammar_id
    }

    /// Checks whether the given lang is available in the registry
    pub fn contains_grammar(&self, language: &str) -> bool {
        self.grammar_id(language).is_some()
    }

    pub fn grammar(&self, grammar_id: GrammarId) -> Option<&CompiledGrammar> {
        self.grammars.get(grammar_id.as_index())
    }

    pub fn grammars(&self) -> impl Iterator<Item = &CompiledGrammar> {
        self.grammars.iter()
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn node_types(&self) -> Arc<[Arc<NodeTypeRegistry>]> {
        Arc::clone(&self.node_types)
    }

    /// A parser for the given language.
    ///
    /// Make sure `link` is called before, this will error otherwise.
    pub fn parser(&self, language: &str) -> ScopeTreeResult<Parser<'_>> {
        if !self.linked {
            return Err(Error::UnlinkedGrammars);
        }
        let grammar_id = self
            .grammar_id(language)
            .ok_or_else(|| Error::GrammarNotFound(language.to_owned()))?;
        Ok(Parser::new(self, grammar_id, 0))
    }

    /// Resolves every include of every grammar.
    /// Includes of grammars that are not in the registry are an error.
    pub fn link(&mut self) -> ScopeTreeResult<()> {
        self.link_with(|_| None)
    }

    /// Resolves every include of every grammar, asking `resolver` for the grammars of
    /// scopes that are referenced but not registered. Grammars returned by the resolver
    /// are added to the registry and their own includes resolved too.
    ///
    /// Every problem found is reported at once, the registry stays unlinked if there is
    /// any.
    pub fn link_with<F>(&mut self, mut resolver: F) -> ScopeTreeResult<()>
    where
        F: FnMut(&str) -> Option<RawGrammar>,
    {
        let mut errors = Vec::new();

        // The resolver can return grammars including yet other grammars
        let mut asked: HashSet<String> = HashSet::new();
        let mut checked = 0;
        while checked < self.grammars.len() {
            let missing: Vec<String> = self.grammars[checked]
                .external_scopes()
                .into_iter()
                .filter(|scope| !self.grammar_id_by_scope_name.contains_key(*scope))
                .map(ToOwned::to_owned)
                .collect();
            for scope in missing {
                if !asked.insert(scope.clone()) {
                    continue;
                }
                if let Some(raw_grammar) = resolver(&scope) {
                    #[cfg(feature = "debug")]
                    log::debug!("[link] Adding {scope} from the resolver");
                    match self.add_grammar(raw_grammar) {
                        Ok(_) => {}
                        Err(Error::Compile(errs)) => errors.extend(errs),
                        Err(err) => return Err(err),
                    }
                }
            }
            checked += 1;
        }

        let resolved = self.resolve_references(&mut errors);
        let candidates = self.flatten_candidates(&resolved, &mut errors);
        if !errors.is_empty() {
            return Err(Error::Compile(errors));
        }

        for (grammar, candidates) in self.grammars.iter_mut().zip(candidates) {
            grammar.candidates = candidates;
        }
        self.node_types = self
            .grammars
            .iter()
            .map(|g| Arc::clone(&g.node_types))
            .collect();
        self.linked = true;

        #[cfg(feature = "debug")]
        log::debug!("[link] Linked {} grammars", self.grammars.len());
        Ok(())
    }

    fn resolve_reference(
        &self,
        grammar: &CompiledGrammar,
        rule: &Rule,
        reference: &Reference,
    ) -> Result<GlobalRuleRef, CompileError> {
        let unresolved = || CompileError::UnresolvedInclude {
            scope: grammar.scope_name.clone(),
            include: reference.to_string(),
        };
        let unknown_scope = || CompileError::UnknownScope {
            scope: grammar.scope_name.clone(),
            include: reference.to_string(),
        };

        match reference {
            Reference::Self_ | Reference::Base => Ok(GlobalRuleRef::root(grammar.id)),
            Reference::Local(key) => rule
                .repository_stack()
                .and_then(|stack| grammar.lookup_local(stack, key))
                .map(|rule| GlobalRuleRef {
                    grammar: grammar.id,
                    rule,
                })
                .ok_or_else(unresolved),
            Reference::OtherComplete(scope) => self
                .grammar_id_by_scope_name
                .get(scope)
                .map(|grammar_id| GlobalRuleRef::root(*grammar_id))
                .ok_or_else(unknown_scope),
            Reference::OtherSpecific(scope, key) => {
                let grammar_id = *self
                    .grammar_id_by_scope_name
                    .get(scope)
                    .ok_or_else(unknown_scope)?;
                self.grammars[grammar_id]
                    .root_repository()
                    .and_then(|repository| repository.get(key))
                    .map(|rule| GlobalRuleRef {
                        grammar: grammar_id,
                        rule: *rule,
                    })
                    .ok_or_else(unresolved)
            }
        }
    }

    fn resolve_references(&self, errors: &mut Vec<CompileError>) -> ResolvedPatterns {
        let mut out = Vec::with_capacity(self.grammars.len());

        for grammar in &self.grammars {
            let mut rules = Vec::with_capacity(grammar.rules.len());
            for rule in &grammar.rules {
                let mut patterns = Vec::with_capacity(rule.patterns().len());
                for pattern in rule.patterns() {
                    match pattern {
                        RuleIdOrReference::RuleId(rule_id) => patterns.push(GlobalRuleRef {
                            grammar: grammar.id,
                            rule: *rule_id,
                        }),
                        RuleIdOrReference::Reference(reference) => {
                            match self.resolve_reference(grammar, rule, reference) {
                                Ok(rule_ref) => patterns.push(rule_ref),
                                Err(err) => errors.push(err),
                            }
                        }
                    }
                }
                rules.push(patterns);
            }
            out.push(rules);
        }

        out
    }

    /// Computes, for every rule, which rules can match while it is on top of the stack.
    /// Containers are replaced by their content, recursively.
    fn flatten_candidates(
        &self,
        resolved: &ResolvedPatterns,
        errors: &mut Vec<CompileError>,
    ) -> ResolvedPatterns {
        let mut out = Vec::with_capacity(self.grammars.len());

        for grammar in &self.grammars {
            let mut rules = Vec::with_capacity(grammar.rules.len());
            for (index, rule) in grammar.rules.iter().enumerate() {
                if rule.patterns().is_empty() {
                    rules.push(Vec::new());
                    continue;
                }

                let rule_ref = GlobalRuleRef {
                    grammar: grammar.id,
                    rule: RuleId(index as u16),
                };
                let mut flattener = Flattener {
                    registry: self,
                    resolved,
                    visited: HashSet::new(),
                    path: vec![rule_ref],
                    hit_cycle: false,
                    out: Vec::new(),
                };
                flattener.collect(rule_ref);

                if flattener.out.is_empty() && flattener.hit_cycle {
                    errors.push(CompileError::IncludeCycle {
                        scope: grammar.scope_name.clone(),
                        rule: grammar.rule_label(rule_ref.rule),
                    });
                }
                rules.push(flattener.out);
            }
            out.push(rules);
        }

        out
    }

    #[cfg(feature = "dump")]
    /// Dump the linked registry to a binary file that can be loaded later
    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> ScopeTreeResult<()> {
        let data = bitcode::serialize(self)?;
        let compressed = zstd::encode_all(data.as_slice(), 0)?;
        std::fs::write(path, compressed)?;
        Ok(())
    }

    #[cfg(feature = "dump")]
    fn load_from_bytes(compressed_data: &[u8]) -> ScopeTreeResult<Self> {
        let data = zstd::decode_all(compressed_data)?;
        let mut registry: Registry = bitcode::deserialize(&data)?;
        registry.node_types = registry
            .grammars
            .iter()
            .map(|g| Arc::clone(&g.node_types))
            .collect();
        Ok(registry)
    }

    #[cfg(feature = "dump")]
    /// Read a binary dump made by `dump_to_file`
    pub fn load_from_file(path: impl AsRef<Path>) -> ScopeTreeResult<Self> {
        let compressed_data = std::fs::read(path)?;
        Self::load_from_bytes(&compressed_data)
    }
}

/// Depth-first walk through includes collecting the rules that actually match
struct Flattener<'a> {
    registry: &'a Registry,
    resolved: &'a ResolvedPatterns,
    visited: HashSet<GlobalRuleRef>,
    /// Containers being expanded, to tell cycles from rules included twice
    path: Vec<GlobalRuleRef>,
    hit_cycle: bool,
    out: Vec<GlobalRuleRef>,
}

impl Flattener<'_> {
    fn collect(&mut self, rule_ref: GlobalRuleRef) {
        let patterns = &self.resolved[rule_ref.grammar.as_index()][rule_ref.rule.as_index()];
        for child in patterns {
            let rule = &self.registry.grammars[child.grammar].rules[child.rule];
            // only containers can loop, a region including itself is a nested region
            if matches!(rule, Rule::IncludeOnly(_)) && self.path.contains(child) {
                self.hit_cycle = true;
                continue;
            }
            // a rule included twice can only ever match the first time
            if !self.visited.insert(*child) {
                continue;
            }

            match rule {
                Rule::Match(Match {
                    regex_id: Some(_), ..
                })
                | Rule::BeginEnd(_) => self.out.push(*child),
                Rule::IncludeOnly(_) => {
                    self.path.push(*child);
                    self.collect(*child);
                    self.path.pop();
                }
                Rule::Match(_) | Rule::Noop => {}
            }
        }
    }
}
