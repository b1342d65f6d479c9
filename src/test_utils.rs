use std::path::{Path, PathBuf};

use crate::Registry;
use crate::grammars::RawGrammar;
use crate::tree::SyntaxTree;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("fixtures")
        .join("grammars")
        .join(format!("{name}.json"))
}

pub(crate) fn load_fixture(name: &str) -> RawGrammar {
    RawGrammar::load_from_file(fixture_path(name)).unwrap()
}

/// A linked registry with the given fixture grammars, in order
pub(crate) fn registry_with(names: &[&str]) -> Registry {
    let mut registry = Registry::default();
    for name in names {
        registry.add_grammar(load_fixture(name)).unwrap();
    }
    registry.link().unwrap();
    registry
}

/// A linked registry with a single grammar given inline
pub(crate) fn registry_from_json(json: &str) -> Registry {
    let mut registry = Registry::default();
    registry
        .add_grammar(RawGrammar::load_from_str(json).unwrap())
        .unwrap();
    registry.link().unwrap();
    registry
}

pub(crate) fn parse_with(name: &str, text: &str) -> (SyntaxTree, String) {
    let registry = registry_with(&[name]);
    let tree = registry.parser(name).unwrap().parse(text);
    (tree, text.to_owned())
}
