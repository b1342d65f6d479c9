//! Fold and indent directives attached to node types.
//!
//! They are written as short strings in grammars and parsed once when the grammar is
//! compiled, eg `"fold": "offset(1,-1)"` or `"indent": "continued(^\\s*\\))"`.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::grammars::Regex;
use crate::tokenizer::AnchorActive;

/// Which part of a node can be folded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldDirective {
    /// The whole node
    Whole,
    /// Between the end of the first child and the start of the last child, eg the
    /// content of a `{ ... }` block without the braces
    Inside,
    /// From the end of the node first line to the end of the node
    PastFirstLine,
    /// The node range with both ends moved by the given amounts
    Offset(i32, i32),
}

impl FoldDirective {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s {
            "" | "whole" | "node" | "true" => Some(FoldDirective::Whole),
            "inside" => Some(FoldDirective::Inside),
            "past_first_line" => Some(FoldDirective::PastFirstLine),
            _ => {
                let args = call_arguments(s, "offset")?;
                let (a, b) = args.split_once(',')?;
                Some(FoldDirective::Offset(
                    a.trim().parse().ok()?,
                    b.trim().parse().ok()?,
                ))
            }
        }
    }

    /// Computes the foldable range for a node spanning `node`, whose first child ends at
    /// `first_child_end` and last child starts at `last_child_start` if it has at least
    /// two children.
    /// Empty ranges are never foldable.
    pub fn fold_range(
        &self,
        text: &str,
        node: Range<usize>,
        inner: Option<(usize, usize)>,
    ) -> Option<Range<usize>> {
        let range = match self {
            FoldDirective::Whole => node,
            FoldDirective::Inside => {
                let (first_child_end, last_child_start) = inner?;
                first_child_end..last_child_start
            }
            FoldDirective::PastFirstLine => {
                let node_text = text.get(node.clone())?;
                let line_end = node_text.find('\n')?;
                node.start + line_end..node.end
            }
            FoldDirective::Offset(a, b) => {
                let start = node.start as i64 + *a as i64;
                let end = node.end as i64 + *b as i64;
                let start = start.clamp(node.start as i64, node.end as i64) as usize;
                let end = end.clamp(node.start as i64, node.end as i64) as usize;
                start..end
            }
        };

        if range.start < range.end {
            Some(range)
        } else {
            None
        }
    }
}

/// How lines inside a node are indented, relative to the indentation of the line the
/// node starts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndentDirective {
    /// Same indentation as the node start line
    Flat,
    /// One unit deeper, unless the line matches the exception pattern
    Continued { except: Option<Regex> },
    /// One unit deeper, unless the line starts with the closing token
    Delimited { closing: String },
    /// `n` units deeper (or shallower)
    Add(i32),
    /// Exactly `n` units, ignoring the node start line
    Set(u32),
}

impl IndentDirective {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s {
            "flat" => Some(IndentDirective::Flat),
            "continued" => Some(IndentDirective::Continued { except: None }),
            _ => {
                if let Some(args) = call_arguments(s, "continued") {
                    let re = Regex::new(args.to_owned());
                    re.validate().ok()?;
                    Some(IndentDirective::Continued { except: Some(re) })
                } else if let Some(args) = call_arguments(s, "delimited") {
                    let closing = args.trim();
                    if closing.is_empty() {
                        return None;
                    }
                    Some(IndentDirective::Delimited {
                        closing: closing.to_owned(),
                    })
                } else if let Some(args) = call_arguments(s, "add") {
                    Some(IndentDirective::Add(args.trim().parse().ok()?))
                } else if let Some(args) = call_arguments(s, "set") {
                    Some(IndentDirective::Set(args.trim().parse().ok()?))
                } else {
                    None
                }
            }
        }
    }

    /// Indentation in columns for `line`, given the indentation of the line where
    /// the node starts.
    pub fn apply(&self, base: usize, unit: usize, line: &str) -> usize {
        let trimmed = line.trim_start();
        match self {
            IndentDirective::Flat => base,
            IndentDirective::Continued { except } => {
                let excepted = except
                    .as_ref()
                    .and_then(|re| re.compiled(AnchorActive::None))
                    .is_some_and(|re| re.find(trimmed).is_some());
                if excepted { base } else { base + unit }
            }
            IndentDirective::Delimited { closing } => {
                if trimmed.starts_with(closing.as_str()) {
                    base
                } else {
                    base + unit
                }
            }
            IndentDirective::Add(n) => {
                let delta = n.unsigned_abs() as usize * unit;
                if *n >= 0 {
                    base + delta
                } else {
                    base.saturating_sub(delta)
                }
            }
            IndentDirective::Set(n) => *n as usize * unit,
        }
    }
}

/// Returns what's between the parentheses of `name(...)`
fn call_arguments<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fold_directives() {
        assert_eq!(FoldDirective::parse("inside"), Some(FoldDirective::Inside));
        assert_eq!(
            FoldDirective::parse("past_first_line"),
            Some(FoldDirective::PastFirstLine)
        );
        assert_eq!(
            FoldDirective::parse("offset(1, -1)"),
            Some(FoldDirective::Offset(1, -1))
        );
        assert_eq!(FoldDirective::parse("whole"), Some(FoldDirective::Whole));
        assert_eq!(FoldDirective::parse("offset(1)"), None);
        assert_eq!(FoldDirective::parse("sideways"), None);
    }

    #[test]
    fn parses_indent_directives() {
        assert_eq!(IndentDirective::parse("flat"), Some(IndentDirective::Flat));
        assert_eq!(
            IndentDirective::parse("continued"),
            Some(IndentDirective::Continued { except: None })
        );
        assert_eq!(
            IndentDirective::parse("continued(^\\))"),
            Some(IndentDirective::Continued {
                except: Some(Regex::new("^\\)".to_owned()))
            })
        );
        assert_eq!(
            IndentDirective::parse("delimited(})"),
            Some(IndentDirective::Delimited {
                closing: "}".to_owned()
            })
        );
        assert_eq!(IndentDirective::parse("add(-2)"), Some(IndentDirective::Add(-2)));
        assert_eq!(IndentDirective::parse("set(0)"), Some(IndentDirective::Set(0)));
        assert_eq!(IndentDirective::parse("continued(()"), None);
        assert_eq!(IndentDirective::parse("delimited()"), None);
        assert_eq!(IndentDirective::parse("add(x)"), None);
    }

    #[test]
    fn computes_fold_ranges() {
        let text = "{\n  a\n}";
        assert_eq!(
            FoldDirective::Inside.fold_range(text, 0..7, Some((1, 6))),
            Some(1..6)
        );
        assert_eq!(FoldDirective::Inside.fold_range(text, 0..7, None), None);
        assert_eq!(
            FoldDirective::PastFirstLine.fold_range(text, 0..7, None),
            Some(1..7)
        );
        assert_eq!(
            FoldDirective::Offset(1, -1).fold_range(text, 0..7, None),
            Some(1..6)
        );
        assert_eq!(FoldDirective::Offset(5, -5).fold_range(text, 0..7, None), None);
        assert_eq!(
            FoldDirective::PastFirstLine.fold_range("{}", 0..2, None),
            None
        );
    }

    #[test]
    fn computes_indentation() {
        assert_eq!(IndentDirective::Flat.apply(4, 2, "x"), 4);
        assert_eq!(
            IndentDirective::Delimited {
                closing: "}".into()
            }
            .apply(4, 2, "  }"),
            4
        );
        assert_eq!(
            IndentDirective::Delimited {
                closing: "}".into()
            }
            .apply(4, 2, "  x"),
            6
        );
        let continued = IndentDirective::parse("continued(^\\))").unwrap();
        assert_eq!(continued.apply(0, 4, "foo"), 4);
        assert_eq!(continued.apply(0, 4, "   )"), 0);
        assert_eq!(IndentDirective::Add(-1).apply(2, 4, ""), 0);
        assert_eq!(IndentDirective::Set(3).apply(8, 2, ""), 6);
    }
}
