use std::fmt;
use std::io;

pub type ScopeTreeResult<T> = Result<T, Error>;

/// A structured diagnostic produced while compiling or linking a grammar.
///
/// A grammar with any of those is rejected as a whole: no parser is ever built
/// from a partially valid rule graph.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompileError {
    /// A `match`, `begin`, `end` or indent exception pattern that Oniguruma rejects
    InvalidRegex {
        scope: String,
        pattern: String,
        error: String,
    },
    /// An include pointing to a grammar scope that is neither registered nor
    /// provided by the resolver given to `link_with`
    UnknownScope { scope: String, include: String },
    /// An include pointing to a repository key that doesn't exist
    UnresolvedInclude { scope: String, include: String },
    /// A rule whose patterns only include each other, so nothing can ever match
    IncludeCycle { scope: String, rule: String },
    /// A capture group number too high for any pattern to have
    InvalidCapture { scope: String, capture: usize },
    /// A fold or indent directive that can't be parsed
    InvalidDirective {
        scope: String,
        node: String,
        directive: String,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidRegex {
                scope,
                pattern,
                error,
            } => write!(f, "[{scope}] invalid regex pattern '{pattern}': {error}"),
            CompileError::UnknownScope { scope, include } => {
                write!(f, "[{scope}] include '{include}' refers to an unknown grammar")
            }
            CompileError::UnresolvedInclude { scope, include } => {
                write!(f, "[{scope}] unresolved include '{include}'")
            }
            CompileError::IncludeCycle { scope, rule } => {
                write!(
                    f,
                    "[{scope}] rule '{rule}' only includes itself through a cycle"
                )
            }
            CompileError::InvalidCapture { scope, capture } => {
                write!(f, "[{scope}] capture group {capture} is out of range")
            }
            CompileError::InvalidDirective {
                scope,
                node,
                directive,
            } => write!(f, "[{scope}] invalid directive '{directive}' on '{node}'"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Errors that can occur during scopetree usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file
    /// or a dump file if the `dump` feature is enabled
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// Bitcode encoding or decoding failed.
    #[cfg(feature = "dump")]
    Bitcode(bitcode::Error),

    /// The grammar could not be compiled or linked.
    /// Contains every diagnostic found, not only the first one.
    Compile(Vec<CompileError>),

    /// A grammar was not found in the registry.
    /// Only happens when asking for a parser of a grammar we can't find
    GrammarNotFound(String),

    /// Parsers can only be created once `Registry::link` has been called
    UnlinkedGrammars,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            #[cfg(feature = "dump")]
            Error::Bitcode(err) => write!(f, "bitcode error: {}", err),
            Error::Compile(errors) => {
                write!(f, "grammar compilation failed:")?;
                for err in errors {
                    write!(f, "\n  - {err}")?;
                }
                Ok(())
            }
            Error::GrammarNotFound(name) => write!(f, "grammar '{}' not found", name),
            Error::UnlinkedGrammars => {
                write!(f, "grammars need to be linked before creating a parser")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            #[cfg(feature = "dump")]
            Error::Bitcode(err) => Some(err),
            Error::Compile(_) | Error::GrammarNotFound(_) | Error::UnlinkedGrammars => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<Vec<CompileError>> for Error {
    fn from(errors: Vec<CompileError>) -> Self {
        Error::Compile(errors)
    }
}

#[cfg(feature = "dump")]
impl From<bitcode::Error> for Error {
    fn from(err: bitcode::Error) -> Self {
        Error::Bitcode(err)
    }
}
