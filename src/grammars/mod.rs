mod compiled;
mod pattern_set;
mod raw;
mod regex;

pub use compiled::*;
pub use pattern_set::{PatternSet, PatternSetMatch};
pub use raw::{Captures, RawEmbed, RawGrammar, RawRule};
pub use regex::{Regex, resolve_backreferences};
