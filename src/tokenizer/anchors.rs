use std::borrow::Cow;
use std::fmt;

/// Whether `\G` should be able to match at the current position.
///
/// `\G` anchors at the end of the begin match of the innermost region. Oniguruma would
/// match it at every search start otherwise so we swap it for something that can't match,
/// like vscode-textmate does.
/// `\A` doesn't need the same treatment: we always search the whole input so it only
/// matches at offset 0.
#[derive(Copy, Clone, PartialEq, Hash, Eq)]
pub enum AnchorActive {
    G,
    None,
}

impl AnchorActive {
    pub fn new(anchor_position: Option<usize>, current_pos: usize) -> Self {
        if anchor_position == Some(current_pos) {
            AnchorActive::G
        } else {
            AnchorActive::None
        }
    }

    pub fn replace_anchors<'a>(&self, pat: &'a str) -> Cow<'a, str> {
        match self {
            AnchorActive::G => Cow::Borrowed(pat),
            AnchorActive::None => {
                if pat.contains("\\G") {
                    Cow::Owned(pat.replace("\\G", "\u{FFFF}"))
                } else {
                    Cow::Borrowed(pat)
                }
            }
        }
    }
}

impl fmt::Debug for AnchorActive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnchorActive::G => "allow_G=true",
            AnchorActive::None => "allow_G=false",
        };
        f.write_str(s)
    }
}
