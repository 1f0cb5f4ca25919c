//! Codec for the basic-block symbol naming convention.
//!
//! A basic-block symbol is named `<tag>.BB.<funcname>`. The tag is a
//! non-empty run of characters from `{a, r, f}` (upper or lower case):
//!
//! - the *length* of the tag is the block's index within its function,
//! - the *last letter* encodes the block kind (`a` normal, `r` return,
//!   `f` fallthrough),
//! - an uppercase letter marks the block as a landing pad.
//!
//! Anything that does not split on `.BB.` or uses a character outside the
//! alphabet is an ordinary symbol name, not a basic block.

/// Separator between the block tag and the function name.
pub const BASIC_BLOCK_SEPARATOR: &str = ".BB.";

/// Kind of control flow a basic block ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BbKind {
    Normal,
    Return,
    Fallthrough,
}

/// Decoded properties of a basic-block symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BbInfo {
    pub kind: BbKind,
    pub landing_pad: bool,
}

/// A basic-block symbol name split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedBbName<'a> {
    pub info: BbInfo,
    /// The tag before `.BB.`; its length is the block index.
    pub index: &'a str,
    /// The function name after `.BB.`.
    pub func_name: &'a str,
}

/// Decode `name` as a basic-block symbol, or `None` if it is not one.
#[must_use]
pub fn parse(name: &str) -> Option<ParsedBbName<'_>> {
    let (index, func_name) = name.split_once(BASIC_BLOCK_SEPARATOR)?;
    if index.is_empty() || func_name.is_empty() {
        return None;
    }
    let mut last = '\0';
    for c in index.chars() {
        if !matches!(c.to_ascii_lowercase(), 'a' | 'r' | 'f') {
            return None;
        }
        last = c;
    }
    let kind = match last.to_ascii_lowercase() {
        'a' => BbKind::Normal,
        'r' => BbKind::Return,
        _ => BbKind::Fallthrough,
    };
    Some(ParsedBbName {
        info: BbInfo {
            kind,
            landing_pad: last.is_ascii_uppercase(),
        },
        index,
        func_name,
    })
}

/// True if `name` follows the basic-block naming convention.
#[must_use]
pub fn is_bb_symbol(name: &str) -> bool {
    parse(name).is_some()
}

/// Shorten a block-encoded name for display: `aaaa.BB.foo` becomes
/// `4.BB.foo`. Names without the separator pass through unchanged.
///
/// This intentionally does not validate the tag alphabet; any name that
/// splits on the separator is shortened, matching how names are rendered in
/// the profile.
#[must_use]
pub fn simplified(name: &str) -> String {
    match name.split_once(BASIC_BLOCK_SEPARATOR) {
        Some((tag, rest)) if !rest.is_empty() => {
            format!("{}{}", tag.len(), &name[tag.len()..])
        }
        _ => name.to_string(),
    }
}
