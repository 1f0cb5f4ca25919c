//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing a raw arena index
//! where a process ID is expected, and make function signatures more
//! expressive.

use std::fmt;

/// Process ID as recorded in a perf trace.
///
/// For non-PIE binaries every process shares the same load addresses, so all
/// samples are collapsed onto `Pid(0)` before they reach the mmap registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a symbol in the symbol arena.
///
/// Symbols reference each other (a basic block points at its containing
/// function) through these dense indices instead of pointers, so the whole
/// table lives in one `Vec` with no cyclic ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Classification of a branch edge in the emitted profile.
///
/// Rendered as a trailing character on the branch line: nothing for `Plain`,
/// `C` for calls, `R` for returns. The derived ordering matches the render
/// characters (`' ' < 'C' < 'R'`), which keeps the emitted branch section
/// stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BranchKind {
    /// Ordinary jump within a function.
    Plain,
    /// Transfer to the entry of a function.
    Call,
    /// Transfer into the middle of a basic block.
    Return,
}

impl BranchKind {
    /// Character used for this kind in the profile, if any.
    #[must_use]
    pub fn suffix(self) -> Option<char> {
        match self {
            BranchKind::Plain => None,
            BranchKind::Call => Some('C'),
            BranchKind::Return => Some('R'),
        }
    }
}
