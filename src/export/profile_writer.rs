//! Writer for the textual profile format.
//!
//! The profile has five parts, in order:
//!
//! 1. `@<basename>` lines naming the profiled binary,
//! 2. a `Symbols` section: one line per symbol in ordinal order; function
//!    lines carry the alias chain, block lines reference their function's
//!    ordinal and their block index,
//! 3. a `Branches` section: `<from> <to> <count>` with a trailing `C` or `R`
//!    for calls and returns,
//! 4. a `Fallthroughs` section: `<from> <to> <count>`,
//! 5. the hot list: `!<function>` lines with `!!<block index>` lines under
//!    them.
//!
//! All numbers are decimal except symbol sizes, which are bare hex.

use crate::domain::types::{BranchKind, SymbolId};
use crate::symbolization::SymbolIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};

/// Counts of what has been written, for the closing summary.
#[derive(Debug, Default)]
pub struct WriteStats {
    pub symbols_written: u64,
    pub branches_written: u64,
    pub fallthroughs_written: u64,
    /// Blocks per function ordinal, counted while the symbol section is
    /// written.
    pub func_bb_count: HashMap<u64, u64>,
}

/// Streams the profile to `out`, tracking section statistics.
pub struct ProfileWriter<W: Write> {
    out: W,
    pub stats: WriteStats,
}

impl<W: Write> ProfileWriter<W> {
    pub fn new(out: W) -> Self {
        ProfileWriter {
            out,
            stats: WriteStats::default(),
        }
    }

    /// Emit the deduplicated `@<basename>` preamble.
    ///
    /// # Errors
    /// Propagates output stream failures, as do all the section writers.
    pub fn write_name_list(&mut self, names: &BTreeSet<String>) -> io::Result<()> {
        for name in names {
            if !name.is_empty() {
                writeln!(self.out, "@{name}")?;
            }
        }
        Ok(())
    }

    /// Emit the symbol section. `order` must be the ordinal-assignment
    /// order, so functions precede the blocks sharing their address.
    pub fn write_symbols(&mut self, index: &SymbolIndex, order: &[SymbolId]) -> io::Result<()> {
        writeln!(self.out, "Symbols")?;
        for &id in order {
            let symbol = index.get(id);
            if symbol.is_bb() {
                let Some(func) = symbol.containing_func else {
                    continue;
                };
                let func_ordinal = index.get(func).ordinal;
                writeln!(
                    self.out,
                    "{} {:x} {}.{}",
                    symbol.ordinal,
                    symbol.size,
                    func_ordinal,
                    symbol.name.len()
                )?;
                *self.stats.func_bb_count.entry(func_ordinal).or_insert(0) += 1;
            } else {
                writeln!(
                    self.out,
                    "{} {:x} N{}",
                    symbol.ordinal,
                    symbol.size,
                    index.display_name(id)
                )?;
            }
            self.stats.symbols_written += 1;
        }
        Ok(())
    }

    /// Emit the branch section; the map key order is the emission order.
    pub fn write_branches(
        &mut self,
        edges: &BTreeMap<(u64, u64, BranchKind), u64>,
    ) -> io::Result<()> {
        writeln!(self.out, "Branches")?;
        for (&(from, to, kind), &count) in edges {
            match kind.suffix() {
                Some(tag) => writeln!(self.out, "{from} {to} {count} {tag}")?,
                None => writeln!(self.out, "{from} {to} {count}")?,
            }
            self.stats.branches_written += 1;
        }
        Ok(())
    }

    /// Emit the fallthrough section in the given (ordinal) order.
    pub fn write_fallthroughs(
        &mut self,
        index: &SymbolIndex,
        edges: &[((SymbolId, SymbolId), u64)],
    ) -> io::Result<()> {
        writeln!(self.out, "Fallthroughs")?;
        for &((from, to), count) in edges {
            writeln!(
                self.out,
                "{} {} {}",
                index.get(from).ordinal,
                index.get(to).ordinal,
                count
            )?;
            self.stats.fallthroughs_written += 1;
        }
        Ok(())
    }

    /// Emit the hot-list trailer: hot symbols in ordinal order, blocks
    /// grouped under a single line for their containing function.
    pub fn write_hot_list(&mut self, index: &SymbolIndex, order: &[SymbolId]) -> io::Result<()> {
        let mut last_func: Option<SymbolId> = None;
        for &id in order {
            let symbol = index.get(id);
            if !symbol.hot {
                continue;
            }
            if symbol.is_bb() {
                let Some(func) = symbol.containing_func else {
                    continue;
                };
                if last_func != Some(func) {
                    writeln!(self.out, "!{}", index.display_name(func))?;
                    last_func = Some(func);
                }
                writeln!(self.out, "!!{}", symbol.name.len())?;
            } else {
                writeln!(self.out, "!{}", index.display_name(id))?;
                last_func = Some(id);
            }
        }
        Ok(())
    }

    /// Flush and hand back the underlying stream.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
