//! Branch-stack aggregation and edge symbolization.
//!
//! Aggregation is two-phased. While traces stream in, branch stacks are
//! reduced to raw per-process counters keyed on `(from, to)` addresses: one
//! counter per observed branch, and one per implied fallthrough stretch
//! between adjacent stack entries. Once every trace is read, the raw branch
//! counters are resolved against the symbol index, edges are classified as
//! plain, call or return, and returns that land exactly on a block boundary
//! are rerouted to the call-site block they fell through from.

use crate::domain::types::{BranchKind, Pid, SymbolId};
use crate::profiling::trace::BranchEntry;
use crate::symbolization::{AddressTranslator, SymbolIndex};
use std::collections::{BTreeMap, HashMap};

/// Per-process counters keyed on raw `(from, to)` address pairs.
pub type RawCounters = BTreeMap<Pid, BTreeMap<(u64, u64), u64>>;

/// Accumulates raw branch and fallthrough counters across samples, PIDs and
/// trace files.
#[derive(Debug, Default)]
pub struct LbrAggregator {
    pub branch_counters: RawCounters,
    pub fallthrough_counters: RawCounters,
    /// Branch-stack entries seen, across all traces.
    pub branch_stack_records: u64,
}

impl LbrAggregator {
    /// Fold one sample's branch stack into the counters.
    ///
    /// The stack is stored newest-first, so it is walked back to front to
    /// see branches in execution order. Two adjacent entries `prev` and
    /// `cur` with `prev.to <= cur.from` imply that the stretch between them
    /// ran straight through; that stretch is counted as a fallthrough. The
    /// newest slot is skipped when it duplicates the entry before it, which
    /// some hardware is prone to produce.
    pub fn observe_sample(&mut self, pid: Pid, stack: &[BranchEntry]) {
        if stack.is_empty() {
            return;
        }
        self.branch_stack_records += stack.len() as u64;
        let branches = self.branch_counters.entry(pid).or_default();
        let fallthroughs = self.fallthrough_counters.entry(pid).or_default();
        let mut last: Option<BranchEntry> = None;
        for (i, entry) in stack.iter().enumerate().rev() {
            if i == 0 && last == Some(*entry) {
                continue;
            }
            *branches.entry((entry.from, entry.to)).or_insert(0) += 1;
            if let Some(prev) = last {
                if prev.to <= entry.from {
                    *fallthroughs.entry((prev.to, entry.from)).or_insert(0) += 1;
                }
            }
            last = Some(*entry);
        }
    }
}

/// Symbolized branch edges plus the bookkeeping the summary reports.
#[derive(Debug, Default)]
pub struct BranchSummary {
    /// `(from ordinal, to ordinal, kind) -> count`, already in emission
    /// order.
    pub edges: BTreeMap<(u64, u64, BranchKind), u64>,
    /// Fallthroughs synthesized by the return repair, merged later with the
    /// raw fallthrough counters.
    pub fallthroughs_by_symbol: HashMap<(SymbolId, SymbolId), u64>,
    pub total_counters: u64,
    pub counters_not_addressed: u64,
    pub cross_function_counters: u64,
}

/// Resolve the raw branch counters into symbolic, classified edges.
///
/// Ordinals must already be assigned: the resulting edge map is keyed on
/// them. Both endpoints of every resolvable pair are marked hot.
pub fn summarize_branches(
    aggregator: &LbrAggregator,
    index: &mut SymbolIndex,
    translator: &AddressTranslator,
) -> BranchSummary {
    let mut summary = BranchSummary::default();
    for (&pid, counters) in &aggregator.branch_counters {
        for (&(from, to), &cnt) in counters {
            let adjusted_to = translator.translate(pid, to);
            let from_sym = translator
                .translate(pid, from)
                .and_then(|addr| index.resolve_address(addr));
            let to_sym = adjusted_to.and_then(|addr| index.resolve_address(addr));

            record_hot(index, from_sym);
            record_hot(index, to_sym);

            summary.total_counters += cnt;
            let (Some(from_id), Some(mut to_id), Some(adjusted_to)) =
                (from_sym, to_sym, adjusted_to)
            else {
                summary.counters_not_addressed += cnt;
                continue;
            };
            let (Some(from_func), Some(to_func)) = (
                index.get(from_id).containing_func,
                index.get(to_id).containing_func,
            ) else {
                summary.counters_not_addressed += cnt;
                continue;
            };

            if from_func != to_func {
                summary.cross_function_counters += cnt;
            }

            // A return can land exactly on the start of a block that is not
            // the function entry: the call was the last instruction of the
            // preceding block. Attribute the edge to that call-site block
            // and record the fallthrough from it into the landing block.
            let to_func_addr = index.get(to_func).addr;
            if index.get(to_id).is_bb()
                && index.get(from_func).addr != to_func_addr
                && to_func_addr != adjusted_to
                && adjusted_to == index.get(to_id).addr
            {
                let call_site = translator
                    .translate(pid, to.wrapping_sub(1))
                    .and_then(|addr| index.resolve_address(addr));
                if let Some(cs) = call_site {
                    let cs_sym = index.get(cs);
                    if cs_sym.is_bb() && cs_sym.containing_func == Some(to_func) {
                        *summary
                            .fallthroughs_by_symbol
                            .entry((cs, to_id))
                            .or_insert(0) += cnt;
                        to_id = cs;
                    }
                }
            }

            let to_sym = index.get(to_id);
            let kind = if (to_sym.is_bb() && to_func_addr == adjusted_to)
                || (!to_sym.is_bb() && to_sym.is_func && to_sym.addr == adjusted_to)
            {
                BranchKind::Call
            } else if adjusted_to > to_sym.addr {
                BranchKind::Return
            } else {
                BranchKind::Plain
            };

            let from_ordinal = index.get(from_id).ordinal;
            let to_ordinal = index.get(to_id).ordinal;
            *summary
                .edges
                .entry((from_ordinal, to_ordinal, kind))
                .or_insert(0) += cnt;
        }
    }
    summary
}

fn record_hot(index: &mut SymbolIndex, id: Option<SymbolId>) {
    if let Some(id) = id {
        if index.get(id).containing_func.is_some() {
            index.mark_hot(id);
        }
    }
}
