//! Fallthrough symbolization and basic-block chain reconstruction.
//!
//! A raw fallthrough counter says "execution ran straight from address A to
//! address B". Symbolically that is a chain of basic blocks of one function,
//! laid out consecutively. This pass resolves the raw counters, merges them
//! with the fallthroughs synthesized by the return repair, and walks the
//! address buckets strictly between each pair's endpoints to find the blocks
//! the chain ran through, marking them hot.
//!
//! Reconstruction failures (endpoints in different functions, a gap with no
//! block, an implausibly long chain) are logged and leave the pair
//! unexpanded; the edge itself is still emitted.

use crate::domain::types::SymbolId;
use crate::profiling::lbr_aggregator::RawCounters;
use crate::symbolization::{AddressTranslator, SymbolIndex};
use log::warn;
use std::collections::HashMap;

/// Chains longer than this are treated as corrupt input for the pair.
const MAX_FALLTHROUGH_BBS: usize = 200;

/// Symbolic fallthrough edges plus expansion bookkeeping.
#[derive(Debug, Default)]
pub struct FallthroughExpansion {
    /// `((from, to), count)` in emission order, expanded or not.
    pub edges: Vec<((SymbolId, SymbolId), u64)>,
    /// Blocks newly marked hot by path expansion.
    pub extra_hot_bbs: u64,
    /// Counter mass contributed by expanded paths: `(path_len + 1) * count`
    /// per pair.
    pub extra_counters: u64,
}

/// Resolve raw fallthrough counters, merge in `seeded` pairs from the
/// return repair, and expand each pair's block chain.
///
/// Ordinals must already be assigned; the output is ordered by them.
pub fn expand_fallthroughs(
    index: &mut SymbolIndex,
    raw: &RawCounters,
    seeded: HashMap<(SymbolId, SymbolId), u64>,
    translator: &AddressTranslator,
) -> FallthroughExpansion {
    let mut by_symbol = seeded;
    for (&pid, counters) in raw {
        for (&(from, to), &cnt) in counters {
            let from_sym = translator
                .translate(pid, from)
                .and_then(|addr| index.resolve_address(addr));
            let to_sym = translator
                .translate(pid, to)
                .and_then(|addr| index.resolve_address(addr));
            if let (Some(f), Some(t)) = (from_sym, to_sym) {
                *by_symbol.entry((f, t)).or_insert(0) += cnt;
            }
        }
    }

    let mut pairs: Vec<_> = by_symbol.into_iter().collect();
    pairs.sort_by_key(|&((f, t), _)| (index.get(f).ordinal, index.get(t).ordinal));

    let mut expansion = FallthroughExpansion::default();
    for ((from, to), cnt) in pairs {
        if from != to {
            if let Some(path) = chain_between(index, from, to) {
                expansion.extra_counters += (path.len() as u64 + 1) * cnt;
                for id in path {
                    if index.mark_hot(id) {
                        expansion.extra_hot_bbs += 1;
                    }
                }
            }
        }
        expansion.edges.push(((from, to), cnt));
    }
    expansion
}

/// The blocks strictly between `from` and `to` in address order, or `None`
/// when the chain cannot be reconstructed.
fn chain_between(index: &SymbolIndex, from: SymbolId, to: SymbolId) -> Option<Vec<SymbolId>> {
    let (f, t) = (index.get(from), index.get(to));
    if f.addr > t.addr {
        warn!(
            "fallthrough path start address is larger than end address: {} -> {}",
            index.describe(from),
            index.describe(to)
        );
        return None;
    }
    let (Some(from_func), Some(to_func)) = (f.containing_func, t.containing_func) else {
        return None;
    };
    if from_func != to_func {
        warn!(
            "fallthrough ({} -> {}) does not start and end within the same function",
            index.describe(from),
            index.describe(to)
        );
        return None;
    }

    let mut path = Vec::new();
    for (_addr, ids) in index.buckets_between(f.addr, t.addr) {
        let mut found: Option<SymbolId> = None;
        for &id in ids {
            let s = index.get(id);
            if s.is_bb() && s.containing_func == Some(from_func) {
                if let Some(previous) = found {
                    warn!(
                        "fallthrough ({} -> {}) contains ambiguous {} and {}",
                        index.describe(from),
                        index.describe(to),
                        index.describe(previous),
                        index.describe(id)
                    );
                }
                // Ambiguous blocks are all kept on the path.
                path.push(id);
                found = Some(id);
            }
        }
        if found.is_none() {
            warn!(
                "failed to find a BB for fallthrough ({} -> {})",
                index.describe(from),
                index.describe(to)
            );
            return None;
        }
        if path.len() >= MAX_FALLTHROUGH_BBS {
            warn!(
                "too many BBs along fallthrough ({} -> {}), probably a bug",
                index.describe(from),
                index.describe(to)
            );
            return None;
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Pid;
    use crate::symbolization::symbol_index::RawSymbol;
    use crate::symbolization::MmapEntry;
    use std::collections::BTreeMap;

    fn sym(name: &str, addr: u64, size: u64, is_function: bool) -> RawSymbol {
        RawSymbol {
            name: name.to_string(),
            addr,
            size,
            is_function,
            in_text: true,
        }
    }

    fn fixture(symbols: Vec<RawSymbol>) -> (SymbolIndex, AddressTranslator) {
        let mut index = SymbolIndex::build(symbols).unwrap();
        index.assign_ordinals();
        let mut translator = AddressTranslator::new(false, BTreeMap::new());
        translator
            .registry_mut()
            .register(
                Pid(0),
                MmapEntry {
                    load_addr: 0x1000,
                    load_size: 0x10000,
                    page_offset: 0,
                },
            )
            .unwrap();
        (index, translator)
    }

    fn raw_pair(from: u64, to: u64, cnt: u64) -> RawCounters {
        let mut inner = BTreeMap::new();
        inner.insert((from, to), cnt);
        let mut raw = BTreeMap::new();
        raw.insert(Pid(0), inner);
        raw
    }

    #[test]
    fn test_chain_marks_intermediate_blocks_hot() {
        let (mut index, translator) = fixture(vec![
            sym("foo", 0x1000, 0x20, true),
            sym("a.BB.foo", 0x1000, 0x8, false),
            sym("aa.BB.foo", 0x1008, 0x8, false),
            sym("aaa.BB.foo", 0x1010, 0x8, false),
            sym("aaaa.BB.foo", 0x1018, 0x8, false),
        ]);
        let raw = raw_pair(0x1008, 0x1018, 3);
        let expansion = expand_fallthroughs(&mut index, &raw, HashMap::new(), &translator);

        assert_eq!(expansion.edges.len(), 1);
        let ((from, to), cnt) = expansion.edges[0];
        assert_eq!(index.get(from).addr, 0x1008);
        assert_eq!(index.get(to).addr, 0x1018);
        assert_eq!(cnt, 3);

        // One intermediate block at 0x1010, path length 1.
        assert_eq!(expansion.extra_hot_bbs, 1);
        assert_eq!(expansion.extra_counters, (1 + 1) * 3);
        let middle = index.resolve_address(0x1010).unwrap();
        assert!(index.get(middle).hot);
        // All intermediate addresses are strictly inside the pair.
        assert!(index.get(middle).addr > 0x1008 && index.get(middle).addr < 0x1018);
    }

    #[test]
    fn test_cross_function_pair_is_emitted_but_not_expanded() {
        let (mut index, translator) = fixture(vec![
            sym("foo", 0x1000, 0x10, true),
            sym("a.BB.foo", 0x1000, 0x10, false),
            sym("bar", 0x2000, 0x10, true),
            sym("a.BB.bar", 0x2000, 0x10, false),
        ]);
        let raw = raw_pair(0x1004, 0x2004, 2);
        let expansion = expand_fallthroughs(&mut index, &raw, HashMap::new(), &translator);
        assert_eq!(expansion.edges.len(), 1);
        assert_eq!(expansion.edges[0].1, 2);
        assert_eq!(expansion.extra_hot_bbs, 0);
        assert_eq!(expansion.extra_counters, 0);
    }

    #[test]
    fn test_gap_without_block_fails_the_expansion() {
        let (mut index, translator) = fixture(vec![
            sym("foo", 0x1000, 0x30, true),
            sym("a.BB.foo", 0x1000, 0x8, false),
            sym("aa.BB.foo", 0x1020, 0x8, false),
            // A foreign function's block sits in between.
            sym("bar", 0x1010, 0x8, true),
        ]);
        let raw = raw_pair(0x1004, 0x1024, 1);
        let expansion = expand_fallthroughs(&mut index, &raw, HashMap::new(), &translator);
        assert_eq!(expansion.edges.len(), 1);
        assert_eq!(expansion.extra_hot_bbs, 0);
        assert_eq!(expansion.extra_counters, 0);
    }

    #[test]
    fn test_ambiguous_bucket_keeps_all_candidates_on_the_path() {
        let (mut index, translator) = fixture(vec![
            sym("foo", 0x1000, 0x20, true),
            sym("a.BB.foo", 0x1000, 0x8, false),
            // Two differently-sized blocks of the same function at 0x1008.
            sym("aa.BB.foo", 0x1008, 0x4, false),
            sym("aaa.BB.foo", 0x1008, 0x8, false),
            sym("aaaa.BB.foo", 0x1010, 0x8, false),
        ]);
        let raw = raw_pair(0x1004, 0x1014, 1);
        let expansion = expand_fallthroughs(&mut index, &raw, HashMap::new(), &translator);
        assert_eq!(expansion.extra_hot_bbs, 2);
        assert_eq!(expansion.extra_counters, (2 + 1) * 1);
    }

    #[test]
    fn test_overlong_chain_is_rejected() {
        let mut symbols = vec![sym("foo", 0x1000, 0x1000, true)];
        for i in 0..=202 {
            let name = format!("{}.BB.foo", "a".repeat(i + 1));
            symbols.push(sym(&name, 0x1000 + (i as u64) * 8, 8, false));
        }
        let (mut index, translator) = fixture(symbols);
        let first = 0x1000;
        let last = 0x1000 + 202 * 8;
        let raw = raw_pair(first + 1, last + 1, 1);
        let expansion = expand_fallthroughs(&mut index, &raw, HashMap::new(), &translator);
        assert_eq!(expansion.edges.len(), 1);
        assert_eq!(expansion.extra_hot_bbs, 0);
        assert_eq!(expansion.extra_counters, 0);
    }

    #[test]
    fn test_seeded_pairs_merge_with_resolved_counters() {
        let (mut index, translator) = fixture(vec![
            sym("foo", 0x1000, 0x20, true),
            sym("a.BB.foo", 0x1000, 0x8, false),
            sym("aa.BB.foo", 0x1008, 0x8, false),
        ]);
        let from = index.resolve_address(0x1004).unwrap();
        let to = index.resolve_address(0x1008).unwrap();
        let mut seeded = HashMap::new();
        seeded.insert((from, to), 5);
        let raw = raw_pair(0x1004, 0x1008, 2);
        let expansion = expand_fallthroughs(&mut index, &raw, seeded, &translator);
        assert_eq!(expansion.edges, vec![((from, to), 7)]);
        // Adjacent blocks: nothing strictly in between.
        assert_eq!(expansion.extra_counters, 0);
    }
}
