//! Address-ordered index over the binary's function and basic-block symbols.
//!
//! The index is built in two passes:
//!
//! 1. **Ingest** - every text symbol that is either a function or follows the
//!    basic-block naming convention is placed in an address bucket. Symbols
//!    co-located at the same address with the same size and the same
//!    block-or-not classification collapse into one entry with the extra
//!    names recorded as aliases. A name that appears at two different
//!    addresses is unreliable; both occurrences are discarded.
//!
//! 2. **Relate** - buckets are walked in ascending address order to link
//!    every basic block to its containing function, promote the matching
//!    alias to the function's canonical name, and strip block names down to
//!    their index tag. Blocks with no containing function are dropped along
//!    with their address bucket.
//!
//! Symbols live in an arena (`Vec<Symbol>`) and reference each other through
//! dense [`SymbolId`] indices, so there is no cyclic ownership between a
//! block and its containing function.

use crate::domain::errors::IndexError;
use crate::domain::types::SymbolId;
use crate::symbolization::bb_name::{self, BbInfo};
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::Excluded;

/// Function names that never participate in layout.
const EXCLUDED_SYMBOLS: &[&str] = &["__cxx_global_array_dtor"];

/// A symbol as it comes out of the binary's symbol table.
#[derive(Debug, Clone)]
pub struct RawSymbol {
    pub name: String,
    pub addr: u64,
    pub size: u64,
    /// Whether the symbol table marks this as a function.
    pub is_function: bool,
    /// Whether the symbol lives in an executable text section.
    pub in_text: bool,
}

/// A retained symbol: either a function or a basic block.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// 1-based position in the emitted profile; 0 until assigned.
    pub ordinal: u64,
    /// For a function the canonical name; for a basic block the index tag
    /// (the part before `.BB.`) once relating has finished.
    pub name: String,
    /// For a function, all names at this address; `aliases[0]` is always the
    /// canonical name. Basic blocks normally have no aliases.
    pub aliases: Vec<String>,
    pub addr: u64,
    pub size: u64,
    /// Whether the symbol table typed this entry (or any of its aliases) as
    /// a function.
    pub is_func: bool,
    /// Block kind and landing-pad flag; `None` for functions.
    pub bb_info: Option<BbInfo>,
    /// Referenced by a sample, or implied by a fallthrough path.
    pub hot: bool,
    /// The enclosing function; functions point at themselves.
    pub containing_func: Option<SymbolId>,
}

impl Symbol {
    #[must_use]
    pub fn is_bb(&self) -> bool {
        self.bb_info.is_some()
    }

    #[must_use]
    pub fn contains_address(&self, addr: u64) -> bool {
        self.addr <= addr && addr < self.addr + self.size
    }

    /// Whether `[addr, addr + size)` lies within this symbol's range. A
    /// zero-sized block sitting exactly on the end boundary still counts.
    #[must_use]
    pub fn contains_range(&self, addr: u64, size: u64) -> bool {
        self.addr <= addr && addr + size <= self.addr + self.size
    }
}

/// The symbol index: arena plus the address and name lookups over it.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    arena: Vec<Symbol>,
    /// Address buckets in ascending order. A bucket keeps insertion order;
    /// the emitter sorts it (functions first, then by name) when ordinals
    /// are assigned.
    addr_map: BTreeMap<u64, Vec<SymbolId>>,
    /// Original symbol name -> arena slot, for duplicate detection and
    /// population counting.
    name_map: HashMap<String, SymbolId>,
    dropped_bbs: u64,
}

impl SymbolIndex {
    /// Build the index from the binary's symbol table.
    ///
    /// # Errors
    /// Fails if two functions of different sizes share an address.
    pub fn build<I>(raw_symbols: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = RawSymbol>,
    {
        let mut index = SymbolIndex::default();
        for raw in raw_symbols {
            index.ingest(raw);
        }
        index.relate()?;
        Ok(index)
    }

    #[must_use]
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.arena[id.index()]
    }

    /// Number of basic-block symbols dropped for want of a containing
    /// function.
    #[must_use]
    pub fn dropped_bb_symbols(&self) -> u64 {
        self.dropped_bbs
    }

    /// Mark a symbol hot. Returns true if it was not hot before.
    pub fn mark_hot(&mut self, id: SymbolId) -> bool {
        let s = &mut self.arena[id.index()];
        let newly = !s.hot;
        s.hot = true;
        newly
    }

    /// `(functions, basic blocks)` currently indexed by name.
    #[must_use]
    pub fn population(&self) -> (u64, u64) {
        let mut funcs = 0;
        let mut bbs = 0;
        for id in self.name_map.values() {
            if self.arena[id.index()].is_bb() {
                bbs += 1;
            } else {
                funcs += 1;
            }
        }
        (funcs, bbs)
    }

    /// Address buckets strictly between `lo` and `hi`, ascending.
    pub fn buckets_between(
        &self,
        lo: u64,
        hi: u64,
    ) -> impl Iterator<Item = (u64, &[SymbolId])> + '_ {
        self.addr_map
            .range((Excluded(lo), Excluded(hi)))
            .map(|(addr, ids)| (*addr, ids.as_slice()))
    }

    /// Resolve an already-adjusted address to the smallest covering symbol.
    ///
    /// Looks up the greatest bucket at or below `addr`; among the bucket's
    /// symbols whose range covers `addr`, the one with the smallest size
    /// wins, ties broken by name.
    #[must_use]
    pub fn resolve_address(&self, addr: u64) -> Option<SymbolId> {
        let (_, ids) = self.addr_map.range(..=addr).next_back()?;
        let mut best: Option<SymbolId> = None;
        for &id in ids {
            let s = &self.arena[id.index()];
            if !s.contains_address(addr) {
                continue;
            }
            best = match best {
                None => Some(id),
                Some(prev) => {
                    let p = &self.arena[prev.index()];
                    if (s.size, s.name.as_str()) < (p.size, p.name.as_str()) {
                        Some(id)
                    } else {
                        Some(prev)
                    }
                }
            };
        }
        best
    }

    /// Assign ordinals in emission order and return the symbols in that
    /// order: buckets ascending by address, functions before basic blocks
    /// within a bucket (so a block never precedes its containing function),
    /// names as the tie break.
    pub fn assign_ordinals(&mut self) -> Vec<SymbolId> {
        let mut order = Vec::with_capacity(self.name_map.len());
        let arena = &self.arena;
        for ids in self.addr_map.values() {
            let mut bucket = ids.clone();
            bucket.sort_by(|a, b| {
                let (sa, sb) = (&arena[a.index()], &arena[b.index()]);
                sa.is_bb()
                    .cmp(&sb.is_bb())
                    .then_with(|| sa.name.cmp(&sb.name))
            });
            order.extend(bucket);
        }
        for (i, id) in order.iter().enumerate() {
            self.arena[id.index()].ordinal = (i + 1) as u64;
        }
        order
    }

    /// Display name: alias chain for functions, index tag for blocks.
    #[must_use]
    pub fn display_name(&self, id: SymbolId) -> String {
        let s = &self.arena[id.index()];
        if s.is_bb() || s.aliases.is_empty() {
            bb_name::simplified(&s.name)
        } else {
            s.aliases
                .iter()
                .map(|a| bb_name::simplified(a))
                .collect::<Vec<_>>()
                .join("/")
        }
    }

    /// `symbol 'name@0xADDR'`, for log messages.
    #[must_use]
    pub fn describe(&self, id: SymbolId) -> String {
        format!(
            "symbol '{}@{:#x}'",
            self.display_name(id),
            self.arena[id.index()].addr
        )
    }

    fn ingest(&mut self, raw: RawSymbol) {
        if !raw.in_text || raw.name.is_empty() {
            return;
        }
        let parsed = bb_name::parse(&raw.name);
        let bb_info = parsed.map(|p| p.info);
        let is_bb = bb_info.is_some();
        if !raw.is_function && !is_bb {
            return;
        }
        if raw.is_function && raw.size == 0 {
            return;
        }
        let match_name = parsed.map_or(raw.name.as_str(), |p| p.func_name);
        if EXCLUDED_SYMBOLS.contains(&match_name) {
            return;
        }

        // Same address, same size, same classification: record as an alias.
        let bucket_ids: Vec<SymbolId> = self
            .addr_map
            .get(&raw.addr)
            .cloned()
            .unwrap_or_default();
        for id in bucket_ids {
            let existing = &mut self.arena[id.index()];
            if existing.size == raw.size && existing.is_bb() == is_bb {
                existing.aliases.push(raw.name.clone());
                if raw.is_function && !existing.is_func {
                    // Any function-typed alias promotes the whole group.
                    existing.is_func = true;
                }
                return;
            }
        }

        // A name seen at two addresses: drop the incoming symbol and remove
        // the earlier one, both are unreliable.
        if let Some(&existing) = self.name_map.get(&raw.name) {
            info!(
                "Dropped duplicate symbol \"{}\". Consider using \
                 -funique-internal-funcnames to dedupe internal function names.",
                bb_name::simplified(&raw.name)
            );
            let existing_addr = self.arena[existing.index()].addr;
            if let Some(bucket) = self.addr_map.get_mut(&existing_addr) {
                let arena = &self.arena;
                bucket.retain(|id| arena[id.index()].name != raw.name);
            }
            self.name_map.remove(&raw.name);
            return;
        }

        let id = SymbolId(self.arena.len() as u32);
        let aliases = if is_bb {
            Vec::new()
        } else {
            vec![raw.name.clone()]
        };
        self.arena.push(Symbol {
            ordinal: 0,
            name: raw.name.clone(),
            aliases,
            addr: raw.addr,
            size: raw.size,
            is_func: raw.is_function,
            bb_info,
            hot: false,
            containing_func: None,
        });
        self.addr_map.entry(raw.addr).or_default().push(id);
        self.name_map.insert(raw.name, id);
    }

    /// Link every basic block to its containing function.
    fn relate(&mut self) -> Result<(), IndexError> {
        let addrs: Vec<u64> = self.addr_map.keys().copied().collect();
        let mut last_func_pos: Option<usize> = None;

        for (pos, &addr) in addrs.iter().enumerate() {
            let Some(ids) = self.addr_map.get(&addr).cloned() else {
                continue;
            };

            let mut func_count = 0;
            for &id in &ids {
                let s = &self.arena[id.index()];
                if s.is_func && !s.is_bb() {
                    func_count += 1;
                    if func_count > 1 {
                        return Err(IndexError::DuplicateFunctionsAtAddress { addr });
                    }
                    last_func_pos = Some(pos);
                }
            }

            for &id in &ids {
                if !self.arena[id.index()].is_bb() {
                    // A function wraps itself.
                    self.arena[id.index()].containing_func = Some(id);
                    continue;
                }

                let Some((tag, func_name)) = ({
                    let s = &self.arena[id.index()];
                    bb_name::parse(&s.name)
                        .map(|p| (p.index.to_string(), p.func_name.to_string()))
                }) else {
                    continue;
                };

                let mut containing = last_func_pos
                    .and_then(|lf| self.containing_candidate(addrs[lf], id, &func_name));
                if containing.is_none() {
                    if let Some(lf) = last_func_pos {
                        // The most recent function bucket can sit at the same
                        // address as a zero-sized trailing block of the
                        // previous function; seek lower addresses, looking at
                        // no more than two earlier function buckets.
                        let mut funcs_seen = 0;
                        let mut t = lf;
                        while t > 0 {
                            t -= 1;
                            containing = self.containing_candidate(addrs[t], id, &func_name);
                            if containing.is_some() {
                                break;
                            }
                            if self.bucket_has_function(addrs[t]) {
                                funcs_seen += 1;
                                if funcs_seen >= 2 {
                                    break;
                                }
                            }
                        }
                    }
                }

                match containing {
                    Some(func_id) => {
                        self.arena[id.index()].containing_func = Some(func_id);
                        self.promote_alias(func_id, &func_name);
                        self.arena[id.index()].name = tag;
                    }
                    None => {
                        warn!(
                            "Dropped bb symbol without any wrapping function: {}",
                            self.describe(id)
                        );
                        self.dropped_bbs += 1;
                        self.addr_map.remove(&addr);
                        break;
                    }
                }
            }
        }

        if self.dropped_bbs > 0 {
            info!("Dropped {} bb symbol(s).", self.dropped_bbs);
        }
        Ok(())
    }

    /// A function in the bucket at `bucket_addr` that wraps `bb_id` and
    /// answers to the block's decoded function name.
    fn containing_candidate(
        &self,
        bucket_addr: u64,
        bb_id: SymbolId,
        func_name: &str,
    ) -> Option<SymbolId> {
        let ids = self.addr_map.get(&bucket_addr)?;
        let bb = &self.arena[bb_id.index()];
        for &fid in ids {
            let f = &self.arena[fid.index()];
            if f.is_func
                && !f.is_bb()
                && f.contains_range(bb.addr, bb.size)
                && (f.name == func_name || f.aliases.iter().any(|a| a == func_name))
            {
                return Some(fid);
            }
        }
        None
    }

    fn bucket_has_function(&self, addr: u64) -> bool {
        self.addr_map
            .get(&addr)
            .is_some_and(|ids| ids.iter().any(|id| self.arena[id.index()].is_func))
    }

    /// Make the containing function's canonical name match the name the
    /// block was declared under, so the block always decodes against
    /// `containing_func.name`.
    fn promote_alias(&mut self, func_id: SymbolId, func_name: &str) {
        let f = &mut self.arena[func_id.index()];
        if f.name == func_name {
            return;
        }
        if let Some(pos) = f.aliases.iter().position(|a| a == func_name) {
            let alias = f.aliases.remove(pos);
            f.aliases.insert(0, alias);
            f.name.clone_from(&f.aliases[0]);
        }
    }
}
