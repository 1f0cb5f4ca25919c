//! Per-process memory-map registry and PIE address translation.
//!
//! Samples carry runtime addresses. For a position-independent executable
//! the runtime load base differs per process, so every sample address has to
//! be translated back into the link-time image before it can be resolved
//! against the symbol index: the covering mmap turns the runtime address
//! into a file offset, and the vaddr of the lowest executable load segment
//! rebases that offset into the image. Non-PIE binaries load at their link
//! addresses and every process is collapsed onto pid 0.

use crate::domain::errors::TraceError;
use crate::domain::types::Pid;
use log::info;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One executable mapping of the profiled binary in some process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MmapEntry {
    pub load_addr: u64,
    pub load_size: u64,
    pub page_offset: u64,
}

impl MmapEntry {
    #[must_use]
    pub fn end_addr(&self) -> u64 {
        self.load_addr + self.load_size
    }

    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.load_addr <= addr && addr < self.end_addr()
    }
}

impl fmt::Display for MmapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#x}, {:#x}] (PgOff={:#x}, Size={:#x})",
            self.load_addr,
            self.end_addr(),
            self.page_offset,
            self.load_size
        )
    }
}

/// Mmap entries grouped by process.
///
/// Within one process, entries must not overlap unless they are identical;
/// re-registering an identical mapping is a no-op.
#[derive(Debug, Default)]
pub struct MmapRegistry {
    by_pid: BTreeMap<Pid, BTreeSet<MmapEntry>>,
}

impl MmapRegistry {
    /// Record a mapping for `pid`.
    ///
    /// # Errors
    /// Fails when the mapping overlaps a different existing mapping of the
    /// same process.
    pub fn register(&mut self, pid: Pid, entry: MmapEntry) -> Result<(), TraceError> {
        let entries = self.by_pid.entry(pid).or_default();
        for existing in entries.iter() {
            if *existing == entry {
                return Ok(());
            }
            let disjoint = entry.end_addr() <= existing.load_addr
                || existing.end_addr() <= entry.load_addr;
            if !disjoint {
                return Err(TraceError::MmapConflict {
                    pid: pid.0,
                    start: entry.load_addr,
                    end: entry.end_addr(),
                });
            }
        }
        entries.insert(entry);
        Ok(())
    }

    #[must_use]
    pub fn contains_pid(&self, pid: Pid) -> bool {
        self.by_pid.contains_key(&pid)
    }

    #[must_use]
    pub fn find(&self, pid: Pid, addr: u64) -> Option<&MmapEntry> {
        self.by_pid
            .get(&pid)?
            .iter()
            .find(|entry| entry.contains(addr))
    }

    /// Total entries across all processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_pid.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log every process's mappings, the way they were found in `trace`.
    pub fn log_entries(&self, trace: &str, binary: &str) {
        for (pid, entries) in &self.by_pid {
            let mut lines = format!(
                "Found mmap in '{trace}' for binary: '{binary}', pid={pid} \
                 (0 for non-pie executables)\n"
            );
            for entry in entries {
                lines.push_str(&format!("\t{entry}\n"));
            }
            info!("{lines}");
        }
    }
}

/// Translates raw sample addresses into link-time addresses.
#[derive(Debug)]
pub struct AddressTranslator {
    pie: bool,
    /// Executable load segments, vaddr -> memsz, ascending.
    exec_segments: BTreeMap<u64, u64>,
    registry: MmapRegistry,
}

impl AddressTranslator {
    #[must_use]
    pub fn new(pie: bool, exec_segments: BTreeMap<u64, u64>) -> Self {
        AddressTranslator {
            pie,
            exec_segments,
            registry: MmapRegistry::default(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &MmapRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MmapRegistry {
        &mut self.registry
    }

    /// The registry key for a sample's process: the real pid for PIE
    /// binaries, pid 0 otherwise.
    #[must_use]
    pub fn pid_key(&self, pid: Pid) -> Pid {
        if self.pie {
            pid
        } else {
            Pid(0)
        }
    }

    /// Translate a raw sample address, or `None` when no mapping of the
    /// process covers it.
    ///
    /// For PIE: the covering mmap rebases the address into a file offset
    /// (`raw - load_addr + page_offset`), and the vaddr of the lowest
    /// executable load segment is subtracted to land in the link-time image.
    /// For non-PIE binaries the raw address is already a link-time address.
    #[must_use]
    pub fn translate(&self, pid: Pid, raw: u64) -> Option<u64> {
        let entry = self.registry.find(pid, raw)?;
        if !self.pie {
            return Some(raw);
        }
        let file_offset = raw
            .wrapping_sub(entry.load_addr)
            .wrapping_add(entry.page_offset);
        let base = self.exec_segments.keys().next().copied()?;
        Some(file_offset.wrapping_sub(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(load_addr: u64, load_size: u64, page_offset: u64) -> MmapEntry {
        MmapEntry {
            load_addr,
            load_size,
            page_offset,
        }
    }

    #[test]
    fn test_registry_accepts_disjoint_and_identical_entries() {
        let mut registry = MmapRegistry::default();
        registry.register(Pid(1), entry(0x1000, 0x1000, 0)).unwrap();
        registry.register(Pid(1), entry(0x3000, 0x1000, 0x2000)).unwrap();
        // Identical re-registration is idempotent.
        registry.register(Pid(1), entry(0x1000, 0x1000, 0)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_rejects_overlapping_entries() {
        let mut registry = MmapRegistry::default();
        registry.register(Pid(1), entry(0x1000, 0x1000, 0)).unwrap();
        let err = registry
            .register(Pid(1), entry(0x1800, 0x1000, 0))
            .unwrap_err();
        assert!(matches!(err, TraceError::MmapConflict { pid: 1, .. }));
        // The same range in another process is fine.
        registry.register(Pid(2), entry(0x1800, 0x1000, 0)).unwrap();
    }

    #[test]
    fn test_non_pie_translation_is_identity_within_a_mapping() {
        let mut translator = AddressTranslator::new(false, BTreeMap::new());
        translator
            .registry_mut()
            .register(Pid(0), entry(0x1000, 0x2000, 0))
            .unwrap();
        assert_eq!(translator.translate(Pid(0), 0x1500), Some(0x1500));
        assert_eq!(translator.translate(Pid(0), 0x4000), None);
        assert_eq!(translator.translate(Pid(7), 0x1500), None);
    }

    #[test]
    fn test_pie_translation_rebases_through_the_file_offset() {
        // Executable segment linked at vaddr 0x1000; runtime mapping at
        // 0x5555_0000 with page offset 0x1000. A raw address 0x5555_0234
        // is file offset 0x1234, and the lowest executable segment vaddr
        // is subtracted from it.
        let mut segments = BTreeMap::new();
        segments.insert(0x1000_u64, 0x4000_u64);
        segments.insert(0x8000_u64, 0x1000_u64);
        let mut translator = AddressTranslator::new(true, segments);
        translator
            .registry_mut()
            .register(Pid(42), entry(0x5555_0000, 0x10000, 0x1000))
            .unwrap();
        assert_eq!(translator.translate(Pid(42), 0x5555_0234), Some(0x234));
        assert_eq!(translator.translate(Pid(42), 0x4000_0000), None);
    }

    #[test]
    fn test_pid_key_collapses_for_non_pie() {
        let pie = AddressTranslator::new(true, BTreeMap::new());
        let fixed = AddressTranslator::new(false, BTreeMap::new());
        assert_eq!(pie.pid_key(Pid(42)), Pid(42));
        assert_eq!(fixed.pid_key(Pid(42)), Pid(0));
    }

    #[test]
    fn test_mmap_entry_display() {
        let e = entry(0x1000, 0x2000, 0x40);
        assert_eq!(e.to_string(), "[0x1000, 0x3000] (PgOff=0x40, Size=0x2000)");
    }
}
