//! Event model shared between trace readers and the aggregator.
//!
//! A trace is read in full before any symbolization happens; the reader
//! hands back the event sequence plus the trace's build-id table. The
//! [`TraceReader`] trait is the seam that lets tests drive the pipeline with
//! in-memory traces.

use crate::domain::errors::TraceError;
use crate::domain::types::Pid;
use std::fmt::Write as _;
use std::path::Path;

/// Fixed on-wire size of a build id: longer ids are truncated, shorter ones
/// zero-padded.
pub const BUILD_ID_SIZE: usize = 20;

/// One `(from, to)` pair out of a hardware branch stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchEntry {
    pub from: u64,
    pub to: u64,
}

/// A mapping of some file into a process's address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmapEvent {
    pub pid: Pid,
    pub start: u64,
    pub len: u64,
    pub page_offset: u64,
    pub filename: String,
}

/// A sample carrying a branch stack, newest entry first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEvent {
    pub pid: Pid,
    pub branch_stack: Vec<BranchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Mmap(MmapEvent),
    Sample(SampleEvent),
}

/// `(filename, build id)` association recorded in the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdRecord {
    pub filename: String,
    pub build_id: Vec<u8>,
}

/// A fully-read trace file.
#[derive(Debug, Clone, Default)]
pub struct TraceFile {
    pub events: Vec<TraceEvent>,
    pub build_ids: Vec<BuildIdRecord>,
}

/// Reads one trace file into memory.
pub trait TraceReader {
    /// # Errors
    /// Fails on unreadable or structurally invalid input.
    fn load(&self, path: &Path) -> Result<TraceFile, TraceError>;
}

/// Normalize a build id to its fixed on-wire size.
#[must_use]
pub fn normalize_build_id(raw: &[u8]) -> [u8; BUILD_ID_SIZE] {
    let mut id = [0u8; BUILD_ID_SIZE];
    let n = raw.len().min(BUILD_ID_SIZE);
    id[..n].copy_from_slice(&raw[..n]);
    id
}

/// Render a build id as 40 hex digits.
#[must_use]
pub fn format_build_id(raw: &[u8]) -> String {
    let mut out = String::with_capacity(BUILD_ID_SIZE * 2);
    for byte in normalize_build_id(raw) {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
