//! Structured error types for blockprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Indexing-phase integrity problems are fatal; aggregation-phase problems
//! are downgraded to warnings at the call sites and never surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading and validating the profiled binary.
#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("failed to read binary {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path:?} is not a valid ELF file")]
    NotElf { path: PathBuf },

    #[error("{path:?} is not a valid object file: {source}")]
    Parse {
        path: PathBuf,
        source: object::read::Error,
    },

    #[error("no loadable executable segment found in {path:?}")]
    NoExecutableSegment { path: PathBuf },

    #[error(
        "invalid program headers: executable segment at {vaddr:#x} has \
         conflicting sizes {existing:#x} and {conflicting:#x}"
    )]
    SegmentSizeMismatch {
        vaddr: u64,
        existing: u64,
        conflicting: u64,
    },
}

/// Errors raised while building the symbol index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("at address {addr:#x} there are more than 1 functions that have different sizes")]
    DuplicateFunctionsAtAddress { addr: u64 },
}

/// Errors raised while reading perf traces and aggregating samples.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path:?} is not a perf.data file")]
    BadMagic { path: PathBuf },

    #[error("{path:?} was recorded on a big-endian machine, which is not supported")]
    BigEndian { path: PathBuf },

    #[error("{path:?}: malformed {what} at offset {offset:#x}")]
    Malformed {
        path: PathBuf,
        what: &'static str,
        offset: u64,
    },

    #[error(
        "conflicting mmap event for pid {pid}: [{start:#x}, {end:#x}) overlaps an existing mapping"
    )]
    MmapConflict { pid: u32, start: u64, end: u64 },

    #[error(
        "binary name is not specific enough: it matches both '{first}' and '{second}'; \
         consider an absolute --match-mmap-file"
    )]
    AmbiguousBinaryName { first: String, second: String },

    #[error("no file with matching build id in {path:?}")]
    BuildIdMismatch { path: PathBuf },

    #[error("failed to find mmap events for the binary in {path:?}")]
    NoMmapEvents { path: PathBuf },

    #[error("too few branch-stack records (only {count} record(s) found), cannot continue")]
    InsufficientRecords { count: u64 },
}
