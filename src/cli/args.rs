//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Turn LBR branch-sampling profiles into a basic-block layout profile")]
pub struct Args {
    /// Profiled ELF binary with basic-block symbols
    pub binary: PathBuf,

    /// Comma-separated list of perf.data files
    pub perf_traces: String,

    /// Output profile path
    pub output: PathBuf,

    /// Match mmap event file path (defaults to the build-id match or the
    /// binary path)
    #[arg(long, default_value = "")]
    pub match_mmap_file: String,

    /// Ignore build id match
    #[arg(long)]
    pub ignore_build_id: bool,
}

impl Args {
    /// The trace list, split on commas, empty entries dropped.
    #[must_use]
    pub fn trace_paths(&self) -> Vec<PathBuf> {
        self.perf_traces
            .split(',')
            .filter(|part| !part.is_empty())
            .map(PathBuf::from)
            .collect()
    }
}
