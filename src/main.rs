//! Command-line entry point.
//!
//! Parses the arguments, drives [`blockprof::pipeline::run`] with the
//! perf.data reader, and reports the outcome. Every pipeline failure
//! surfaces as a non-zero exit code.

use anyhow::Result;
use blockprof::cli::Args;
use blockprof::pipeline::{self, Config};
use blockprof::profiling::PerfDataReader;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Config {
        binary_path: args.binary.clone(),
        trace_paths: args.trace_paths(),
        output_path: args.output.clone(),
        match_mmap_file: args.match_mmap_file.clone(),
        ignore_build_id: args.ignore_build_id,
    };

    println!("📦 Binary: {}", config.binary_path.display());
    println!(
        "📈 Traces: {}",
        config
            .trace_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let summary = pipeline::run(&config, &PerfDataReader)?;

    println!(
        "✓ Wrote {} symbols, {} branches, {} fallthroughs to {}",
        summary.symbols_written,
        summary.branches_written,
        summary.fallthroughs_written,
        config.output_path.display()
    );
    println!(
        "  {} hot functions, {} hot basic blocks from {} branch-stack records",
        summary.hot_functions, summary.hot_basic_blocks, summary.branch_stack_records
    );
    Ok(())
}
