//! # blockprof - Basic-Block Layout Profile Generator
//!
//! blockprof converts hardware branch-sampling profiles (LBR stacks recorded
//! by `perf record -b`) into a symbolic, per-basic-block profile that a
//! layout-aware link step can consume. It reads an executable whose basic
//! blocks are demarcated by specially-named symbols (`<tag>.BB.<function>`),
//! resolves every sampled branch against those symbols, and writes a textual
//! profile of hot functions, hot blocks, weighted branch edges and weighted
//! fallthrough chains.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐        ┌─────────────────────┐
//! │  ELF binary  │───────▶│    Symbol index     │
//! │ (BB symbols) │        │ (addr buckets, BB ↔ │
//! └──────────────┘        │  function links)    │
//!                         └─────────┬───────────┘
//! ┌──────────────┐        ┌─────────▼───────────┐      ┌──────────────┐
//! │  perf.data   │───────▶│   LBR aggregator    │─────▶│ Fallthrough  │
//! │ (mmap events,│  mmap  │ (PIE translation,   │      │  expander    │
//! │  LBR stacks) │ registry  edge classification)│      └──────┬───────┘
//! └──────────────┘        └─────────┬───────────┘             │
//!                                   │                         │
//!                         ┌─────────▼─────────────────────────▼──┐
//!                         │               Emitter                │
//!                         │ (Symbols / Branches / Fallthroughs / │
//!                         │            hot list)                 │
//!                         └──────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`symbolization`]: everything derived from the binary
//!   - `bb_name`: codec for the `<tag>.BB.<function>` naming convention
//!   - `symbol_index`: address-ordered symbol arena with alias merging and
//!     block-to-function linking
//!   - `memory_map`: per-process mmap registry and PIE address translation
//!   - `binary`: ELF loading via the `object` crate
//!
//! - [`profiling`]: everything derived from the traces
//!   - `trace`: the event model and the `TraceReader` seam
//!   - `perf_data`: perf.data file-format reader
//!   - `lbr_aggregator`: branch-stack walking, raw counters, edge
//!     classification and return-repair
//!
//! - [`analysis`]: fallthrough chain reconstruction over the symbol index
//!
//! - [`export`]: the profile writer
//!
//! - [`pipeline`]: orchestration and the closing summary
//!
//! - [`cli`], [`domain`]: argument parsing, newtypes and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! perf record -b -e cycles:u -- ./my_app
//! blockprof ./my_app perf.data profile.txt
//! ```

pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod pipeline;
pub mod profiling;
pub mod symbolization;
