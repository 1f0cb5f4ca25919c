//! Profile emission.
//!
//! This module turns the symbol index and the aggregated counters into the
//! textual profile consumed by the layout-aware link step.

pub mod profile_writer;

pub use profile_writer::{ProfileWriter, WriteStats};
