//! Post-aggregation analysis passes.

pub mod fallthrough;

pub use fallthrough::{expand_fallthroughs, FallthroughExpansion};
