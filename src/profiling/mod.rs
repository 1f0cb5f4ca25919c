//! Trace-side half of the pipeline: the perf.data reader, the event model
//! it produces, and the branch-stack aggregation over those events.

pub mod lbr_aggregator;
pub mod perf_data;
pub mod trace;

pub use lbr_aggregator::{summarize_branches, BranchSummary, LbrAggregator};
pub use perf_data::PerfDataReader;
pub use trace::{TraceEvent, TraceFile, TraceReader};
