//! Scrape Loop
//!
//! Runs the collector pipeline on a fixed delay: resolve the selection,
//! plan and materialize every collector, fetch reports and expose the samples.
//!
//! # Components
//!
//! - [`Exporter`]: Iteration runner and delay loop
//! - [`CollectorPlan`]: Deduplication and `mapping` insertion after resolution
//! - [`ExporterOptions`]: Namespace, delay, parallelism and account settings
//! - [`IterationReport`]: Outcome of one iteration
//! - [`StatusHandle`]: Latest report shared with the HTTP server

mod plan;
mod report;
mod runner;

pub use plan::{
    CollectorPlan, DroppedCollector, MAPPING_COLLECTOR, PlanOptions, is_similar, mapping_collector,
};
pub use report::{IterationReport, SkipStage, SkippedCollector, StatusHandle};
pub use runner::{
    DEFAULT_DELAY, DEFAULT_FETCHING_TIMEOUT, DEFAULT_MAX_PARALLEL, DEFAULT_NAMESPACE, Exporter,
    ExporterOptions,
};
