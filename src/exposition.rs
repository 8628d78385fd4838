//! Exposition Adapter
//!
//! Turns fetched report rows into time series and exposes them.
//!
//! # Components
//!
//! - [`Sample`]: One (name, value, labels) point
//! - [`ExpositionSink`]: Destination for samples
//! - [`GaugeRegistry`]: In-process sink rendered as Prometheus text
//! - [`RowExporter`]: Splits rows into metric samples and labels
//! - [`ServiceGauges`]: Exporter self-monitoring gauges

mod gauge;
mod rows;
mod sample;
mod service;

pub use gauge::GaugeRegistry;
pub use rows::RowExporter;
pub use sample::{ExpositionError, ExpositionSink, Labels, Sample, sanitize_name};
pub use service::ServiceGauges;
