//! ads-exporter - Advertising Metrics Exporter
//!
//! Periodically runs named report queries ("collectors") against an
//! advertising reporting API and exposes the results as Prometheus time series.
//! It can be used as a library, or run as a standalone binary with the
//! `ads-exporter` executable.
//!
//! # Architecture
//!
//! - **Catalog**: Validated, immutable collector definitions
//! - **Registry**: Named groups of collectors derived from the catalog
//! - **Selector**: Resolves a selection string into an ordered collector set
//! - **Query**: Binds definitions, macros and overrides into query text
//! - **Fetch / Exposition**: Report retrieval and Prometheus exposition
//! - **Exporter**: The delay-driven scrape loop
//!
//! # Example
//!
//! ```
//! use ads_exporter::{CollectorStore, DefinitionSource, RegistryIndex, Selection, resolve};
//!
//! let store = CollectorStore::load(DefinitionSource::builtin().unwrap()).unwrap();
//! let index = RegistryIndex::from_store(&store);
//!
//! let resolved = resolve(&Selection::parse("search_terms"), &store, &index).unwrap();
//! assert_eq!(resolved.names(), ["search_terms", "search_terms_conversion_split"]);
//! ```

pub mod catalog;
pub mod config;
pub mod exporter;
pub mod exposition;
pub mod fetch;
pub mod query;
pub mod registry;
pub mod selector;
pub mod server;
pub mod testing;

pub use catalog::{CatalogError, CollectorDefinition, CollectorStore, DefinitionSource};
pub use exporter::{Exporter, ExporterOptions, IterationReport, StatusHandle};
pub use exposition::{ExpositionSink, GaugeRegistry, Sample};
pub use fetch::{DryRunFetcher, FetchError, ReportFetcher, Row};
pub use query::{MacroError, Macros, MaterializeError, MaterializedQuery, Materializer, Overrides};
pub use registry::RegistryIndex;
pub use selector::{ResolveError, ResolvedCollectorSet, Resolver, Selection, resolve};
