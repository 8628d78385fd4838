//! Collector Catalog
//!
//! Loads, validates and holds the collector definitions the exporter can run.
//!
//! # Components
//!
//! - [`DefinitionSource`]: Raw definition records from the bundled catalog or user files
//! - [`CollectorDefinition`]: A validated, named query bundle
//! - [`CollectorStore`]: Immutable catalog keyed by collector name
//! - [`CollectorLevel`]: Entity level a collector reports at

mod definition;
mod error;
mod level;
mod source;
mod store;

pub use definition::{
    CONVERSION_SPLIT_SUFFIX, CollectorDefinition, CollectorKind, Customizable,
    DEFAULT_SERVICE_ALIAS, QueryField, QuerySpec, REMOVE_SUFFIX, RawDefinition, RawField,
    RawFieldSpec, RawKind, RawQuerySpec, RawServiceSpec, Suffix,
};
pub(crate) use definition::parse_field_list;
pub use error::CatalogError;
pub use level::{CollectorLevel, LevelInfo};
pub use source::DefinitionSource;
pub use store::CollectorStore;
