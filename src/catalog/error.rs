//! Catalog error types.
//!
//! Every error here is a load-time error: the exporter refuses to start with a
//! malformed catalog.

use thiserror::Error;

/// Errors raised while loading or querying the collector catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The same source defines one collector name twice.
    #[error("duplicate collector '{name}' in {origin}")]
    DuplicateName { name: String, origin: String },

    /// A definition is missing a required field or carries an invalid value.
    #[error("invalid collector definition{}: {reason}", display_collector(.collector))]
    Schema {
        collector: Option<String>,
        reason: String,
    },

    /// No collector with this name exists.
    #[error("collector not found: '{0}'")]
    NotFound(String),

    /// Failed to read a definition source.
    #[error("failed to read collector definitions from {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a definition source.
    #[error("failed to parse collector definitions from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl CatalogError {
    pub(crate) fn schema(collector: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Schema {
            collector: collector.map(str::to_owned),
            reason: reason.into(),
        }
    }
}

fn display_collector(collector: &Option<String>) -> String {
    collector
        .as_deref()
        .map(|name| format!(" '{name}'"))
        .unwrap_or_default()
}
