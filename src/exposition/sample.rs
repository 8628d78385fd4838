//! Time series points handed to an exposition sink.

use std::collections::BTreeMap;

use thiserror::Error;

/// Label name to label value.
pub type Labels = BTreeMap<String, String>;

/// One point of one time series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels.extend(labels);
        self
    }
}

/// Errors raised while recording or rendering samples.
#[derive(Debug, Error)]
pub enum ExpositionError {
    /// The metrics registry rejected a metric family.
    #[error("failed to register metric '{name}': {source}")]
    Registration {
        name: String,
        source: prometheus::Error,
    },

    /// Text encoding of the gathered families failed.
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

/// Receives time series points.
///
/// Implementations must be shareable across the fetch tasks of one iteration.
pub trait ExpositionSink: Send + Sync {
    /// Set a gauge to `sample.value`, last write wins.
    fn set_gauge(&self, sample: &Sample) -> Result<(), ExpositionError>;

    /// Add `sample.value` to a gauge, starting from zero.
    fn add_gauge(&self, sample: &Sample) -> Result<(), ExpositionError>;
}

/// Make a string usable as a metric or label name.
///
/// Characters outside `[a-zA-Z0-9_]` become `_`; a leading digit gets a `_`
/// prefix.
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
