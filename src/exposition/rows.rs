//! Conversion of fetched report rows into samples.

use serde_json::Value;

use super::sample::{Labels, Sample};
use crate::fetch::Row;
use crate::query::MaterializedQuery;

/// Splits report rows into metric samples and labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowExporter {
    expose_zero_values: bool,
}

impl RowExporter {
    pub fn new(expose_zero_values: bool) -> Self {
        Self { expose_zero_values }
    }

    /// Samples for every metric column of every row.
    ///
    /// Each sample is named `<metric_prefix><column>` and labelled with the
    /// query's label columns. Non-numeric metric values are dropped, and so
    /// are zeros unless zero exposure is enabled.
    pub fn samples(&self, query: &MaterializedQuery, rows: &[Row]) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(rows.len() * query.metric_columns.len());
        for row in rows {
            let labels: Labels = query
                .label_columns
                .iter()
                .map(|column| (column.clone(), row.get(column).map(label_value).unwrap_or_default()))
                .collect();

            for column in &query.metric_columns {
                let Some(value) = row.get(column).and_then(metric_value) else {
                    tracing::trace!(collector = %query.collector, column = %column, "Skipping non-numeric value");
                    continue;
                };
                if value == 0.0 && !self.expose_zero_values {
                    continue;
                }
                samples.push(Sample {
                    name: query.metric_name(column),
                    value,
                    labels: labels.clone(),
                });
            }
        }
        samples
    }
}

/// Numeric reading of a metric cell. The reporting API returns 64-bit
/// integers as strings, so numeric strings are accepted.
fn metric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn label_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(label_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
