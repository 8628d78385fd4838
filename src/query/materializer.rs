//! Query materializer.
//!
//! Binds a collector definition, runtime macros and caller overrides into the
//! final query text plus the naming plan for the metrics it returns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

use super::macros::{MacroError, Macros};
use crate::catalog::{
    CollectorDefinition, CollectorLevel, Customizable, QueryField, parse_field_list,
};

/// Column alias of the inclusive day count added for explicit date ranges.
pub const N_DAYS_ALIAS: &str = "n_days";

const DATE_FIELD: &str = "segments.date";

/// `segments.date DURING TODAY`, the filter an explicit date range replaces.
fn during_today_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bsegments\.date\s+DURING\s+TODAY\b")
            .expect("failed to compile date filter regex")
    })
}

/// Errors raised while materializing a single collector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    /// An override targets a field the collector does not expose.
    #[error("collector '{collector}' does not allow overriding '{field}'")]
    NotCustomizable {
        collector: String,
        field: Customizable,
    },

    /// Macro resolution failed.
    #[error(transparent)]
    Macro(#[from] MacroError),

    /// An override key or value could not be used.
    #[error("invalid override for '{field}': {reason}")]
    InvalidOverride { field: String, reason: String },
}

// =============================================================================
// Overrides
// =============================================================================

/// Caller replacements for customizable parts of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: BTreeMap<Customizable, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Customizable, value: impl Into<String>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    pub fn get(&self, field: Customizable) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Customizable, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Build overrides from string keys (`level`, `metrics`, ...).
    ///
    /// # Errors
    /// Returns [`MaterializeError::InvalidOverride`] for unknown keys.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, MaterializeError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut overrides = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref().trim();
            let field = key
                .parse::<Customizable>()
                .map_err(|_| MaterializeError::InvalidOverride {
                    field: key.to_string(),
                    reason: "expected one of filters, dimensions, metrics, level".to_string(),
                })?;
            overrides.values.insert(field, value.into());
        }
        Ok(overrides)
    }
}

// =============================================================================
// Materialized query
// =============================================================================

/// A collector bound to concrete query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedQuery {
    pub collector: String,
    pub query_text: String,
    /// Prefix prepended to every metric column (`googleads_`, `googleads_mapping_`).
    pub metric_prefix: String,
    /// Columns exported as metric values.
    pub metric_columns: Vec<String>,
    /// Columns exported as labels.
    pub label_columns: Vec<String>,
}

impl MaterializedQuery {
    /// Full metric name of a metric column.
    pub fn metric_name(&self, column: &str) -> String {
        format!("{}{}", self.metric_prefix, column)
    }
}

impl fmt::Display for MaterializedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.collector, self.query_text)
    }
}

// =============================================================================
// Materializer
// =============================================================================

/// Turns collector definitions into runnable queries.
#[derive(Debug, Clone)]
pub struct Materializer {
    namespace: String,
}

impl Materializer {
    /// Create a materializer exporting under `namespace`.
    ///
    /// A trailing `_` is added when missing; an empty namespace yields bare
    /// metric names.
    pub fn new(namespace: impl AsRef<str>) -> Self {
        let namespace = namespace.as_ref().trim().trim_end_matches('_');
        Self {
            namespace: if namespace.is_empty() {
                String::new()
            } else {
                format!("{namespace}_")
            },
        }
    }

    /// Normalized namespace, with its trailing `_`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Metric prefix of a collector: namespace plus suffix unless removed.
    pub fn metric_prefix(&self, definition: &CollectorDefinition) -> String {
        match definition.metric_suffix() {
            Some(suffix) => format!("{}{}_", self.namespace, suffix),
            None => self.namespace.clone(),
        }
    }

    /// Materialize against the current local date.
    pub fn materialize(
        &self,
        definition: &CollectorDefinition,
        macros: &Macros,
        overrides: &Overrides,
    ) -> Result<MaterializedQuery, MaterializeError> {
        self.materialize_at(
            definition,
            macros,
            overrides,
            chrono::Local::now().date_naive(),
        )
    }

    /// Materialize with relative dates computed from `today`.
    ///
    /// # Errors
    /// - [`MaterializeError::NotCustomizable`] when an override targets a field
    ///   the definition does not mark customizable.
    /// - [`MaterializeError::InvalidOverride`] when an override value does not parse.
    /// - [`MaterializeError::Macro`] for bad or unresolved macros.
    pub fn materialize_at(
        &self,
        definition: &CollectorDefinition,
        macros: &Macros,
        overrides: &Overrides,
        today: NaiveDate,
    ) -> Result<MaterializedQuery, MaterializeError> {
        let spec = &definition.query_spec;

        for (field, _) in overrides.iter() {
            if !spec.is_customizable(field) {
                return Err(MaterializeError::NotCustomizable {
                    collector: definition.name.clone(),
                    field,
                });
            }
        }

        let level = match overrides.get(Customizable::Level) {
            Some(value) => value
                .trim()
                .parse::<CollectorLevel>()
                .map_err(|_| invalid(Customizable::Level, format!("unknown level '{value}'")))?,
            None => spec.level,
        };
        let metrics = match overrides.get(Customizable::Metrics) {
            Some(value) => parse_field_list(value, QueryField::metric)
                .map_err(|e| invalid(Customizable::Metrics, e))?,
            None => spec.metrics.clone(),
        };
        let dimensions = match overrides.get(Customizable::Dimensions) {
            Some(value) => parse_field_list(value, QueryField::dimension)
                .map_err(|e| invalid(Customizable::Dimensions, e))?,
            None => spec.dimensions.clone(),
        };
        let mut filters = match overrides.get(Customizable::Filters) {
            Some(value) if value.trim().is_empty() => Vec::new(),
            Some(value) => vec![value.trim().to_string()],
            None => spec.filters.clone(),
        };

        let level_info = level.info();
        let resource = spec
            .resource_name
            .as_deref()
            .or_else(|| level_info.map(|info| info.resource_name))
            .ok_or_else(|| {
                invalid(
                    Customizable::Level,
                    "level 'unknown' requires an explicit resource".to_string(),
                )
            })?;

        let date_range = macros.date_range(today)?;

        let mut columns = Vec::new();
        let mut label_columns = Vec::new();
        if let Some(info) = level_info {
            columns.push(info.to_query_field());
            label_columns.push(info.id_alias.to_string());
        }

        let mut metrics = metrics;
        metrics.sort_by_key(QueryField::to_query_field);
        let metric_columns: Vec<String> = metrics.iter().map(|m| m.alias.clone()).collect();
        columns.extend(metrics.iter().map(QueryField::to_query_field));

        let mut dimensions: Vec<QueryField> = dimensions
            .into_iter()
            .filter(|d| {
                level_info.is_none_or(|info| d.expr != info.id && d.alias != info.id_alias)
            })
            .collect();
        dimensions.sort_by_key(QueryField::to_query_field);
        for dimension in &dimensions {
            columns.push(dimension.to_query_field());
            label_columns.push(dimension.alias.clone());
        }

        if let Some(range) = date_range {
            let between = format!(
                "{DATE_FIELD} BETWEEN '{}' AND '{}'",
                range.start.format("%Y-%m-%d"),
                range.end.format("%Y-%m-%d")
            );
            for filter in &mut filters {
                *filter = during_today_regex()
                    .replace_all(filter, between.as_str())
                    .into_owned();
            }
            if !definition.kind.is_service() && !filters.iter().any(|f| f.contains(DATE_FIELD)) {
                filters.push(between);
            }
        } else if !definition.kind.is_service() && !filters.iter().any(|f| f.contains(DATE_FIELD)) {
            filters.push(format!("{DATE_FIELD} DURING TODAY"));
        }
        if let Some(range) = date_range {
            columns.push(format!("{} AS {N_DAYS_ALIAS}", range.days()));
            label_columns.push(N_DAYS_ALIAS.to_string());
        }

        let mut query = format!("SELECT {} FROM {resource}", columns.join(", "));
        if !filters.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&filters.join(" AND "));
        }
        let query_text = macros.substitute(&query, today)?;

        Ok(MaterializedQuery {
            collector: definition.name.clone(),
            query_text,
            metric_prefix: self.metric_prefix(definition),
            metric_columns,
            label_columns,
        })
    }
}

fn invalid(field: Customizable, reason: String) -> MaterializeError {
    MaterializeError::InvalidOverride {
        field: field.to_string(),
        reason,
    }
}
