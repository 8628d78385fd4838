//! In-process gauge registry rendered in the Prometheus text format.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use super::sample::{ExpositionError, ExpositionSink, Sample, sanitize_name};

struct Family {
    label_names: Vec<String>,
    gauges: GaugeVec,
}

/// Gauge families keyed by metric name.
///
/// A family is created the first time a name is seen. When the same name
/// later arrives with a different label set the family is replaced.
#[derive(Clone, Default)]
pub struct GaugeRegistry {
    registry: Registry,
    families: Arc<RwLock<HashMap<String, Family>>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_gauge(
        &self,
        sample: &Sample,
        apply: impl Fn(&prometheus::Gauge),
    ) -> Result<(), ExpositionError> {
        let name = sanitize_name(&sample.name);
        let label_names: Vec<String> = sample.labels.keys().map(|k| sanitize_name(k)).collect();
        let label_values: Vec<&str> = sample.labels.values().map(String::as_str).collect();

        {
            let families = self.families.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(family) = families
                .get(&name)
                .filter(|family| family.label_names == label_names)
            {
                let gauge = family
                    .gauges
                    .get_metric_with_label_values(&label_values)
                    .map_err(|source| ExpositionError::Registration {
                        name: name.clone(),
                        source,
                    })?;
                apply(&gauge);
                return Ok(());
            }
        }

        let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = families
            .get(&name)
            .filter(|old| old.label_names != label_names)
        {
            tracing::debug!(metric = %name, "Label set changed, replacing gauge family");
            if let Err(e) = self.registry.unregister(Box::new(old.gauges.clone())) {
                tracing::debug!(metric = %name, error = %e, "Failed to unregister gauge family");
            }
            families.remove(&name);
        }

        if !families.contains_key(&name) {
            let label_refs: Vec<&str> = label_names.iter().map(String::as_str).collect();
            let gauges = GaugeVec::new(Opts::new(name.clone(), help_text(&name)), &label_refs)
                .and_then(|gauges| {
                    self.registry.register(Box::new(gauges.clone()))?;
                    Ok(gauges)
                })
                .map_err(|source| ExpositionError::Registration {
                    name: name.clone(),
                    source,
                })?;
            families.insert(
                name.clone(),
                Family {
                    label_names,
                    gauges,
                },
            );
        }

        let family = &families[&name];
        let gauge = family
            .gauges
            .get_metric_with_label_values(&label_values)
            .map_err(|source| ExpositionError::Registration {
                name: name.clone(),
                source,
            })?;
        apply(&gauge);
        Ok(())
    }

    /// Current value of a series, `None` when it was never recorded.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let name = sanitize_name(name);
        self.registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == name)?
            .get_metric()
            .iter()
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(k, v)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *k && p.get_value() == *v)
                    })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of gauge families.
    pub fn len(&self) -> usize {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render every family in the Prometheus text format.
    pub fn render(&self) -> Result<String, ExpositionError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl ExpositionSink for GaugeRegistry {
    fn set_gauge(&self, sample: &Sample) -> Result<(), ExpositionError> {
        self.with_gauge(sample, |gauge| gauge.set(sample.value))
    }

    fn add_gauge(&self, sample: &Sample) -> Result<(), ExpositionError> {
        self.with_gauge(sample, |gauge| gauge.add(sample.value))
    }
}

impl std::fmt::Debug for GaugeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeRegistry")
            .field("families", &self.len())
            .finish()
    }
}

fn help_text(name: &str) -> String {
    format!("Exported metric {name}")
}
