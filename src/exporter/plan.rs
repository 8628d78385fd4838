//! Collector planning.
//!
//! Resolution fixes which collectors were asked for; planning decides which of
//! them run in an iteration. Collectors repeating the query of a more granular
//! collector are dropped, and a `mapping` service collector is appended when
//! the set has no service collector, so entity ids can be joined to names.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{
    CollectorDefinition, CollectorKind, CollectorLevel, DEFAULT_SERVICE_ALIAS, QueryField,
    QuerySpec, Suffix,
};
use crate::selector::ResolvedCollectorSet;

/// Name of the generated service collector.
pub const MAPPING_COLLECTOR: &str = "mapping";

/// Planning switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Append a generated `mapping` collector when the set has no service collector.
    pub service_collectors: bool,
    /// Drop collectors similar to a more granular one.
    pub deduplicate: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            service_collectors: true,
            deduplicate: true,
        }
    }
}

/// A collector dropped in favour of a similar, more granular one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedCollector {
    pub collector: String,
    pub kept: String,
}

/// Collectors to run, in order.
#[derive(Debug, Clone, Default)]
pub struct CollectorPlan {
    pub collectors: Vec<Arc<CollectorDefinition>>,
    pub dropped: Vec<DroppedCollector>,
    /// Level of the generated `mapping` collector, when one was added.
    pub generated_mapping: Option<CollectorLevel>,
}

impl CollectorPlan {
    /// Plan the collectors of a resolved set.
    pub fn build(resolved: &ResolvedCollectorSet, options: PlanOptions) -> Self {
        let mut plan = Self {
            collectors: resolved.iter().cloned().collect(),
            ..Default::default()
        };

        if options.deduplicate {
            plan.deduplicate();
        }
        if options.service_collectors {
            plan.add_mapping();
        }
        plan
    }

    /// Collector names in run order.
    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name.as_str()).collect()
    }

    fn deduplicate(&mut self) {
        let collectors = std::mem::take(&mut self.collectors);
        for (index, collector) in collectors.iter().enumerate() {
            // Similarity is an equivalence, so the most granular member of a
            // group (earliest on ties) is the one every other member yields to.
            let winner = collectors
                .iter()
                .enumerate()
                .filter(|(_, other)| is_similar(collector, other))
                .min_by_key(|(position, other)| (other.query_spec.level, *position));

            match winner {
                Some((position, kept)) if position != index => {
                    tracing::info!(
                        collector = %collector.name,
                        kept = %kept.name,
                        "Dropping collector similar to a more granular one"
                    );
                    self.dropped.push(DroppedCollector {
                        collector: collector.name.clone(),
                        kept: kept.name.clone(),
                    });
                }
                _ => self.collectors.push(Arc::clone(collector)),
            }
        }
    }

    fn add_mapping(&mut self) {
        if self.collectors.iter().any(|c| c.kind.is_service()) {
            return;
        }
        if self.collectors.iter().any(|c| c.name == MAPPING_COLLECTOR) {
            tracing::warn!(
                "A non-service collector is named '{MAPPING_COLLECTOR}', not generating one"
            );
            return;
        }
        let Some(level) = self
            .collectors
            .iter()
            .map(|c| c.query_spec.level)
            .filter(|level| *level != CollectorLevel::Unknown)
            .min()
        else {
            return;
        };

        let mapping = mapping_collector(level);
        tracing::debug!(level = %mapping.query_spec.level, "Adding mapping service collector");
        self.generated_mapping = Some(mapping.query_spec.level);
        self.collectors.push(Arc::new(mapping));
    }
}

/// Whether two collectors fetch the same data, possibly at different levels.
///
/// Resources must match, unless both are plain level resources
/// (`ad_group`, `campaign`, ...). Metrics, dimensions and filters are
/// compared as sets, ignoring whitespace.
pub fn is_similar(a: &CollectorDefinition, b: &CollectorDefinition) -> bool {
    let (a, b) = (&a.query_spec, &b.query_spec);
    let same_resource = match (a.resource(), b.resource()) {
        (Some(x), Some(y)) => {
            x == y || (CollectorLevel::is_level_resource(x) && CollectorLevel::is_level_resource(y))
        }
        _ => false,
    };
    same_resource
        && field_set(&a.metrics) == field_set(&b.metrics)
        && field_set(&a.dimensions) == field_set(&b.dimensions)
        && filter_set(&a.filters) == filter_set(&b.filters)
}

/// Service collector mapping entity ids to names from `level` upward.
pub fn mapping_collector(level: CollectorLevel) -> CollectorDefinition {
    let level = match level {
        CollectorLevel::Mcc => CollectorLevel::Customer,
        other => other,
    };

    let mut dimensions = Vec::new();
    let mut filters = Vec::new();
    for candidate in CollectorLevel::ALL {
        if matches!(candidate, CollectorLevel::Mcc | CollectorLevel::AdGroupAdAsset)
            || candidate < level
        {
            continue;
        }
        if let Some(info) = candidate.info() {
            dimensions.push(QueryField {
                expr: info.id.to_string(),
                alias: info.id_alias.to_string(),
            });
            dimensions.push(QueryField {
                expr: info.name.to_string(),
                alias: info.name_alias.to_string(),
            });
            filters.push(info.active_filter.to_string());
        }
    }

    CollectorDefinition {
        name: MAPPING_COLLECTOR.to_string(),
        query_spec: QuerySpec {
            level,
            resource_name: None,
            metrics: vec![QueryField {
                expr: "1".to_string(),
                alias: DEFAULT_SERVICE_ALIAS.to_string(),
            }],
            dimensions,
            filters,
            customizable: BTreeSet::new(),
        },
        kind: CollectorKind::Service {
            alias: DEFAULT_SERVICE_ALIAS.to_string(),
        },
        suffix: Suffix::Default,
        has_conversion_split: false,
        registries: Vec::new(),
    }
}

fn field_set(fields: &[QueryField]) -> BTreeSet<String> {
    fields.iter().map(|f| compact(&f.to_query_field())).collect()
}

fn filter_set(filters: &[String]) -> BTreeSet<String> {
    filters.iter().map(|f| compact(f)).collect()
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CollectorStore, DefinitionSource};
    use crate::registry::RegistryIndex;
    use crate::selector::{Selection, resolve};

    const CATALOG: &str = r#"
- name: ad_group_clicks
  registries: [similar]
  query_spec:
    level: ad_group
    metrics: [clicks]
    filters: ["campaign.status = 'ENABLED'"]
- name: campaign_clicks
  registries: [similar]
  query_spec:
    level: campaign
    metrics: [clicks]
    filters: ["campaign.status  =  'ENABLED'"]
- name: customer_clicks
  registries: [similar]
  query_spec:
    level: customer
    metrics: [clicks]
    filters: ["campaign.status = 'ENABLED'"]
- name: keyword_clicks
  registries: [similar]
  query_spec:
    level: ad_group
    resource_name: keyword_view
    metrics: [clicks]
    filters: ["campaign.status = 'ENABLED'"]
- name: campaign_cost
  registries: [other]
  query_spec:
    level: campaign
    metrics: [cost_micros AS cost]
- name: names
  type: service
  registries: [with_service]
  query_spec:
    level: campaign
    dimensions: [campaign.name AS campaign_name]
- name: budget
  registries: [with_service]
  query_spec:
    level: campaign
    metrics: [clicks]
- name: sitelinks
  registries: [unknown_only]
  query_spec:
    resource_name: asset
    metrics: [clicks]
"#;

    fn plan(selection: &str, options: PlanOptions) -> CollectorPlan {
        let store =
            CollectorStore::load([DefinitionSource::from_yaml_str("test", CATALOG).unwrap()])
                .unwrap();
        let index = RegistryIndex::from_store(&store);
        let resolved = resolve(&Selection::parse(selection), &store, &index).unwrap();
        CollectorPlan::build(&resolved, options)
    }

    const DEDUP_ONLY: PlanOptions = PlanOptions {
        service_collectors: false,
        deduplicate: true,
    };

    #[test]
    fn test_similar_collectors_keep_the_most_granular() {
        let plan = plan("customer_clicks,campaign_clicks,ad_group_clicks", DEDUP_ONLY);
        assert_eq!(plan.names(), ["ad_group_clicks"]);
        assert_eq!(
            plan.dropped,
            [
                DroppedCollector {
                    collector: "customer_clicks".to_string(),
                    kept: "ad_group_clicks".to_string(),
                },
                DroppedCollector {
                    collector: "campaign_clicks".to_string(),
                    kept: "ad_group_clicks".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_explicit_resource_is_not_similar_to_level_resource() {
        let plan = plan("similar", DEDUP_ONLY);
        assert_eq!(plan.names(), ["ad_group_clicks", "keyword_clicks"]);
    }

    #[test]
    fn test_different_metrics_are_kept() {
        let plan = plan("campaign_clicks,campaign_cost", DEDUP_ONLY);
        assert_eq!(plan.names(), ["campaign_clicks", "campaign_cost"]);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_deduplication_can_be_disabled() {
        let plan = plan(
            "similar",
            PlanOptions {
                service_collectors: false,
                deduplicate: false,
            },
        );
        assert_eq!(plan.names().len(), 4);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_mapping_added_at_lowest_level() {
        let plan = plan("campaign_cost,ad_group_clicks", PlanOptions::default());
        assert_eq!(plan.names(), ["campaign_cost", "ad_group_clicks", "mapping"]);
        assert_eq!(plan.generated_mapping, Some(CollectorLevel::AdGroup));

        let mapping = plan.collectors.last().unwrap();
        assert!(mapping.kind.is_service());
        let aliases: Vec<_> = mapping
            .query_spec
            .dimensions
            .iter()
            .map(|d| d.alias.as_str())
            .collect();
        assert_eq!(
            aliases,
            [
                "ad_group_id",
                "ad_group_name",
                "campaign_id",
                "campaign_name",
                "customer_id",
                "account_name"
            ]
        );
        assert_eq!(
            mapping.query_spec.filters,
            [
                "ad_group.status = 'ENABLED'",
                "campaign.status = 'ENABLED'",
                "customer.status = 'ENABLED'"
            ]
        );
    }

    #[test]
    fn test_mapping_not_added_when_service_present() {
        let plan = plan("with_service", PlanOptions::default());
        assert_eq!(plan.names(), ["names", "budget"]);
        assert_eq!(plan.generated_mapping, None);
    }

    #[test]
    fn test_mapping_not_added_for_unknown_levels_only() {
        let plan = plan("sitelinks", PlanOptions::default());
        assert_eq!(plan.names(), ["sitelinks"]);
    }

    #[test]
    fn test_mapping_can_be_disabled() {
        let plan = plan("campaign_cost", DEDUP_ONLY);
        assert_eq!(plan.names(), ["campaign_cost"]);
    }

    #[test]
    fn test_mcc_mapping_uses_customer_level() {
        let mapping = mapping_collector(CollectorLevel::Mcc);
        assert_eq!(mapping.query_spec.level, CollectorLevel::Customer);
        assert_eq!(mapping.query_spec.dimensions.len(), 2);
    }
}
