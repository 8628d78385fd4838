//! Collector definitions and their raw YAML records.
//!
//! A [`RawDefinition`] is what a definition source yields; it is loosely typed
//! and mirrors the YAML layout. [`CollectorDefinition::from_raw`] validates it
//! into the strongly typed form used by the rest of the exporter.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use super::error::CatalogError;
use super::level::CollectorLevel;

/// Naming rule for the conversion-split sibling of a collector.
pub const CONVERSION_SPLIT_SUFFIX: &str = "_conversion_split";

/// Reserved suffix value meaning "no per-collector suffix".
pub const REMOVE_SUFFIX: &str = "Remove";

/// Default metric alias of service collectors.
pub const DEFAULT_SERVICE_ALIAS: &str = "info";

// =============================================================================
// Query fields
// =============================================================================

/// A single query column: an expression and the alias it is exported under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryField {
    /// Field name or computed expression (`metrics.clicks`, `metrics.cost_micros / 1e6`).
    pub expr: String,
    /// Column alias.
    pub alias: String,
}

fn alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^(.+?)\s+as\s+([A-Za-z_][A-Za-z0-9_]*)\s*$")
            .expect("failed to compile alias regex")
    })
}

fn simple_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.~:]*$").expect("failed to compile field regex")
    })
}

fn metric_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<num>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_.]*)")
            .expect("failed to compile metric token regex")
    })
}

/// Alias derived from a bare field: `campaign.status` -> `campaign_status`.
fn default_alias(expr: &str) -> String {
    expr.strip_prefix("metrics.")
        .unwrap_or(expr)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Qualify bare metric identifiers: `cost_micros / 1e6` -> `metrics.cost_micros / 1e6`.
///
/// Dotted identifiers already name a resource field and are left untouched.
fn qualify_metric_expr(expr: &str) -> String {
    metric_token_regex()
        .replace_all(expr, |caps: &regex::Captures| match caps.name("ident") {
            Some(ident) if !ident.as_str().contains('.') => format!("metrics.{}", ident.as_str()),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

impl QueryField {
    /// Build a dimension field from `expr [AS alias]`.
    pub fn dimension(raw: &str, alias: Option<&str>) -> Result<Self, String> {
        let (expr, alias) = split_alias(raw, alias);
        let alias = match alias {
            Some(a) => a,
            None if simple_field_regex().is_match(&expr) => default_alias(&expr),
            None => return Err(format!("computed dimension '{expr}' needs an alias")),
        };
        Ok(Self { expr, alias })
    }

    /// Build a metric field from `expr [AS alias]`, qualifying bare identifiers
    /// with the `metrics.` namespace.
    pub fn metric(raw: &str, alias: Option<&str>) -> Result<Self, String> {
        let (expr, alias) = split_alias(raw, alias);
        let alias = match alias {
            Some(a) => a,
            None if simple_field_regex().is_match(&expr) => default_alias(&expr),
            None => return Err(format!("computed metric '{expr}' needs an alias")),
        };
        Ok(Self {
            expr: qualify_metric_expr(&expr),
            alias,
        })
    }

    /// Render as `<expr> AS <alias>`.
    pub fn to_query_field(&self) -> String {
        format!("{} AS {}", self.expr, self.alias)
    }
}

fn split_alias(raw: &str, alias: Option<&str>) -> (String, Option<String>) {
    let raw = raw.trim();
    if let Some(alias) = alias {
        return (raw.to_string(), Some(alias.trim().to_string()));
    }
    match alias_regex().captures(raw) {
        Some(caps) => (caps[1].trim().to_string(), Some(caps[2].to_string())),
        None => (raw.to_string(), None),
    }
}

/// Parse a comma separated field list (`clicks, cost_micros / 1e6 AS cost`).
pub(crate) fn parse_field_list(
    input: &str,
    build: fn(&str, Option<&str>) -> Result<QueryField, String>,
) -> Result<Vec<QueryField>, String> {
    let fields = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| build(s, None))
        .collect::<Result<Vec<_>, _>>()?;
    if fields.is_empty() {
        return Err("field list is empty".to_string());
    }
    Ok(fields)
}

// =============================================================================
// Definition metadata
// =============================================================================

/// Parts of a query a caller may override at runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Customizable {
    Filters,
    Dimensions,
    Metrics,
    Level,
}

impl Customizable {
    /// Every customizable option, what `all` expands to.
    pub const ALL: [Customizable; 4] = [
        Customizable::Filters,
        Customizable::Dimensions,
        Customizable::Metrics,
        Customizable::Level,
    ];
}

/// Collector flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorKind {
    /// Time-windowed metrics, restricted to a date range.
    Metrics,
    /// Current-state snapshot exported as a constant `1 AS <alias>` gauge.
    Service { alias: String },
}

impl CollectorKind {
    pub fn is_service(&self) -> bool {
        matches!(self, Self::Service { .. })
    }
}

/// Metric-name suffix rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suffix {
    /// Use the collector name.
    Default,
    /// Use an explicit suffix.
    Custom(String),
    /// No suffix: metric name is namespace + field.
    Remove,
}

/// What a collector fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub level: CollectorLevel,
    /// Explicit reporting resource; inferred from `level` when absent.
    pub resource_name: Option<String>,
    pub metrics: Vec<QueryField>,
    pub dimensions: Vec<QueryField>,
    pub filters: Vec<String>,
    pub customizable: BTreeSet<Customizable>,
}

impl QuerySpec {
    /// Resource used in the `FROM` clause.
    pub fn resource(&self) -> Option<&str> {
        self.resource_name
            .as_deref()
            .or_else(|| self.level.info().map(|info| info.resource_name))
    }

    pub fn is_customizable(&self, option: Customizable) -> bool {
        self.customizable.contains(&option)
    }
}

/// One named, runnable unit of data extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorDefinition {
    pub name: String,
    pub query_spec: QuerySpec,
    pub kind: CollectorKind,
    pub suffix: Suffix,
    pub has_conversion_split: bool,
    /// Registries this collector belongs to, in declared order, without repeats.
    pub registries: Vec<String>,
}

impl CollectorDefinition {
    /// Name of the conversion-split sibling (`<name>_conversion_split`).
    pub fn conversion_split_name(&self) -> String {
        format!("{}{}", self.name, CONVERSION_SPLIT_SUFFIX)
    }

    /// Metric-name suffix, `None` when suffixes are removed.
    pub fn metric_suffix(&self) -> Option<&str> {
        match &self.suffix {
            Suffix::Default => Some(&self.name),
            Suffix::Custom(s) => Some(s),
            Suffix::Remove => None,
        }
    }

    /// Validate a raw record.
    ///
    /// # Errors
    /// Returns [`CatalogError::Schema`] when a required field is missing or a
    /// value is out of range.
    pub fn from_raw(raw: RawDefinition) -> Result<Self, CatalogError> {
        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CatalogError::schema(None, "missing required field 'name'"))?;
        let fail = |reason: String| CatalogError::schema(Some(&name), reason);

        let kind = match raw.kind {
            None => CollectorKind::Metrics,
            Some(RawKind::Named(kind)) => match kind.trim().to_ascii_lowercase().as_str() {
                "service" => CollectorKind::Service {
                    alias: DEFAULT_SERVICE_ALIAS.to_string(),
                },
                "metrics" => CollectorKind::Metrics,
                other => return Err(fail(format!("unknown collector type '{other}'"))),
            },
            Some(RawKind::Service { service }) => CollectorKind::Service {
                alias: service
                    .alias
                    .unwrap_or_else(|| DEFAULT_SERVICE_ALIAS.to_string()),
            },
        };

        let spec = raw
            .query_spec
            .ok_or_else(|| fail("missing required field 'query_spec'".to_string()))?;

        let level = match spec.level.as_deref() {
            Some(level) => level
                .parse::<CollectorLevel>()
                .map_err(|_| fail(format!("unknown level '{level}'")))?,
            None if spec.resource_name.is_some() => CollectorLevel::Unknown,
            None => {
                return Err(fail(
                    "query_spec needs either 'level' or 'resource_name'".to_string(),
                ));
            }
        };
        if level == CollectorLevel::Unknown && spec.resource_name.is_none() {
            return Err(fail("level 'unknown' requires 'resource_name'".to_string()));
        }

        let metrics = match &kind {
            CollectorKind::Service { alias } => vec![QueryField {
                expr: "1".to_string(),
                alias: alias.clone(),
            }],
            CollectorKind::Metrics => raw_fields(spec.metrics, QueryField::metric).map_err(fail)?,
        };
        let dimensions = raw_fields(spec.dimensions, QueryField::dimension).map_err(fail)?;
        if kind.is_service() && dimensions.is_empty() {
            return Err(fail(
                "service collector needs at least one dimension".to_string(),
            ));
        }
        if metrics.is_empty() && dimensions.is_empty() {
            return Err(fail(
                "query_spec needs at least one metric or dimension".to_string(),
            ));
        }

        let customizable = parse_customizable(&spec.customizable).map_err(fail)?;

        let suffix = match raw.suffix.as_deref().map(str::trim) {
            None | Some("") => Suffix::Default,
            Some(REMOVE_SUFFIX) => Suffix::Remove,
            Some(s) => Suffix::Custom(s.to_string()),
        };

        let mut registries: Vec<String> = Vec::with_capacity(raw.registries.len());
        for registry in raw.registries {
            let registry = registry.trim().to_string();
            if registry.is_empty() {
                return Err(fail("registry name cannot be empty".to_string()));
            }
            if !registries.contains(&registry) {
                registries.push(registry);
            }
        }

        Ok(Self {
            name,
            query_spec: QuerySpec {
                level,
                resource_name: spec.resource_name,
                metrics,
                dimensions,
                filters: spec
                    .filters
                    .into_iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
                customizable,
            },
            kind,
            suffix,
            has_conversion_split: raw.has_conversion_split.unwrap_or(false),
            registries,
        })
    }
}

fn raw_fields(
    raw: Vec<RawField>,
    build: fn(&str, Option<&str>) -> Result<QueryField, String>,
) -> Result<Vec<QueryField>, String> {
    let mut fields = Vec::with_capacity(raw.len());
    for field in raw {
        match field {
            RawField::Plain(expr) => fields.push(build(&expr, None)?),
            RawField::Aliased(map) => {
                for (alias, spec) in map {
                    fields.push(build(&spec.field, Some(&alias))?);
                }
            }
        }
    }
    Ok(fields)
}

fn parse_customizable(raw: &[String]) -> Result<BTreeSet<Customizable>, String> {
    let mut options = BTreeSet::new();
    for option in raw {
        let option = option.trim();
        if option.eq_ignore_ascii_case("all") {
            options.extend(Customizable::ALL);
            continue;
        }
        let parsed = option.parse::<Customizable>().map_err(|_| {
            format!(
                "unknown customizable option '{option}', expected filters, dimensions, metrics, level or all"
            )
        })?;
        options.insert(parsed);
    }
    Ok(options)
}

// =============================================================================
// Raw records
// =============================================================================

/// A collector definition as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<RawKind>,
    #[serde(default)]
    pub query_spec: Option<RawQuerySpec>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub has_conversion_split: Option<bool>,
    #[serde(default)]
    pub registries: Vec<String>,
}

/// `type: service` or `type: {service: {alias: ...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawKind {
    Named(String),
    Service { service: RawServiceSpec },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServiceSpec {
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuerySpec {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub metrics: Vec<RawField>,
    #[serde(default)]
    pub dimensions: Vec<RawField>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub customizable: Vec<String>,
}

/// `clicks` or `{cost: {field: cost_micros / 1e6}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Plain(String),
    Aliased(BTreeMap<String, RawFieldSpec>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFieldSpec {
    pub field: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<CollectorDefinition, CatalogError> {
        let raw: RawDefinition = serde_yaml::from_str(yaml).unwrap();
        CollectorDefinition::from_raw(raw)
    }

    #[test]
    fn test_metric_field_qualification() {
        let field = QueryField::metric("clicks", None).unwrap();
        assert_eq!(field.to_query_field(), "metrics.clicks AS clicks");

        let field = QueryField::metric("cost_micros / 1e6", Some("cost")).unwrap();
        assert_eq!(field.to_query_field(), "metrics.cost_micros / 1e6 AS cost");

        let field = QueryField::metric("campaign.optimization_score", None).unwrap();
        assert_eq!(
            field.to_query_field(),
            "campaign.optimization_score AS campaign_optimization_score"
        );
    }

    #[test]
    fn test_metric_field_inline_alias() {
        let field = QueryField::metric("cost_micros/1e6 AS cost", None).unwrap();
        assert_eq!(field.expr, "metrics.cost_micros/1e6");
        assert_eq!(field.alias, "cost");
    }

    #[test]
    fn test_computed_field_needs_alias() {
        let err = QueryField::metric("cost_micros / 1e6", None).unwrap_err();
        assert!(err.contains("needs an alias"));
        assert!(QueryField::dimension("1", None).is_err());
    }

    #[test]
    fn test_dimension_default_alias() {
        let field = QueryField::dimension("segments.conversion_action~0", None).unwrap();
        assert_eq!(field.alias, "segments_conversion_action_0");
        let field = QueryField::dimension("campaign.status", None).unwrap();
        assert_eq!(field.alias, "campaign_status");
    }

    #[test]
    fn test_from_raw_full_definition() {
        let def = parse(
            r#"
name: performance
registries: [default, generic, default]
has_conversion_split: true
suffix: Remove
query_spec:
  level: ad_group
  metrics:
    - clicks
    - cost: {field: cost_micros / 1e6}
  dimensions:
    - network: {field: segments.ad_network_type}
  filters:
    - campaign.status = 'ENABLED'
  customizable: [all]
"#,
        )
        .unwrap();

        assert_eq!(def.name, "performance");
        assert_eq!(def.registries, vec!["default", "generic"]);
        assert!(def.has_conversion_split);
        assert_eq!(def.suffix, Suffix::Remove);
        assert_eq!(def.metric_suffix(), None);
        assert_eq!(def.kind, CollectorKind::Metrics);
        assert_eq!(def.query_spec.level, CollectorLevel::AdGroup);
        assert_eq!(def.query_spec.metrics.len(), 2);
        assert_eq!(def.query_spec.dimensions[0].alias, "network");
        assert_eq!(def.query_spec.customizable.len(), 4);
        assert_eq!(def.query_spec.resource(), Some("ad_group"));
        assert_eq!(def.conversion_split_name(), "performance_conversion_split");
    }

    #[test]
    fn test_from_raw_service_kind() {
        let def = parse(
            r#"
name: mapping
type: service
query_spec:
  level: campaign
  dimensions: [campaign.name]
"#,
        )
        .unwrap();
        assert!(def.kind.is_service());
        assert_eq!(def.query_spec.metrics[0].to_query_field(), "1 AS info");
        assert_eq!(def.metric_suffix(), Some("mapping"));

        let def = parse(
            r#"
name: disapprovals
type: {service: {alias: ad_count}}
query_spec:
  level: ad_group_ad
  dimensions: [ad_group_ad.policy_summary.approval_status]
"#,
        )
        .unwrap();
        assert_eq!(def.query_spec.metrics[0].alias, "ad_count");
    }

    #[test]
    fn test_from_raw_missing_name() {
        let err = parse("query_spec: {level: campaign, metrics: [clicks]}").unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn test_from_raw_missing_level_and_resource() {
        let err = parse("name: broken\nquery_spec: {metrics: [clicks]}").unwrap_err();
        assert!(matches!(err, CatalogError::Schema { .. }));
        assert!(err.to_string().contains("'broken'"));
    }

    #[test]
    fn test_from_raw_resource_without_level() {
        let def = parse(
            "name: sitelinks\nquery_spec: {resource_name: asset, dimensions: [asset.id]}",
        )
        .unwrap();
        assert_eq!(def.query_spec.level, CollectorLevel::Unknown);
        assert_eq!(def.query_spec.resource(), Some("asset"));
    }

    #[test]
    fn test_from_raw_requires_metric_or_dimension() {
        let err = parse("name: empty\nquery_spec: {level: campaign}").unwrap_err();
        assert!(err.to_string().contains("at least one metric or dimension"));
    }

    #[test]
    fn test_from_raw_service_requires_dimension() {
        let err = parse("name: svc\ntype: service\nquery_spec: {level: campaign}").unwrap_err();
        assert!(matches!(err, CatalogError::Schema { .. }));
        assert!(err.to_string().contains("at least one dimension"));

        let err = parse(
            "name: svc\ntype: {service: {alias: ad_count}}\nquery_spec: {level: campaign, metrics: [clicks]}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("at least one dimension"));
    }

    #[test]
    fn test_from_raw_unknown_customizable() {
        let err = parse(
            "name: perf\nquery_spec: {level: campaign, metrics: [clicks], customizable: [resource]}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown customizable option 'resource'"));
    }

    #[test]
    fn test_from_raw_unknown_level() {
        let err =
            parse("name: perf\nquery_spec: {level: keyword, metrics: [clicks]}").unwrap_err();
        assert!(err.to_string().contains("unknown level 'keyword'"));
    }

    #[test]
    fn test_parse_field_list() {
        let fields =
            parse_field_list("clicks, cost_micros / 1e6 AS cost", QueryField::metric).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].alias, "cost");
        assert!(parse_field_list(" , ", QueryField::metric).is_err());
    }
}
