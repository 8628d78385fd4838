//! Collector selection and resolution.
//!
//! A [`Selection`] is the user supplied list of tokens (collector or registry
//! names). [`Resolver::resolve`] turns it into a [`ResolvedCollectorSet`]:
//!
//! 1. An empty selection means the `default` registry.
//! 2. Each token is a collector name if one exists, otherwise a registry name,
//!    otherwise resolution fails with [`ResolveError::UnknownSelector`].
//! 3. Registry tokens expand inline to their members in index order.
//! 4. Every collector flagged with a conversion split pulls in its
//!    `<name>_conversion_split` sibling after the run that produced it, when
//!    the sibling exists.
//! 5. Repeats collapse to their first occurrence.
//!
//! Resolution is a pure function over the immutable store and index.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::{CollectorDefinition, CollectorStore};
use crate::registry::{DEFAULT_REGISTRY, RegistryIndex};

/// Errors raised while resolving a selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Token names neither a collector nor a registry.
    #[error("unknown collector or registry: '{token}'")]
    UnknownSelector { token: String },

    /// The catalog cannot satisfy an empty selection.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Ordered selection tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    tokens: Vec<String>,
}

impl Selection {
    /// Selection with no tokens: resolves to the `default` registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a comma separated selection string.
    ///
    /// Tokens are trimmed and blank tokens dropped, so `"a, b,,c"` yields
    /// `[a, b, c]` and a blank string yields the empty selection.
    pub fn parse(input: &str) -> Self {
        Self::from_tokens(input.split(','))
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tokens.is_empty() {
            write!(f, "<{DEFAULT_REGISTRY}>")
        } else {
            write!(f, "{}", self.tokens.join(","))
        }
    }
}

/// How a token was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Collector,
    Registry,
}

/// Ordered, duplicate-free collector definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCollectorSet {
    collectors: Vec<Arc<CollectorDefinition>>,
}

impl ResolvedCollectorSet {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CollectorDefinition>> {
        self.collectors.iter()
    }

    /// Collector names in resolution order.
    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collectors.iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl IntoIterator for ResolvedCollectorSet {
    type Item = Arc<CollectorDefinition>;
    type IntoIter = std::vec::IntoIter<Arc<CollectorDefinition>>;

    fn into_iter(self) -> Self::IntoIter {
        self.collectors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResolvedCollectorSet {
    type Item = &'a Arc<CollectorDefinition>;
    type IntoIter = std::slice::Iter<'a, Arc<CollectorDefinition>>;

    fn into_iter(self) -> Self::IntoIter {
        self.collectors.iter()
    }
}

/// Resolves selections against a store and its registry index.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a CollectorStore,
    index: &'a RegistryIndex,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a CollectorStore, index: &'a RegistryIndex) -> Self {
        Self { store, index }
    }

    /// Classify a token. Collector names win over registry names.
    pub fn classify(&self, token: &str) -> Result<TokenKind, ResolveError> {
        if self.store.contains(token) {
            Ok(TokenKind::Collector)
        } else if self.index.exists(token) {
            Ok(TokenKind::Registry)
        } else {
            Err(ResolveError::UnknownSelector {
                token: token.to_string(),
            })
        }
    }

    /// Resolve a selection into an ordered, duplicate-free collector set.
    ///
    /// # Errors
    /// - [`ResolveError::UnknownSelector`] for the first token that names
    ///   neither a collector nor a registry.
    /// - [`ResolveError::Configuration`] if the selection is empty and the
    ///   `default` registry has no members.
    pub fn resolve(&self, selection: &Selection) -> Result<ResolvedCollectorSet, ResolveError> {
        let mut runs = Vec::new();

        if selection.is_empty() {
            runs.push(self.registry_run(self.index.default_members())?);
        } else {
            for token in selection.tokens() {
                let run = match self.classify(token)? {
                    TokenKind::Collector => vec![Arc::clone(self.definition(token)?)],
                    TokenKind::Registry => self.registry_run(self.index.members(token))?,
                };
                runs.push(run);
            }
        }

        let mut seen = HashSet::new();
        let mut collectors = Vec::new();
        for run in runs {
            let siblings: Vec<_> = run
                .iter()
                .filter(|c| c.has_conversion_split)
                .filter_map(|c| self.store.find(&c.conversion_split_name()))
                .cloned()
                .collect();
            for collector in run.into_iter().chain(siblings) {
                if seen.insert(collector.name.clone()) {
                    collectors.push(collector);
                }
            }
        }

        if collectors.is_empty() {
            return Err(ResolveError::Configuration(format!(
                "registry '{DEFAULT_REGISTRY}' has no collectors"
            )));
        }

        Ok(ResolvedCollectorSet { collectors })
    }

    fn registry_run(&self, members: &[String]) -> Result<Vec<Arc<CollectorDefinition>>, ResolveError> {
        members
            .iter()
            .map(|name| self.definition(name).cloned())
            .collect()
    }

    fn definition(&self, name: &str) -> Result<&'a Arc<CollectorDefinition>, ResolveError> {
        // The index is derived from the store, so a miss means they diverged.
        self.store.find(name).ok_or_else(|| {
            ResolveError::Configuration(format!(
                "registry member '{name}' is missing from the collector store"
            ))
        })
    }
}

/// Resolve `selection` against `store` and `index`.
pub fn resolve(
    selection: &Selection,
    store: &CollectorStore,
    index: &RegistryIndex,
) -> Result<ResolvedCollectorSet, ResolveError> {
    Resolver::new(store, index).resolve(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DefinitionSource;

    fn fixture(yaml: &str) -> (CollectorStore, RegistryIndex) {
        let store =
            CollectorStore::load([DefinitionSource::from_yaml_str("test", yaml).unwrap()]).unwrap();
        let index = RegistryIndex::from_store(&store);
        (store, index)
    }

    const CATALOG: &str = r#"
- name: performance
  registries: [default]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: mapping
  registries: [default]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: search_terms
  registries: [search]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: keywords
  registries: [search]
  query_spec: {level: ad_group, metrics: [clicks]}
"#;

    fn names(set: &ResolvedCollectorSet) -> Vec<&str> {
        set.names()
    }

    #[test]
    fn test_selection_parse_trims_and_drops_blanks() {
        let selection = Selection::parse(" performance , ,search,");
        assert_eq!(selection.tokens(), ["performance", "search"]);
        assert!(Selection::parse("  ").is_empty());
        assert_eq!(Selection::empty().to_string(), "<default>");
        assert_eq!(selection.to_string(), "performance,search");
    }

    #[test]
    fn test_empty_selection_uses_default_registry() {
        let (store, index) = fixture(CATALOG);
        let set = resolve(&Selection::empty(), &store, &index).unwrap();
        assert_eq!(names(&set), ["performance", "mapping"]);
    }

    #[test]
    fn test_registry_token_expands_in_order() {
        let (store, index) = fixture(CATALOG);
        let set = resolve(&Selection::parse("search"), &store, &index).unwrap();
        assert_eq!(names(&set), ["search_terms", "keywords"]);
    }

    #[test]
    fn test_explicit_repeat_does_not_reorder() {
        let (store, index) = fixture(CATALOG);
        let set = resolve(&Selection::parse("default,performance"), &store, &index).unwrap();
        assert_eq!(names(&set), ["performance", "mapping"]);
    }

    #[test]
    fn test_collector_before_registry_keeps_first_position() {
        let (store, index) = fixture(CATALOG);
        let set = resolve(&Selection::parse("mapping,default,keywords"), &store, &index).unwrap();
        assert_eq!(names(&set), ["mapping", "performance", "keywords"]);
    }

    #[test]
    fn test_unknown_token_aborts() {
        let (store, index) = fixture(CATALOG);
        let err = resolve(
            &Selection::parse("performance,totally_unknown_xyz"),
            &store,
            &index,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownSelector {
                token: "totally_unknown_xyz".to_string()
            }
        );
        assert!(err.to_string().contains("totally_unknown_xyz"));
    }

    #[test]
    fn test_collector_name_wins_over_registry_name() {
        let (store, index) = fixture(
            r#"
- name: search
  query_spec: {level: campaign, metrics: [clicks]}
- name: keywords
  registries: [search, default]
  query_spec: {level: ad_group, metrics: [clicks]}
"#,
        );
        let resolver = Resolver::new(&store, &index);
        assert_eq!(resolver.classify("search").unwrap(), TokenKind::Collector);
        let set = resolver.resolve(&Selection::parse("search")).unwrap();
        assert_eq!(names(&set), ["search"]);
    }

    #[test]
    fn test_conversion_split_sibling_is_pulled_in() {
        let (store, index) = fixture(
            r#"
- name: a
  has_conversion_split: true
  registries: [group]
  query_spec: {level: campaign, metrics: [clicks]}
- name: b
  registries: [group]
  query_spec: {level: campaign, metrics: [clicks]}
- name: a_conversion_split
  query_spec: {level: campaign, metrics: [all_conversions]}
- name: c
  registries: [default]
  query_spec: {level: campaign, metrics: [clicks]}
"#,
        );
        let set = resolve(&Selection::parse("a"), &store, &index).unwrap();
        assert_eq!(names(&set), ["a", "a_conversion_split"]);

        // Siblings follow the whole registry run.
        let set = resolve(&Selection::parse("group,c"), &store, &index).unwrap();
        assert_eq!(names(&set), ["a", "b", "a_conversion_split", "c"]);

        // An explicit earlier mention keeps its position.
        let set = resolve(&Selection::parse("a_conversion_split,a"), &store, &index).unwrap();
        assert_eq!(names(&set), ["a_conversion_split", "a"]);
    }

    #[test]
    fn test_missing_sibling_is_a_no_op() {
        let (store, index) = fixture(
            r#"
- name: a
  has_conversion_split: true
  registries: [default]
  query_spec: {level: campaign, metrics: [clicks]}
"#,
        );
        let set = resolve(&Selection::parse("a"), &store, &index).unwrap();
        assert_eq!(names(&set), ["a"]);
    }

    #[test]
    fn test_empty_default_registry_is_configuration_error() {
        let (store, index) = fixture(
            r#"
- name: lonely
  registries: [other]
  query_spec: {level: campaign, metrics: [clicks]}
"#,
        );
        let err = resolve(&Selection::empty(), &store, &index).unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));

        // Naming `default` explicitly is an unknown token instead.
        let err = resolve(&Selection::parse("default"), &store, &index).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownSelector { .. }));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (store, index) = fixture(CATALOG);
        let selection = Selection::parse("search,default,keywords");
        let first = resolve(&selection, &store, &index).unwrap();
        let second = resolve(&selection, &store, &index).unwrap();
        assert_eq!(first, second);
    }
}
