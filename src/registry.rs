//! Registry index.
//!
//! Registries are not stored anywhere: they are derived by inverting the
//! `registries` field of every collector definition. Member order follows the
//! declaration order of the collectors in the store, not the order a collector
//! lists its registries in.

use std::collections::BTreeMap;

use crate::catalog::{CollectorDefinition, CollectorStore};

/// Registry applied when a selection is empty.
pub const DEFAULT_REGISTRY: &str = "default";

/// Registry name to ordered collector names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryIndex {
    registries: BTreeMap<String, Vec<String>>,
}

impl RegistryIndex {
    /// Build the index from definitions in store declaration order.
    pub fn build<'a>(definitions: impl IntoIterator<Item = &'a CollectorDefinition>) -> Self {
        let mut registries: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for definition in definitions {
            for registry in &definition.registries {
                let members = registries.entry(registry.clone()).or_default();
                if !members.contains(&definition.name) {
                    members.push(definition.name.clone());
                }
            }
        }
        Self { registries }
    }

    /// Build the index for every definition of a store.
    pub fn from_store(store: &CollectorStore) -> Self {
        Self::build(store.all().iter().map(|d| d.as_ref()))
    }

    /// Members of a registry; empty for a registry nobody declared.
    ///
    /// Use [`RegistryIndex::exists`] to tell an unknown registry apart.
    pub fn members(&self, registry: &str) -> &[String] {
        self.registries
            .get(registry)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Members of the `default` registry.
    pub fn default_members(&self) -> &[String] {
        self.members(DEFAULT_REGISTRY)
    }

    pub fn exists(&self, registry: &str) -> bool {
        self.registries.contains_key(registry)
    }

    /// Registry names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.registries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DefinitionSource;

    fn store(yaml: &str) -> CollectorStore {
        CollectorStore::load([DefinitionSource::from_yaml_str("test", yaml).unwrap()]).unwrap()
    }

    const CATALOG: &str = r#"
- name: performance
  registries: [default, generic]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: search_terms
  registries: [search]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: mapping
  registries: [generic, default]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: keywords
  registries: [search]
  query_spec: {level: ad_group, metrics: [clicks]}
- name: standalone
  query_spec: {level: campaign, metrics: [clicks]}
"#;

    #[test]
    fn test_members_follow_store_order() {
        let index = RegistryIndex::from_store(&store(CATALOG));
        assert_eq!(index.members("default"), ["performance", "mapping"]);
        assert_eq!(index.members("generic"), ["performance", "mapping"]);
        assert_eq!(index.members("search"), ["search_terms", "keywords"]);
        assert_eq!(index.default_members(), index.members("default"));
    }

    #[test]
    fn test_unknown_registry_is_empty_not_error() {
        let index = RegistryIndex::from_store(&store(CATALOG));
        assert!(index.members("nope").is_empty());
        assert!(!index.exists("nope"));
        assert!(index.exists("search"));
    }

    #[test]
    fn test_collector_without_registries_is_not_indexed() {
        let index = RegistryIndex::from_store(&store(CATALOG));
        assert!(index.names().all(|r| !index.members(r).contains(&"standalone".to_string())));
        assert_eq!(index.names().collect::<Vec<_>>(), ["default", "generic", "search"]);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let store = store(CATALOG);
        let first = RegistryIndex::from_store(&store);
        let second = RegistryIndex::from_store(&store);
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }
}
