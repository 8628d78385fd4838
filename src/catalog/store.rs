//! Collector definition store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::definition::CollectorDefinition;
use super::error::CatalogError;
use super::source::DefinitionSource;

/// Immutable catalog of collector definitions.
///
/// Definitions keep their first declaration position: a later source that
/// redefines a name replaces the definition in place instead of moving it to
/// the end.
#[derive(Debug, Clone, Default)]
pub struct CollectorStore {
    definitions: Vec<Arc<CollectorDefinition>>,
    positions: HashMap<String, usize>,
}

impl CollectorStore {
    /// Load and validate definitions from ordered sources.
    ///
    /// Built-in sources go first, user sources after them. A later source
    /// fully replaces an earlier definition with the same name.
    ///
    /// # Errors
    /// - [`CatalogError::DuplicateName`] if a single source defines a name twice.
    /// - [`CatalogError::Schema`] if a record fails validation.
    pub fn load(sources: impl IntoIterator<Item = DefinitionSource>) -> Result<Self, CatalogError> {
        let mut store = Self::default();

        for source in sources {
            let mut seen = HashSet::new();
            for raw in source.records {
                let definition = CollectorDefinition::from_raw(raw)?;
                if !seen.insert(definition.name.clone()) {
                    return Err(CatalogError::DuplicateName {
                        name: definition.name,
                        origin: source.origin,
                    });
                }
                store.upsert(definition, &source.origin);
            }
        }

        store.warn_missing_siblings();
        Ok(store)
    }

    fn upsert(&mut self, definition: CollectorDefinition, origin: &str) {
        match self.positions.get(&definition.name) {
            Some(&index) => {
                tracing::debug!(collector = %definition.name, origin, "Replacing collector definition");
                self.definitions[index] = Arc::new(definition);
            }
            None => {
                self.positions
                    .insert(definition.name.clone(), self.definitions.len());
                self.definitions.push(Arc::new(definition));
            }
        }
    }

    fn warn_missing_siblings(&self) {
        for definition in &self.definitions {
            if definition.has_conversion_split
                && !self.contains(&definition.conversion_split_name())
            {
                tracing::warn!(
                    collector = %definition.name,
                    sibling = %definition.conversion_split_name(),
                    "Collector declares a conversion split but the sibling is not defined"
                );
            }
        }
    }

    /// Look up a definition by name.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<&Arc<CollectorDefinition>, CatalogError> {
        self.find(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Look up a definition by name, `None` when absent.
    pub fn find(&self, name: &str) -> Option<&Arc<CollectorDefinition>> {
        self.positions.get(name).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// All definitions in declaration order.
    pub fn all(&self) -> &[Arc<CollectorDefinition>] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
