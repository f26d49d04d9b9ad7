//! Run-scoped collection of leased entities and its variable rendering.
//!
//! The rendered keys follow `{namespace}__{type}__{index}__{key}`. External
//! test runners read these names verbatim, so the separators and the index
//! assignment must not change.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::inventory::InventoryEntity;

/// Separator between the four segments of a rendered variable name.
pub const VARIABLE_SEPARATOR: &str = "__";

/// Build one rendered variable name.
pub fn variable_key(namespace: &str, entity_type: &str, index: usize, key: &str) -> String {
    format!(
        "{namespace}{VARIABLE_SEPARATOR}{entity_type}{VARIABLE_SEPARATOR}{index}{VARIABLE_SEPARATOR}{key}"
    )
}

/// A leased entity together with the occurrence index assigned when it
/// entered the bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagEntry<E> {
    pub entity: E,
    pub index: usize,
}

impl<E: InventoryEntity> BagEntry<E> {
    /// Write every variable under every declared type, all with this entry's
    /// index.
    pub fn resolve_variables(&self, namespace: &str, output: &mut BTreeMap<String, String>) {
        for entity_type in self.entity.types() {
            for (key, value) in self.entity.variables() {
                output.insert(
                    variable_key(namespace, entity_type, self.index, key),
                    value.clone(),
                );
            }
        }
    }
}

/// Ordered entities leased for one execution context. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bag<E> {
    entries: Vec<BagEntry<E>>,
}

impl<E> Default for Bag<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E: InventoryEntity> Bag<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BagEntry<E>] {
        &self.entries
    }

    /// Entities in allocation order.
    pub fn entities(&self) -> impl Iterator<Item = &E> + '_ {
        self.entries.iter().map(|e| &e.entity)
    }

    pub fn contains(&self, entity: &E) -> bool {
        self.entry(entity).is_some()
    }

    fn entry(&self, entity: &E) -> Option<&BagEntry<E>> {
        self.entries.iter().find(|e| e.entity.id() == entity.id())
    }

    /// Append an already-leased entity and return its occurrence index: the
    /// number of entities already in the bag sharing at least one type with
    /// it.
    pub fn push(&mut self, entity: E) -> usize {
        let index = self
            .entries
            .iter()
            .filter(|e| e.entity.shares_type_with(&entity))
            .count();
        self.entries.push(BagEntry { entity, index });
        index
    }

    /// Render one bagged entity's variables under `namespace`.
    pub fn resolve_variables(
        &self,
        entity: &E,
        namespace: &str,
        output: &mut BTreeMap<String, String>,
    ) -> Result<(), CoreError> {
        let entry = self.entry(entity).ok_or(CoreError::NotFound {
            entity: E::CATEGORY.as_str(),
            id: entity.id(),
        })?;
        entry.resolve_variables(namespace, output);
        Ok(())
    }

    /// Render every entry under the entity kind's own namespace
    /// (`accounts` or `resources`).
    pub fn resolve_all(&self) -> BTreeMap<String, String> {
        let namespace = E::CATEGORY.namespace();
        let mut output = BTreeMap::new();
        for entry in &self.entries {
            entry.resolve_variables(namespace, &mut output);
        }
        output
    }

    pub fn into_entities(self) -> Vec<E> {
        self.entries.into_iter().map(|e| e.entity).collect()
    }
}
