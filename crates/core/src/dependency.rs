//! Abstract resource demands and the merge of demand lists.
//!
//! A [`Dependency`] is one unit of demand for one capability type. Asking for
//! two phones means two entries. A test case's own declaration is merged
//! with whatever its suite or run context adds via [`merge_dependencies`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::inventory::Variables;

// ---------------------------------------------------------------------------
// Attribute requirements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeOperator {
    Equals,
    NotEquals,
    Contains,
}

/// A constraint on one key of a candidate's variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequirement {
    pub name: String,
    pub operator: AttributeOperator,
    pub value: String,
}

impl AttributeRequirement {
    pub fn new(
        name: impl Into<String>,
        operator: AttributeOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, AttributeOperator::Equals, value)
    }

    /// Evaluate against a variable map.
    ///
    /// A missing key never satisfies `Equals` or `Contains`; it does satisfy
    /// `NotEquals`.
    pub fn is_satisfied_by(&self, variables: &Variables) -> bool {
        let actual = variables.get(&self.name).map(String::as_str);
        match self.operator {
            AttributeOperator::Equals => actual == Some(self.value.as_str()),
            AttributeOperator::NotEquals => actual != Some(self.value.as_str()),
            AttributeOperator::Contains => actual.is_some_and(|v| v.contains(&self.value)),
        }
    }
}

// ---------------------------------------------------------------------------
// Dependency
// ---------------------------------------------------------------------------

/// One unit of demand: a capability type plus optional attribute constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub dependency_type: String,
    #[serde(default)]
    pub attributes: Vec<AttributeRequirement>,
}

impl Dependency {
    pub fn new(dependency_type: impl Into<String>) -> Self {
        Self {
            dependency_type: dependency_type.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, requirement: AttributeRequirement) -> Self {
        self.attributes.push(requirement);
        self
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Combine two demand lists without losing anything either one requires.
///
/// Entries are grouped by type in first-seen order across `a` then `b`. For
/// each type, `max(count_a, count_b)` entries are emitted. The i-th
/// occurrence in `a` is paired with the i-th occurrence in `b` and their
/// attribute lists are concatenated (`a` first). Unpaired occurrences are
/// copied unchanged.
pub fn merge_dependencies(a: &[Dependency], b: &[Dependency]) -> Vec<Dependency> {
    let mut order: Vec<&str> = Vec::new();
    let mut from_a: HashMap<&str, Vec<&Dependency>> = HashMap::new();
    let mut from_b: HashMap<&str, Vec<&Dependency>> = HashMap::new();

    for dep in a {
        let key = dep.dependency_type.as_str();
        if !from_a.contains_key(key) && !from_b.contains_key(key) {
            order.push(key);
        }
        from_a.entry(key).or_default().push(dep);
    }
    for dep in b {
        let key = dep.dependency_type.as_str();
        if !from_a.contains_key(key) && !from_b.contains_key(key) {
            order.push(key);
        }
        from_b.entry(key).or_default().push(dep);
    }

    let mut merged = Vec::with_capacity(a.len().max(b.len()));
    for key in order {
        let left = from_a.get(key).map(Vec::as_slice).unwrap_or_default();
        let right = from_b.get(key).map(Vec::as_slice).unwrap_or_default();

        for i in 0..left.len().max(right.len()) {
            let dep = match (left.get(i), right.get(i)) {
                (Some(l), Some(r)) => {
                    let mut combined = (*l).clone();
                    combined.attributes.extend(r.attributes.iter().cloned());
                    combined
                }
                (Some(only), None) | (None, Some(only)) => (*only).clone(),
                (None, None) => continue,
            };
            merged.push(dep);
        }
    }
    merged
}
