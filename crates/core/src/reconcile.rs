//! Reconciliation of the resource inventory against an external snapshot.
//!
//! An external source (device farm, cloud pool) periodically reports the
//! resources it owns. Matching is by `(owner, resource_key)`. Anything the
//! source stops reporting is disabled rather than deleted, so history and
//! leases survive. This module only plans the changes; applying them is the
//! inventory manager's job.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::inventory::{dedup_types, Health, Resource, Variables};
use crate::types::TenantId;

/// One resource as reported by an external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub resource_key: String,
    pub name: String,
    pub types: Vec<String>,
    pub health: Health,
    #[serde(default)]
    pub variables: Variables,
}

/// A snapshot row that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub resource_key: String,
    pub reason: &'static str,
}

/// Changes needed to bring the inventory in line with a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Unsaved resources to create.
    pub inserts: Vec<Resource>,
    /// Known resources with refreshed fields.
    pub updates: Vec<Resource>,
    /// Known resources no longer reported, with `enabled` cleared.
    pub disables: Vec<Resource>,
    pub skipped: Vec<SkippedRow>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.disables.is_empty()
    }
}

/// Plan the upserts and disables for one `(tenant, owner)` source.
///
/// `known` must be every stored resource of that tenant and owner. A
/// resource is enabled exactly when its reported health is `Healthy`. Leases
/// and audit stamps of known resources are carried over untouched.
///
/// Stored keys are trimmed like snapshot keys before matching. Every known
/// row sharing a reported key is refreshed. A known row with a blank key can
/// never be reported, so it is disabled like any other missing row.
pub fn plan_reconciliation(
    tenant_id: TenantId,
    owner: &str,
    known: &[Resource],
    snapshot: &[ExternalResource],
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();
    let owned: Vec<&Resource> = known
        .iter()
        .filter(|r| r.tenant_id == tenant_id && r.owner == owner)
        .collect();
    let mut by_key: HashMap<&str, Vec<&Resource>> = HashMap::new();
    for resource in owned.iter().copied() {
        let key = resource.resource_key.trim();
        if !key.is_empty() {
            by_key.entry(key).or_default().push(resource);
        }
    }
    let mut reported: HashSet<&str> = HashSet::new();

    for row in snapshot {
        let key = row.resource_key.trim();
        if key.is_empty() {
            plan.skipped.push(SkippedRow {
                resource_key: row.resource_key.clone(),
                reason: "empty resource key",
            });
            continue;
        }
        let types = dedup_types(row.types.iter().filter(|t| !t.trim().is_empty()).cloned());
        if types.is_empty() {
            plan.skipped.push(SkippedRow {
                resource_key: key.to_string(),
                reason: "no capability types",
            });
            continue;
        }
        if !reported.insert(key) {
            plan.skipped.push(SkippedRow {
                resource_key: key.to_string(),
                reason: "duplicate resource key in snapshot",
            });
            continue;
        }

        let enabled = row.health == Health::Healthy;
        match by_key.get(key) {
            Some(matches) => {
                for existing in matches {
                    let mut updated = (*existing).clone();
                    updated.name = row.name.clone();
                    updated.types = types.clone();
                    updated.health = row.health;
                    updated.enabled = enabled;
                    updated.variables = row.variables.clone();
                    if updated != **existing {
                        plan.updates.push(updated);
                    }
                }
            }
            None => {
                let mut created = Resource::new(tenant_id, row.name.clone(), types)
                    .with_source(owner, key)
                    .with_health(row.health)
                    .with_enabled(enabled);
                created.variables = row.variables.clone();
                plan.inserts.push(created);
            }
        }
    }

    for existing in owned {
        let key = existing.resource_key.trim();
        if existing.enabled && (key.is_empty() || !reported.contains(key)) {
            let mut disabled = (*existing).clone();
            disabled.enabled = false;
            plan.disables.push(disabled);
        }
    }
    plan.disables.sort_by_key(|r| r.id);

    plan
}
