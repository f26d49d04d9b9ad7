//! Composable candidate filters for inventory queries.
//!
//! A [`Specification`] is an ordered list of [`Filter`]s combined with
//! logical AND. Stores evaluate it in order, so the cheapest and most
//! important filters (tenant first) go at the front. The Postgres store
//! translates the same filters into SQL predicates.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dependency::{AttributeRequirement, Dependency};
use crate::error::CoreError;
use crate::inventory::{EntityCategory, Health, InventoryEntity};
use crate::types::{DbId, TenantId, Timestamp};

/// A single predicate over an inventory entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Filter {
    Tenant(TenantId),
    Enabled,
    /// Passes entities without a health concept.
    Healthy,
    Unlocked,
    Locked,
    LockOwner(String),
    /// Leases whose expiry is strictly before the given instant.
    LockExpiredBefore(Timestamp),
    HasType(String),
    Attribute(AttributeRequirement),
    ExcludeIds(BTreeSet<DbId>),
}

impl Filter {
    pub fn evaluate<E: InventoryEntity>(&self, entity: &E) -> bool {
        match self {
            Filter::Tenant(tenant_id) => entity.tenant_id() == *tenant_id,
            Filter::Enabled => entity.is_enabled(),
            Filter::Healthy => entity.health().map_or(true, |h| h == Health::Healthy),
            Filter::Unlocked => !entity.is_locked(),
            Filter::Locked => entity.is_locked(),
            Filter::LockOwner(owner) => entity.lock_owner() == Some(owner.as_str()),
            Filter::LockExpiredBefore(at) => entity.lease().is_some_and(|l| l.expires < *at),
            Filter::HasType(wanted) => entity.has_type(wanted),
            Filter::Attribute(requirement) => requirement.is_satisfied_by(entity.variables()),
            Filter::ExcludeIds(ids) => !ids.contains(&entity.id()),
        }
    }
}

/// An ordered AND-combination of filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    filters: Vec<Filter>,
}

impl Specification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entity of one tenant.
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self::new().and(Filter::Tenant(tenant_id))
    }

    pub fn and(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Tenant filters carried by this specification.
    pub fn tenants(&self) -> impl Iterator<Item = TenantId> + '_ {
        self.filters.iter().filter_map(|f| match f {
            Filter::Tenant(t) => Some(*t),
            _ => None,
        })
    }

    /// Whether the entity passes every filter; stops at the first miss.
    pub fn is_satisfied_by<E: InventoryEntity>(&self, entity: &E) -> bool {
        self.filters.iter().all(|f| f.evaluate(entity))
    }

    /// Candidates that can satisfy one unit of demand.
    ///
    /// Order: tenant, enabled, healthy (resources only), unlocked, type,
    /// attributes, then the ids already taken by this request.
    pub fn for_dependency(
        category: EntityCategory,
        tenant_id: TenantId,
        dependency: &Dependency,
        already_selected: &BTreeSet<DbId>,
    ) -> Result<Self, CoreError> {
        if dependency.dependency_type.trim().is_empty() {
            return Err(CoreError::InvalidArgument(format!(
                "{} dependency type must not be empty",
                category.as_str()
            )));
        }

        let mut spec = Self::tenant(tenant_id).and(Filter::Enabled);
        if category == EntityCategory::Resource {
            spec = spec.and(Filter::Healthy);
        }
        spec = spec
            .and(Filter::Unlocked)
            .and(Filter::HasType(dependency.dependency_type.clone()));
        for requirement in &dependency.attributes {
            spec = spec.and(Filter::Attribute(requirement.clone()));
        }
        if !already_selected.is_empty() {
            spec = spec.and(Filter::ExcludeIds(already_selected.clone()));
        }
        Ok(spec)
    }

    /// Entities of `tenant_id` currently leased by `lock_owner`.
    pub fn held_by(tenant_id: TenantId, lock_owner: &str) -> Result<Self, CoreError> {
        if lock_owner.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "Lock owner must not be empty".to_string(),
            ));
        }
        Ok(Self::tenant(tenant_id)
            .and(Filter::Locked)
            .and(Filter::LockOwner(lock_owner.to_string())))
    }

    /// Leases, across all tenants, that expired before `now`.
    pub fn expired_leases(now: Timestamp) -> Self {
        Self::new()
            .and(Filter::Locked)
            .and(Filter::LockExpiredBefore(now))
    }
}
