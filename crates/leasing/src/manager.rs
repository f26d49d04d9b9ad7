//! Permission-gated inventory administration.
//!
//! Every call takes an explicit [`CallerContext`]. Permission and tenant
//! checks run before the store is touched. Mutations stamp the audit fields
//! from the injected [`Clock`] and publish an [`InventoryEvent`] when a bus
//! is attached. Leases are never written here.

use std::marker::PhantomData;
use std::sync::Arc;

use testbed_core::caller::{require, require_same_tenant, Authorizer, CallerContext, Permission};
use testbed_core::clock::Clock;
use testbed_core::error::CoreError;
use testbed_core::inventory::{Audit, InventoryEntity, Resource};
use testbed_core::reconcile::{plan_reconciliation, ExternalResource};
use testbed_core::specification::Specification;
use testbed_core::types::DbId;
use testbed_db::repositories::{InventoryRepository, ResourceRepository};
use testbed_db::Page;
use testbed_events::{EventBus, InventoryEvent};

use crate::error::LeasingError;

pub struct InventoryManager<E, R: ?Sized> {
    repo: Arc<R>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, R> InventoryManager<E, R>
where
    E: InventoryEntity,
    R: InventoryRepository<E> + ?Sized,
{
    pub fn new(repo: Arc<R>, authorizer: Arc<dyn Authorizer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            authorizer,
            clock,
            events: None,
            _entity: PhantomData,
        }
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    fn authorize(&self, caller: &CallerContext, permissions: &[Permission]) -> Result<(), CoreError> {
        caller.ensure_identified()?;
        require(self.authorizer.as_ref(), caller, E::CATEGORY, permissions)
    }

    fn publish(&self, caller: &CallerContext, action: &str, entity: &E) {
        if let Some(bus) = &self.events {
            bus.publish(
                InventoryEvent::entity(E::CATEGORY, action, entity.tenant_id(), entity.id())
                    .with_actor(caller.identity.clone())
                    .with_payload(serde_json::json!({ "name": entity.name() }))
                    .at(self.clock.now()),
            );
        }
    }

    /// Load `id` for mutation by `caller`. Another tenant's entity is
    /// forbidden rather than hidden.
    async fn load_owned(&self, caller: &CallerContext, id: DbId) -> Result<E, LeasingError> {
        let existing = self.repo.get_by_id(id).await?.ok_or(CoreError::NotFound {
            entity: E::CATEGORY.as_str(),
            id,
        })?;
        require_same_tenant(caller, existing.tenant_id())?;
        Ok(existing)
    }

    /// Create an entity in the caller's tenant. Any lease on the input is
    /// dropped.
    pub async fn add(&self, caller: &CallerContext, mut entity: E) -> Result<E, LeasingError> {
        self.authorize(caller, &[Permission::Write])?;
        require_same_tenant(caller, entity.tenant_id())?;

        *entity.audit_mut() = Audit::created(self.clock.now(), &caller.identity);
        entity.set_lease(None);

        let stored = self.repo.add(&entity).await?;
        tracing::info!(
            category = E::CATEGORY.as_str(),
            id = stored.id(),
            tenant_id = stored.tenant_id(),
            actor = %caller.identity,
            "Inventory entity created"
        );
        self.publish(caller, "created", &stored);
        Ok(stored)
    }

    /// Overwrite an entity's administrative fields. Creation stamps, the
    /// lease and the tenant stay as stored.
    pub async fn update(&self, caller: &CallerContext, mut entity: E) -> Result<E, LeasingError> {
        self.authorize(caller, &[Permission::Write])?;
        require_same_tenant(caller, entity.tenant_id())?;
        let existing = self.load_owned(caller, entity.id()).await?;

        let mut audit = existing.audit().clone();
        audit.touch(self.clock.now(), &caller.identity);
        *entity.audit_mut() = audit;
        entity.set_lease(existing.lease().cloned());

        let stored = self.repo.update(&entity).await?.ok_or(CoreError::NotFound {
            entity: E::CATEGORY.as_str(),
            id: entity.id(),
        })?;
        tracing::info!(
            category = E::CATEGORY.as_str(),
            id = stored.id(),
            actor = %caller.identity,
            "Inventory entity updated"
        );
        self.publish(caller, "updated", &stored);
        Ok(stored)
    }

    pub async fn delete(&self, caller: &CallerContext, id: DbId) -> Result<(), LeasingError> {
        self.authorize(caller, &[Permission::Delete])?;
        let existing = self.load_owned(caller, id).await?;

        if !self.repo.delete(id).await? {
            return Err(CoreError::NotFound {
                entity: E::CATEGORY.as_str(),
                id,
            }
            .into());
        }
        tracing::info!(category = E::CATEGORY.as_str(), id, actor = %caller.identity, "Inventory entity deleted");
        self.publish(caller, "deleted", &existing);
        Ok(())
    }

    /// Every entity of the caller's tenant, paged in id order.
    pub async fn browse(
        &self,
        caller: &CallerContext,
        skip: i64,
        take: i64,
    ) -> Result<Page<E>, LeasingError> {
        self.search(caller, &Specification::new(), skip, take).await
    }

    /// `spec` restricted to the caller's tenant.
    pub async fn search(
        &self,
        caller: &CallerContext,
        spec: &Specification,
        skip: i64,
        take: i64,
    ) -> Result<Page<E>, LeasingError> {
        self.authorize(caller, &[Permission::Read])?;
        let scoped = spec
            .filters()
            .iter()
            .cloned()
            .fold(Specification::tenant(caller.tenant_id), Specification::and);
        Ok(self.repo.search(&scoped, skip, take).await?)
    }

    /// `None` for unknown ids and for entities of other tenants.
    pub async fn get_by_id(&self, caller: &CallerContext, id: DbId) -> Result<Option<E>, LeasingError> {
        self.authorize(caller, &[Permission::Read])?;
        Ok(self
            .repo
            .get_by_id(id)
            .await?
            .filter(|e| e.tenant_id() == caller.tenant_id))
    }
}

/// Counts of what a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub inserted: usize,
    pub updated: usize,
    pub disabled: usize,
    pub skipped: usize,
}

impl<R> InventoryManager<Resource, R>
where
    R: ResourceRepository + ?Sized,
{
    /// Bring the resources reported by `owner` in line with `snapshot`.
    ///
    /// Rows are matched by resource key. A resource is enabled exactly when
    /// it reports healthy. Known resources missing from the snapshot are
    /// disabled, never deleted, so their leases and history survive.
    /// Malformed rows are logged and skipped.
    pub async fn update_from_external_source(
        &self,
        caller: &CallerContext,
        owner: &str,
        snapshot: &[ExternalResource],
    ) -> Result<ReconciliationSummary, LeasingError> {
        self.authorize(caller, &[Permission::Read, Permission::Write])?;
        if owner.trim().is_empty() {
            return Err(CoreError::InvalidArgument("Source owner must not be empty".to_string()).into());
        }

        let known = self.repo.list_by_owner(caller.tenant_id, owner).await?;
        let plan = plan_reconciliation(caller.tenant_id, owner, &known, snapshot);

        for row in &plan.skipped {
            tracing::warn!(
                owner,
                resource_key = %row.resource_key,
                reason = row.reason,
                "Skipping snapshot row"
            );
        }

        let now = self.clock.now();
        for mut resource in plan.inserts.iter().cloned() {
            resource.audit = Audit::created(now, &caller.identity);
            let stored = self.repo.add(&resource).await?;
            self.publish(caller, "created", &stored);
        }
        for (action, changed) in [("updated", &plan.updates), ("disabled", &plan.disables)] {
            for resource in changed {
                let mut resource = resource.clone();
                resource.audit.touch(now, &caller.identity);
                if let Some(stored) = self.repo.update(&resource).await? {
                    self.publish(caller, action, &stored);
                }
            }
        }

        let summary = ReconciliationSummary {
            inserted: plan.inserts.len(),
            updated: plan.updates.len(),
            disabled: plan.disables.len(),
            skipped: plan.skipped.len(),
        };
        tracing::info!(
            owner,
            tenant_id = caller.tenant_id,
            inserted = summary.inserted,
            updated = summary.updated,
            disabled = summary.disabled,
            skipped = summary.skipped,
            "Resource inventory reconciled"
        );
        if let Some(bus) = &self.events {
            bus.publish(
                InventoryEvent::new("resource.reconciled", caller.tenant_id)
                    .with_actor(caller.identity.clone())
                    .with_payload(serde_json::json!({
                        "owner": owner,
                        "inserted": summary.inserted,
                        "updated": summary.updated,
                        "disabled": summary.disabled,
                        "skipped": summary.skipped,
                    }))
                    .at(now),
            );
        }
        Ok(summary)
    }
}
