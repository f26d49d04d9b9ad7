//! Dependency allocation.
//!
//! For each demanded dependency, in list order, the allocator finds the
//! lowest-id candidate that passes the dependency's specification and
//! leases it with a compare-and-set write. A lost race excludes that
//! candidate and moves on to the next one. A dependency with no remaining
//! candidate is skipped: allocation is best-effort and a short bag is not
//! an error.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use testbed_core::bag::Bag;
use testbed_core::caller::{require, require_same_tenant, Authorizer, CallerContext, Permission};
use testbed_core::dependency::Dependency;
use testbed_core::error::CoreError;
use testbed_core::execution::ExecutionContext;
use testbed_core::inventory::{InventoryEntity, Lease};
use testbed_core::specification::{Filter, Specification};
use testbed_core::types::{DbId, TenantId, Timestamp};
use testbed_db::repositories::InventoryRepository;
use tokio_util::sync::CancellationToken;

use crate::error::LeasingError;

pub struct DependencyAllocator<E, R: ?Sized> {
    repo: Arc<R>,
    authorizer: Arc<dyn Authorizer>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, R> DependencyAllocator<E, R>
where
    E: InventoryEntity,
    R: InventoryRepository<E> + ?Sized,
{
    pub fn new(repo: Arc<R>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            repo,
            authorizer,
            _entity: PhantomData,
        }
    }

    /// Lease one entity per dependency of `ctx` for this entity kind.
    ///
    /// The caller must be identified, belong to the context's tenant and
    /// hold Read and Write on the category; every dependency must name a
    /// type. All of that is checked before the store is touched.
    ///
    /// On cancellation (checked before each dependency) or a store error,
    /// the leases taken so far by this call are cleared again.
    pub async fn collect_dependencies(
        &self,
        caller: &CallerContext,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Bag<E>, LeasingError> {
        caller.ensure_identified()?;
        require(
            self.authorizer.as_ref(),
            caller,
            E::CATEGORY,
            &[Permission::Read, Permission::Write],
        )?;
        require_same_tenant(caller, ctx.tenant_id)?;

        let dependencies = ctx.dependencies(E::CATEGORY);
        if let Some(blank) = dependencies
            .iter()
            .position(|d| d.dependency_type.trim().is_empty())
        {
            return Err(CoreError::InvalidArgument(format!(
                "{} dependency #{blank} has an empty type",
                E::CATEGORY.as_str()
            ))
            .into());
        }

        let lease = Lease::new(ctx.lock_owner(), ctx.resource_expiry);
        let mut bag = Bag::new();
        let mut selected: BTreeSet<DbId> = BTreeSet::new();

        for dependency in dependencies {
            if cancel.is_cancelled() {
                self.roll_back(&bag, &lease.owner).await;
                tracing::info!(run_id = %ctx.run_id, allocated = bag.len(), "Allocation cancelled");
                return Err(LeasingError::Cancelled);
            }

            match self
                .lease_first_candidate(ctx.tenant_id, dependency, &selected, &lease)
                .await
            {
                Ok(Some(entity)) => {
                    tracing::debug!(
                        run_id = %ctx.run_id,
                        dependency_type = %dependency.dependency_type,
                        entity_id = entity.id(),
                        "Dependency leased"
                    );
                    selected.insert(entity.id());
                    bag.push(entity);
                }
                Ok(None) => {
                    tracing::debug!(
                        run_id = %ctx.run_id,
                        dependency_type = %dependency.dependency_type,
                        "No candidate for dependency"
                    );
                }
                Err(e) => {
                    self.roll_back(&bag, &lease.owner).await;
                    return Err(e);
                }
            }
        }

        tracing::info!(
            run_id = %ctx.run_id,
            tenant_id = ctx.tenant_id,
            category = E::CATEGORY.as_str(),
            requested = dependencies.len(),
            allocated = bag.len(),
            "Dependencies collected"
        );
        Ok(bag)
    }

    /// Lease `entity` for `owner` and append it to `bag`, returning its
    /// occurrence index. The caller is gated exactly as for
    /// [`collect_dependencies`](Self::collect_dependencies) and may only
    /// lease entities of its own tenant. Fails with `Conflict` when the
    /// entity is already leased or gone.
    pub async fn add(
        &self,
        caller: &CallerContext,
        bag: &mut Bag<E>,
        entity: &E,
        expiry: Timestamp,
        owner: &str,
    ) -> Result<usize, LeasingError> {
        caller.ensure_identified()?;
        require(
            self.authorizer.as_ref(),
            caller,
            E::CATEGORY,
            &[Permission::Read, Permission::Write],
        )?;
        require_same_tenant(caller, entity.tenant_id())?;
        if owner.trim().is_empty() {
            return Err(CoreError::InvalidArgument("Lock owner must not be empty".to_string()).into());
        }
        // The stored row must still belong to the caller's tenant.
        let spec = Specification::tenant(caller.tenant_id).and(Filter::Unlocked);
        let lease = Lease::new(owner, expiry);
        let leased = self
            .repo
            .acquire_lease(&spec, entity.id(), &lease)
            .await?
            .ok_or_else(|| {
                CoreError::Conflict(format!(
                    "{} {} is not available for leasing",
                    E::CATEGORY.as_str(),
                    entity.id()
                ))
            })?;
        Ok(bag.push(leased))
    }

    async fn lease_first_candidate(
        &self,
        tenant_id: TenantId,
        dependency: &Dependency,
        selected: &BTreeSet<DbId>,
        lease: &Lease,
    ) -> Result<Option<E>, LeasingError> {
        let mut excluded = selected.clone();
        loop {
            let spec = Specification::for_dependency(E::CATEGORY, tenant_id, dependency, &excluded)?;
            let page = self.repo.search(&spec, 0, 1).await?;
            let Some(candidate) = page.items.into_iter().next() else {
                return Ok(None);
            };

            if let Some(leased) = self.repo.acquire_lease(&spec, candidate.id(), lease).await? {
                return Ok(Some(leased));
            }

            tracing::warn!(
                entity_id = candidate.id(),
                dependency_type = %dependency.dependency_type,
                "Lost lease race, trying next candidate"
            );
            excluded.insert(candidate.id());
        }
    }

    async fn roll_back(&self, bag: &Bag<E>, owner: &str) {
        for entity in bag.entities() {
            if let Err(e) = self.repo.clear_lease(entity.id(), owner).await {
                tracing::error!(
                    error = %e,
                    entity_id = entity.id(),
                    lock_owner = owner,
                    "Failed to roll back lease"
                );
            }
        }
    }
}
