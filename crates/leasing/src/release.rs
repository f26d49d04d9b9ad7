//! Lease release sweep.
//!
//! The only way for a run to give back an unbounded number of leases
//! without knowing their ids: page through `{tenant, locked, owner}` and
//! clear each hit until a short page comes back.

use std::marker::PhantomData;
use std::sync::Arc;

use testbed_core::inventory::InventoryEntity;
use testbed_core::specification::Specification;
use testbed_core::types::TenantId;
use testbed_db::pagination::MAX_PAGE_SIZE;
use testbed_db::repositories::InventoryRepository;
use tokio_util::sync::CancellationToken;

use crate::error::LeasingError;

pub const DEFAULT_RELEASE_PAGE_SIZE: i64 = 10;

pub struct LeaseReleaser<E, R: ?Sized> {
    repo: Arc<R>,
    page_size: i64,
    _entity: PhantomData<fn() -> E>,
}

impl<E, R> LeaseReleaser<E, R>
where
    E: InventoryEntity,
    R: InventoryRepository<E> + ?Sized,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            page_size: DEFAULT_RELEASE_PAGE_SIZE,
            _entity: PhantomData,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Clear every lease held by `lock_owner` in `tenant_id` and return how
    /// many were cleared. Entities of other tenants or owners are never
    /// touched. Releasing an owner with nothing left is a no-op.
    ///
    /// Cancellation is checked between pages; leases cleared before that
    /// point stay cleared.
    pub async fn release(
        &self,
        lock_owner: &str,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> Result<usize, LeasingError> {
        let spec = Specification::held_by(tenant_id, lock_owner)?;
        let mut released = 0usize;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(lock_owner, tenant_id, released, "Lease release cancelled");
                return Err(LeasingError::Cancelled);
            }

            // Cleared rows drop out of the filter, so every page starts at 0.
            let page = self.repo.search(&spec, 0, self.page_size).await?;
            let mut cleared_in_page = 0usize;
            for entity in &page.items {
                if self.repo.clear_lease(entity.id(), lock_owner).await?.is_some() {
                    cleared_in_page += 1;
                }
            }
            released += cleared_in_page;

            tracing::debug!(
                lock_owner,
                tenant_id,
                category = E::CATEGORY.as_str(),
                page_len = page.len(),
                cleared_in_page,
                "Release page processed"
            );

            // A full page where a concurrent release won every clear still
            // leaves fresh matches behind it.
            if page.is_last() {
                break;
            }
        }

        tracing::info!(
            lock_owner,
            tenant_id,
            category = E::CATEGORY.as_str(),
            released,
            "Leases released"
        );
        Ok(released)
    }
}
