//! Shared fixtures for the lease engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use testbed_core::caller::{Authorizer, CallerContext, GrantAuthorizer};
use testbed_core::dependency::Dependency;
use testbed_core::execution::ExecutionContext;
use testbed_core::inventory::{EntityCategory, InventoryEntity, Lease, Resource};
use testbed_core::specification::Specification;
use testbed_core::types::{DbId, TenantId};
use testbed_db::memory::InMemoryInventory;
use testbed_db::repositories::InventoryRepository;
use testbed_db::{Page, StoreError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const COMPETING_RUN: &str = "competing-run";

pub fn authorizer() -> Arc<dyn Authorizer> {
    Arc::new(GrantAuthorizer)
}

/// A caller with every permission on both categories.
pub fn admin(tenant_id: TenantId) -> CallerContext {
    CallerContext::new(tenant_id, "ci-runner")
        .grant_all(EntityCategory::Account)
        .grant_all(EntityCategory::Resource)
}

pub fn phone(tenant_id: TenantId, name: &str) -> Resource {
    Resource::new(tenant_id, name, ["phone"])
}

/// A context for a fresh run whose leases expire in an hour.
pub fn run_context(tenant_id: TenantId, resources: Vec<Dependency>) -> ExecutionContext {
    let mut ctx = ExecutionContext::new(Uuid::new_v4(), tenant_id, Utc::now() + Duration::hours(1));
    ctx.resource_dependencies = resources;
    ctx
}

pub fn demand(types: &[&str]) -> Vec<Dependency> {
    types.iter().map(|t| Dependency::new(*t)).collect()
}

/// Wraps the in-memory store to count calls and to inject interference at
/// the moment a lease is written.
pub struct ProbeRepo<E> {
    pub inner: InMemoryInventory<E>,
    calls: AtomicUsize,
    steal_next_acquire: AtomicBool,
    release_next_page: AtomicBool,
    cancel_on_acquire: Mutex<Option<CancellationToken>>,
}

impl<E: InventoryEntity> ProbeRepo<E> {
    pub fn new(entities: Vec<E>) -> Self {
        Self {
            inner: InMemoryInventory::with_entities(entities),
            calls: AtomicUsize::new(0),
            steal_next_acquire: AtomicBool::new(false),
            release_next_page: AtomicBool::new(false),
            cancel_on_acquire: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `acquire_lease` finds its candidate already taken by
    /// [`COMPETING_RUN`].
    pub fn steal_next_acquire(&self) {
        self.steal_next_acquire.store(true, Ordering::SeqCst);
    }

    /// Every lease on the next search result is cleared by its holder
    /// before the caller sees the page.
    pub fn release_next_page(&self) {
        self.release_next_page.store(true, Ordering::SeqCst);
    }

    /// Cancel `token` right after the next successful lease.
    pub fn cancel_after_next_acquire(&self, token: CancellationToken) {
        *self.cancel_on_acquire.lock().unwrap() = Some(token);
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<E: InventoryEntity> InventoryRepository<E> for ProbeRepo<E> {
    async fn search(&self, spec: &Specification, skip: i64, take: i64) -> Result<Page<E>, StoreError> {
        self.hit();
        let page = self.inner.search(spec, skip, take).await?;
        if self.release_next_page.swap(false, Ordering::SeqCst) {
            for entity in &page.items {
                if let Some(owner) = entity.lock_owner() {
                    self.inner.clear_lease(entity.id(), owner).await?;
                }
            }
        }
        Ok(page)
    }

    async fn get_by_id(&self, id: DbId) -> Result<Option<E>, StoreError> {
        self.hit();
        self.inner.get_by_id(id).await
    }

    async fn add(&self, entity: &E) -> Result<E, StoreError> {
        self.hit();
        self.inner.add(entity).await
    }

    async fn update(&self, entity: &E) -> Result<Option<E>, StoreError> {
        self.hit();
        self.inner.update(entity).await
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        self.hit();
        self.inner.delete(id).await
    }

    async fn acquire_lease(
        &self,
        spec: &Specification,
        id: DbId,
        lease: &Lease,
    ) -> Result<Option<E>, StoreError> {
        self.hit();
        if self.steal_next_acquire.swap(false, Ordering::SeqCst) {
            let competitor = Lease::new(COMPETING_RUN, lease.expires);
            self.inner.acquire_lease(spec, id, &competitor).await?;
        }
        let leased = self.inner.acquire_lease(spec, id, lease).await?;
        if leased.is_some() {
            if let Some(token) = self.cancel_on_acquire.lock().unwrap().take() {
                token.cancel();
            }
        }
        Ok(leased)
    }

    async fn clear_lease(&self, id: DbId, owner: &str) -> Result<Option<E>, StoreError> {
        self.hit();
        self.inner.clear_lease(id, owner).await
    }
}
