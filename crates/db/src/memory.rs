//! In-memory inventory store.
//!
//! Rows live in a `BTreeMap` keyed by id, so iteration order is insertion
//! order and searches are deterministic. All lease writes happen under the
//! write lock, which makes `acquire_lease` a true compare-and-set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use testbed_core::inventory::{InventoryEntity, Lease, Resource};
use testbed_core::specification::Specification;
use testbed_core::types::{DbId, TenantId};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::pagination::{clamp_paging, Page};
use crate::repositories::{InventoryRepository, ResourceRepository};

/// Process-local implementation of [`InventoryRepository`].
pub struct InMemoryInventory<E> {
    rows: Arc<RwLock<BTreeMap<DbId, E>>>,
    next_id: AtomicI64,
}

impl<E: InventoryEntity> Default for InMemoryInventory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: InventoryEntity> InMemoryInventory<E> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicI64::new(1),
        }
    }

    /// Creates a store pre-populated with `entities`, assigning ids in order.
    pub fn with_entities(entities: Vec<E>) -> Self {
        let mut rows = BTreeMap::new();
        let mut next = 1;
        for mut entity in entities {
            entity.set_id(next);
            rows.insert(next, entity);
            next += 1;
        }
        Self {
            rows: Arc::new(RwLock::new(rows)),
            next_id: AtomicI64::new(next),
        }
    }

    /// Gets a snapshot of all rows in id order.
    pub async fn snapshot(&self) -> Vec<E> {
        self.rows.read().await.values().cloned().collect()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Overwrite a row verbatim, lease included. Test fixture helper.
    pub async fn put(&self, entity: E) {
        self.rows.write().await.insert(entity.id(), entity);
    }
}

#[async_trait]
impl<E: InventoryEntity> InventoryRepository<E> for InMemoryInventory<E> {
    async fn search(
        &self,
        spec: &Specification,
        skip: i64,
        take: i64,
    ) -> Result<Page<E>, StoreError> {
        let (skip, take) = clamp_paging(skip, take);
        let rows = self.rows.read().await;
        let matches: Vec<&E> = rows.values().filter(|e| spec.is_satisfied_by(*e)).collect();
        let items = matches
            .iter()
            .skip(skip as usize)
            .take(take as usize)
            .map(|e| (*e).clone())
            .collect();
        Ok(Page {
            items,
            total: matches.len() as i64,
            skip,
            take,
        })
    }

    async fn get_by_id(&self, id: DbId) -> Result<Option<E>, StoreError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn add(&self, entity: &E) -> Result<E, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = entity.clone();
        stored.set_id(id);
        stored.set_lease(None);
        self.rows.write().await.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, entity: &E) -> Result<Option<E>, StoreError> {
        let mut rows = self.rows.write().await;
        let existing = match rows.get(&entity.id()) {
            Some(existing) if existing.tenant_id() == entity.tenant_id() => existing,
            _ => return Ok(None),
        };

        let mut stored = entity.clone();
        stored.set_lease(existing.lease().cloned());
        let created = existing.audit().clone();
        let audit = stored.audit_mut();
        audit.created = created.created;
        audit.created_by = created.created_by;

        rows.insert(stored.id(), stored.clone());
        Ok(Some(stored))
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn acquire_lease(
        &self,
        spec: &Specification,
        id: DbId,
        lease: &Lease,
    ) -> Result<Option<E>, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(entity) if spec.is_satisfied_by(&*entity) && !entity.is_locked() => {
                entity.set_lease(Some(lease.clone()));
                Ok(Some(entity.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn clear_lease(&self, id: DbId, owner: &str) -> Result<Option<E>, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&id) {
            Some(entity) if entity.lock_owner() == Some(owner) => {
                entity.set_lease(None);
                Ok(Some(entity.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ResourceRepository for InMemoryInventory<Resource> {
    async fn get_by_resource_key(
        &self,
        tenant_id: TenantId,
        owner: &str,
        resource_key: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| r.tenant_id == tenant_id && r.owner == owner && r.resource_key == resource_key)
            .cloned())
    }

    async fn list_by_owner(
        &self,
        tenant_id: TenantId,
        owner: &str,
    ) -> Result<Vec<Resource>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.owner == owner)
            .cloned()
            .collect())
    }
}
