//! Repository layer.
//!
//! [`InventoryRepository`] is the storage contract the lease engine depends
//! on. Lease fields are only ever written through the conditional
//! [`acquire_lease`](InventoryRepository::acquire_lease) and
//! [`clear_lease`](InventoryRepository::clear_lease) operations, never by a
//! plain [`update`](InventoryRepository::update).

use async_trait::async_trait;
use testbed_core::inventory::{InventoryEntity, Lease, Resource};
use testbed_core::specification::Specification;
use testbed_core::types::{DbId, TenantId};

use crate::error::StoreError;
use crate::pagination::Page;

pub mod account_repo;
mod filter_sql;
pub mod resource_repo;

pub use account_repo::PgAccountRepo;
pub use resource_repo::PgResourceRepo;

#[async_trait]
pub trait InventoryRepository<E: InventoryEntity>: Send + Sync {
    /// Entities satisfying `spec`, ordered by id ascending.
    async fn search(&self, spec: &Specification, skip: i64, take: i64)
        -> Result<Page<E>, StoreError>;

    async fn get_by_id(&self, id: DbId) -> Result<Option<E>, StoreError>;

    /// Insert an unsaved entity and return it with its assigned id. Any lease
    /// on the input is ignored.
    async fn add(&self, entity: &E) -> Result<E, StoreError>;

    /// Overwrite the administrative fields of a stored entity. Creation
    /// stamps and lease are left as stored. `None` when no row with that id
    /// exists in the entity's tenant.
    async fn update(&self, entity: &E) -> Result<Option<E>, StoreError>;

    async fn delete(&self, id: DbId) -> Result<bool, StoreError>;

    /// Compare-and-set: write `lease` only if the stored entity still
    /// satisfies `spec` (which should include `Filter::Unlocked`). `None`
    /// means another writer got there first or the row is gone.
    async fn acquire_lease(
        &self,
        spec: &Specification,
        id: DbId,
        lease: &Lease,
    ) -> Result<Option<E>, StoreError>;

    /// Clear the lease only if it is currently held by `owner`.
    async fn clear_lease(&self, id: DbId, owner: &str) -> Result<Option<E>, StoreError>;
}

/// Extra lookups available on resource stores.
#[async_trait]
pub trait ResourceRepository: InventoryRepository<Resource> {
    /// Find a resource by the key its external source reported it under.
    async fn get_by_resource_key(
        &self,
        tenant_id: TenantId,
        owner: &str,
        resource_key: &str,
    ) -> Result<Option<Resource>, StoreError>;

    /// Every resource of one tenant reported by `owner`, in id order.
    async fn list_by_owner(&self, tenant_id: TenantId, owner: &str)
        -> Result<Vec<Resource>, StoreError>;
}
