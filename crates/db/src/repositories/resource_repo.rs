//! Repository for the `test_resources` table.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use testbed_core::inventory::{EntityCategory, Lease, Resource};
use testbed_core::specification::Specification;
use testbed_core::types::{DbId, TenantId};

use super::filter_sql::{push_and, push_where};
use super::{InventoryRepository, ResourceRepository};
use crate::error::StoreError;
use crate::models::resource::ResourceRow;
use crate::pagination::{clamp_paging, Page};

/// Column list for `test_resources` queries.
const COLUMNS: &str = "\
    id, tenant_id, name, owner, resource_key, types, health_id, is_enabled, \
    lock_owner, lock_expires_at, variables, \
    created_at, created_by, updated_at, updated_by";

/// PostgreSQL-backed resource store.
#[derive(Debug, Clone)]
pub struct PgResourceRepo {
    pool: PgPool,
}

impl PgResourceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn convert(rows: Vec<ResourceRow>) -> Result<Vec<Resource>, StoreError> {
    rows.into_iter().map(Resource::try_from).collect()
}

#[async_trait]
impl InventoryRepository<Resource> for PgResourceRepo {
    async fn search(
        &self,
        spec: &Specification,
        skip: i64,
        take: i64,
    ) -> Result<Page<Resource>, StoreError> {
        let (skip, take) = clamp_paging(skip, take);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM test_resources");
        push_where(&mut count, EntityCategory::Resource, spec);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM test_resources"));
        push_where(&mut select, EntityCategory::Resource, spec);
        select
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(take)
            .push(" OFFSET ")
            .push_bind(skip);
        let rows = select.build_query_as::<ResourceRow>().fetch_all(&self.pool).await?;

        Ok(Page {
            items: convert(rows)?,
            total,
            skip,
            take,
        })
    }

    async fn get_by_id(&self, id: DbId) -> Result<Option<Resource>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM test_resources WHERE id = $1");
        sqlx::query_as::<_, ResourceRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::try_from)
            .transpose()
    }

    async fn add(&self, entity: &Resource) -> Result<Resource, StoreError> {
        let query = format!(
            "INSERT INTO test_resources \
                (tenant_id, name, owner, resource_key, types, health_id, is_enabled, variables, \
                 created_at, created_by, updated_at, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ResourceRow>(&query)
            .bind(entity.tenant_id)
            .bind(&entity.name)
            .bind(&entity.owner)
            .bind(&entity.resource_key)
            .bind(serde_json::to_value(&entity.types)?)
            .bind(entity.health.id())
            .bind(entity.enabled)
            .bind(serde_json::to_value(&entity.variables)?)
            .bind(entity.audit.created)
            .bind(&entity.audit.created_by)
            .bind(entity.audit.modified)
            .bind(&entity.audit.modified_by)
            .fetch_one(&self.pool)
            .await?;
        Resource::try_from(row)
    }

    async fn update(&self, entity: &Resource) -> Result<Option<Resource>, StoreError> {
        let query = format!(
            "UPDATE test_resources SET \
                name = $3, owner = $4, resource_key = $5, types = $6, health_id = $7, \
                is_enabled = $8, variables = $9, updated_at = $10, updated_by = $11 \
             WHERE id = $1 AND tenant_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ResourceRow>(&query)
            .bind(entity.id)
            .bind(entity.tenant_id)
            .bind(&entity.name)
            .bind(&entity.owner)
            .bind(&entity.resource_key)
            .bind(serde_json::to_value(&entity.types)?)
            .bind(entity.health.id())
            .bind(entity.enabled)
            .bind(serde_json::to_value(&entity.variables)?)
            .bind(entity.audit.modified)
            .bind(&entity.audit.modified_by)
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::try_from)
            .transpose()
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM test_resources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The row lock taken by `UPDATE` makes a concurrent second writer
    /// re-evaluate the predicates after the first commits, so at most one
    /// lease lands.
    async fn acquire_lease(
        &self,
        spec: &Specification,
        id: DbId,
        lease: &Lease,
    ) -> Result<Option<Resource>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE test_resources SET lock_owner = ");
        qb.push_bind(lease.owner.clone())
            .push(", lock_expires_at = ")
            .push_bind(lease.expires)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND lock_owner IS NULL");
        push_and(&mut qb, EntityCategory::Resource, spec);
        qb.push(format!(" RETURNING {COLUMNS}"));

        qb.build_query_as::<ResourceRow>()
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::try_from)
            .transpose()
    }

    async fn clear_lease(&self, id: DbId, owner: &str) -> Result<Option<Resource>, StoreError> {
        let query = format!(
            "UPDATE test_resources SET lock_owner = NULL, lock_expires_at = NULL \
             WHERE id = $1 AND lock_owner = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ResourceRow>(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::try_from)
            .transpose()
    }
}

#[async_trait]
impl ResourceRepository for PgResourceRepo {
    async fn get_by_resource_key(
        &self,
        tenant_id: TenantId,
        owner: &str,
        resource_key: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM test_resources \
             WHERE tenant_id = $1 AND owner = $2 AND resource_key = $3"
        );
        sqlx::query_as::<_, ResourceRow>(&query)
            .bind(tenant_id)
            .bind(owner)
            .bind(resource_key)
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::try_from)
            .transpose()
    }

    async fn list_by_owner(
        &self,
        tenant_id: TenantId,
        owner: &str,
    ) -> Result<Vec<Resource>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM test_resources \
             WHERE tenant_id = $1 AND owner = $2 \
             ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, ResourceRow>(&query)
            .bind(tenant_id)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        convert(rows)
    }
}
