//! Repository for the `test_accounts` table.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use testbed_core::inventory::{Account, EntityCategory, Lease};
use testbed_core::specification::Specification;
use testbed_core::types::DbId;

use super::filter_sql::{push_and, push_where};
use super::InventoryRepository;
use crate::error::StoreError;
use crate::models::account::AccountRow;
use crate::pagination::{clamp_paging, Page};

/// Column list for `test_accounts` queries.
const COLUMNS: &str = "\
    id, tenant_id, name, owner, account_type, sub_type, is_enabled, \
    lock_owner, lock_expires_at, variables, \
    created_at, created_by, updated_at, updated_by";

/// PostgreSQL-backed account store.
#[derive(Debug, Clone)]
pub struct PgAccountRepo {
    pool: PgPool,
}

impl PgAccountRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository<Account> for PgAccountRepo {
    async fn search(
        &self,
        spec: &Specification,
        skip: i64,
        take: i64,
    ) -> Result<Page<Account>, StoreError> {
        let (skip, take) = clamp_paging(skip, take);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM test_accounts");
        push_where(&mut count, EntityCategory::Account, spec);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM test_accounts"));
        push_where(&mut select, EntityCategory::Account, spec);
        select
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(take)
            .push(" OFFSET ")
            .push_bind(skip);
        let items = select
            .build_query_as::<AccountRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total,
            skip,
            take,
        })
    }

    async fn get_by_id(&self, id: DbId) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM test_accounts WHERE id = $1");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn add(&self, entity: &Account) -> Result<Account, StoreError> {
        let query = format!(
            "INSERT INTO test_accounts \
                (tenant_id, name, owner, account_type, sub_type, is_enabled, variables, \
                 created_at, created_by, updated_at, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(entity.tenant_id)
            .bind(&entity.name)
            .bind(&entity.owner)
            .bind(&entity.account_type)
            .bind(&entity.sub_type)
            .bind(entity.enabled)
            .bind(serde_json::to_value(&entity.variables)?)
            .bind(entity.audit.created)
            .bind(&entity.audit.created_by)
            .bind(entity.audit.modified)
            .bind(&entity.audit.modified_by)
            .fetch_one(&self.pool)
            .await?;
        Account::try_from(row)
    }

    async fn update(&self, entity: &Account) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "UPDATE test_accounts SET \
                name = $3, owner = $4, account_type = $5, sub_type = $6, is_enabled = $7, \
                variables = $8, updated_at = $9, updated_by = $10 \
             WHERE id = $1 AND tenant_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(entity.id)
            .bind(entity.tenant_id)
            .bind(&entity.name)
            .bind(&entity.owner)
            .bind(&entity.account_type)
            .bind(&entity.sub_type)
            .bind(entity.enabled)
            .bind(serde_json::to_value(&entity.variables)?)
            .bind(entity.audit.modified)
            .bind(&entity.audit.modified_by)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn delete(&self, id: DbId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM test_accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn acquire_lease(
        &self,
        spec: &Specification,
        id: DbId,
        lease: &Lease,
    ) -> Result<Option<Account>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE test_accounts SET lock_owner = ");
        qb.push_bind(lease.owner.clone())
            .push(", lock_expires_at = ")
            .push_bind(lease.expires)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND lock_owner IS NULL");
        push_and(&mut qb, EntityCategory::Account, spec);
        qb.push(format!(" RETURNING {COLUMNS}"));

        qb.build_query_as::<AccountRow>()
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn clear_lease(&self, id: DbId, owner: &str) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "UPDATE test_accounts SET lock_owner = NULL, lock_expires_at = NULL \
             WHERE id = $1 AND lock_owner = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }
}
