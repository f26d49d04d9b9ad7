//! `test_accounts` rows.

use sqlx::FromRow;
use testbed_core::inventory::{Account, Audit, Variables};
use testbed_core::types::{DbId, TenantId, Timestamp};

use crate::error::StoreError;
use crate::models::lease_from_columns;

/// A row from the `test_accounts` table.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub name: String,
    pub owner: String,
    pub account_type: String,
    pub sub_type: Option<String>,
    pub is_enabled: bool,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<Timestamp>,
    pub variables: serde_json::Value,
    pub created_at: Timestamp,
    pub created_by: String,
    pub updated_at: Timestamp,
    pub updated_by: String,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let variables: Variables = serde_json::from_value(row.variables)?;
        Ok(Account {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            owner: row.owner,
            account_type: row.account_type,
            sub_type: row.sub_type,
            enabled: row.is_enabled,
            lease: lease_from_columns(row.lock_owner, row.lock_expires_at)?,
            variables,
            audit: Audit {
                created: row.created_at,
                created_by: row.created_by,
                modified: row.updated_at,
                modified_by: row.updated_by,
            },
        })
    }
}
