//! `test_resources` rows.

use sqlx::FromRow;
use testbed_core::inventory::{Audit, Health, Resource, Variables};
use testbed_core::types::{DbId, TenantId, Timestamp};

use crate::error::StoreError;
use crate::models::lease_from_columns;

/// A row from the `test_resources` table.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub name: String,
    pub owner: String,
    pub resource_key: String,
    /// JSONB array of capability type strings.
    pub types: serde_json::Value,
    pub health_id: i16,
    pub is_enabled: bool,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<Timestamp>,
    pub variables: serde_json::Value,
    pub created_at: Timestamp,
    pub created_by: String,
    pub updated_at: Timestamp,
    pub updated_by: String,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = StoreError;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        let types: Vec<String> = serde_json::from_value(row.types)?;
        let variables: Variables = serde_json::from_value(row.variables)?;
        Ok(Resource {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            owner: row.owner,
            resource_key: row.resource_key,
            types,
            health: Health::try_from(row.health_id)?,
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
