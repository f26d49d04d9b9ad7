//! Caller identity and permission checks.
//!
//! Every gated operation receives an explicit [`CallerContext`]. There is no
//! ambient or thread-local principal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::inventory::EntityCategory;
use crate::types::TenantId;

/// Access level required by an inventory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
        }
    }
}

/// The identity on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub tenant_id: TenantId,
    pub identity: String,
    pub permissions: BTreeSet<(EntityCategory, Permission)>,
}

impl CallerContext {
    pub fn new(tenant_id: TenantId, identity: impl Into<String>) -> Self {
        Self {
            tenant_id,
            identity: identity.into(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn grant(mut self, category: EntityCategory, permission: Permission) -> Self {
        self.permissions.insert((category, permission));
        self
    }

    /// Grant read, write and delete on `category`.
    pub fn grant_all(self, category: EntityCategory) -> Self {
        self.grant(category, Permission::Read)
            .grant(category, Permission::Write)
            .grant(category, Permission::Delete)
    }

    /// Reject a caller without an identity before any work is done.
    pub fn ensure_identified(&self) -> Result<(), CoreError> {
        if self.identity.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "Caller identity must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Authorization collaborator
// ---------------------------------------------------------------------------

/// Decides whether a caller may perform an operation on a category.
pub trait Authorizer: Send + Sync {
    fn has_permission(
        &self,
        caller: &CallerContext,
        category: EntityCategory,
        permission: Permission,
    ) -> bool;
}

/// Authorizer that trusts the grants carried by the caller context.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAuthorizer;

impl Authorizer for GrantAuthorizer {
    fn has_permission(
        &self,
        caller: &CallerContext,
        category: EntityCategory,
        permission: Permission,
    ) -> bool {
        caller.permissions.contains(&(category, permission))
    }
}

/// Fail with [`CoreError::Forbidden`] unless every permission is held.
pub fn require(
    authorizer: &dyn Authorizer,
    caller: &CallerContext,
    category: EntityCategory,
    permissions: &[Permission],
) -> Result<(), CoreError> {
    for &permission in permissions {
        if !authorizer.has_permission(caller, category, permission) {
            return Err(CoreError::Forbidden(format!(
                "{} lacks {} permission on {}",
                caller.identity,
                permission.as_str(),
                category.as_str()
            )));
        }
    }
    Ok(())
}

/// Fail with [`CoreError::Forbidden`] when `tenant_id` is not the caller's.
pub fn require_same_tenant(caller: &CallerContext, tenant_id: TenantId) -> Result<(), CoreError> {
    if caller.tenant_id != tenant_id {
        return Err(CoreError::Forbidden(format!(
            "{} may not act on tenant {tenant_id}",
            caller.identity
        )));
    }
    Ok(())
}
