//! Caller-supplied description of one test run's dependency needs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dependency::{merge_dependencies, Dependency};
use crate::inventory::EntityCategory;
use crate::types::{DbId, TenantId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Run identifier; its string form is used as the lease owner.
    pub run_id: Uuid,
    pub tenant_id: TenantId,
    pub project_id: Option<DbId>,
    pub team_id: Option<DbId>,
    /// Expiry written into every lease taken for this run.
    pub resource_expiry: Timestamp,
    #[serde(default)]
    pub account_dependencies: Vec<Dependency>,
    #[serde(default)]
    pub resource_dependencies: Vec<Dependency>,
}

impl ExecutionContext {
    pub fn new(run_id: Uuid, tenant_id: TenantId, resource_expiry: Timestamp) -> Self {
        Self {
            run_id,
            tenant_id,
            project_id: None,
            team_id: None,
            resource_expiry,
            account_dependencies: Vec::new(),
            resource_dependencies: Vec::new(),
        }
    }

    /// The owner string stamped into leases for this run.
    pub fn lock_owner(&self) -> String {
        self.run_id.to_string()
    }

    /// The ordered demand list for one entity category.
    pub fn dependencies(&self, category: EntityCategory) -> &[Dependency] {
        match category {
            EntityCategory::Account => &self.account_dependencies,
            EntityCategory::Resource => &self.resource_dependencies,
        }
    }

    /// Fold additional requirements (from a suite or run template) into this
    /// context's own lists.
    pub fn merge_inherited(&mut self, accounts: &[Dependency], resources: &[Dependency]) {
        self.account_dependencies = merge_dependencies(&self.account_dependencies, accounts);
        self.resource_dependencies = merge_dependencies(&self.resource_dependencies, resources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::AttributeRequirement;

    #[test]
    fn lock_owner_is_run_id_string() {
        let run_id = Uuid::new_v4();
        let ctx = ExecutionContext::new(run_id, 1, chrono::Utc::now());
        assert_eq!(ctx.lock_owner(), run_id.to_string());
    }

    #[test]
    fn merge_inherited_merges_each_category_separately() {
        let mut ctx = ExecutionContext::new(Uuid::new_v4(), 1, chrono::Utc::now());
        ctx.resource_dependencies = vec![Dependency::new("phone")];

        ctx.merge_inherited(
            &[Dependency::new("email")],
            &[Dependency::new("phone").with_attribute(AttributeRequirement::equals("os", "ios"))],
        );

        assert_eq!(ctx.dependencies(EntityCategory::Account).len(), 1);
        let phones = ctx.dependencies(EntityCategory::Resource);
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].attributes.len(), 1);
    }
}
