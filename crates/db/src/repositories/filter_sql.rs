//! Translation of [`Specification`] filters into SQL predicates.
//!
//! Column names are shared by `test_accounts` and `test_resources`; the two
//! places they differ (health, type) are decided by the entity category.

use sqlx::{Postgres, QueryBuilder};
use testbed_core::dependency::AttributeOperator;
use testbed_core::inventory::{EntityCategory, Health};
use testbed_core::specification::{Filter, Specification};

/// Append ` WHERE <f1> AND <f2> ...` for every filter in `spec`.
pub(crate) fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    category: EntityCategory,
    spec: &Specification,
) {
    qb.push(" WHERE TRUE");
    push_and(qb, category, spec);
}

/// Append ` AND <f>` for every filter in `spec`.
pub(crate) fn push_and(
    qb: &mut QueryBuilder<'_, Postgres>,
    category: EntityCategory,
    spec: &Specification,
) {
    for filter in spec.filters() {
        qb.push(" AND (");
        push_filter(qb, category, filter);
        qb.push(")");
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, category: EntityCategory, filter: &Filter) {
    match filter {
        Filter::Tenant(tenant_id) => {
            qb.push("tenant_id = ").push_bind(*tenant_id);
        }
        Filter::Enabled => {
            qb.push("is_enabled");
        }
        Filter::Healthy => match category {
            EntityCategory::Resource => {
                qb.push("health_id = ").push_bind(Health::Healthy.id());
            }
            // Accounts have no health concept.
            EntityCategory::Account => {
                qb.push("TRUE");
            }
        },
        Filter::Unlocked => {
            qb.push("lock_owner IS NULL");
        }
        Filter::Locked => {
            qb.push("lock_owner IS NOT NULL");
        }
        Filter::LockOwner(owner) => {
            qb.push("lock_owner = ").push_bind(owner.clone());
        }
        Filter::LockExpiredBefore(at) => {
            qb.push("lock_expires_at < ").push_bind(*at);
        }
        Filter::HasType(wanted) => match category {
            EntityCategory::Resource => {
                qb.push("types @> ")
                    .push_bind(serde_json::json!([wanted]));
            }
            EntityCategory::Account => {
                qb.push("account_type = ").push_bind(wanted.clone());
            }
        },
        Filter::Attribute(requirement) => {
            let name = requirement.name.clone();
            let value = requirement.value.clone();
            match requirement.operator {
                AttributeOperator::Equals => {
                    qb.push("(variables ->> ")
                        .push_bind(name)
                        .push(") = ")
                        .push_bind(value);
                }
                AttributeOperator::NotEquals => {
                    qb.push("(variables ->> ")
                        .push_bind(name)
                        .push(") IS DISTINCT FROM ")
                        .push_bind(value);
                }
                AttributeOperator::Contains => {
                    qb.push("COALESCE(strpos(variables ->> ")
                        .push_bind(name)
                        .push(", ")
                        .push_bind(value)
                        .push("), 0) > 0");
                }
            }
        }
        Filter::ExcludeIds(ids) => {
            let ids: Vec<i64> = ids.iter().copied().collect();
            qb.push("id <> ALL(").push_bind(ids).push(")");
        }
    }
}
