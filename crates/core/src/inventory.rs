//! Inventory entities: allocatable test accounts and test resources.
//!
//! Both kinds share the [`InventoryEntity`] contract used by the
//! specification pipeline, the allocator and the variable bag. The lease
//! triple (locked, lock owner, lock expiry) is held as a single
//! `Option<Lease>` so that the three values are always set and cleared
//! together.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, TenantId, Timestamp};

/// Opaque payload exposed to a run once an entity is leased.
pub type Variables = BTreeMap<String, String>;

/// Id carried by an entity that has not been persisted yet.
pub const UNSAVED_ID: DbId = 0;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The permission and namespace category an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Account,
    Resource,
}

impl EntityCategory {
    /// Singular name used in event types and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityCategory::Account => "account",
            EntityCategory::Resource => "resource",
        }
    }

    /// Namespace tag used when rendering bag variables.
    pub fn namespace(self) -> &'static str {
        match self {
            EntityCategory::Account => "accounts",
            EntityCategory::Resource => "resources",
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Tri-state health of a resource, as reported by external probes.
///
/// Discriminants match the `resource_health` SMALLINT column.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy = 1,
    Degraded = 2,
    Unhealthy = 3,
}

impl Health {
    /// Return the database health ID.
    pub fn id(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for Health {
    type Error = CoreError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Health::Healthy),
            2 => Ok(Health::Degraded),
            3 => Ok(Health::Unhealthy),
            other => Err(CoreError::Internal(format!("Unknown health id {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Lease and audit
// ---------------------------------------------------------------------------

/// A reservation of an entity by one holder, typically a run identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    /// Advisory; only the opt-in expiry reaper consults it.
    pub expires: Timestamp,
}

impl Lease {
    pub fn new(owner: impl Into<String>, expires: Timestamp) -> Self {
        Self {
            owner: owner.into(),
            expires,
        }
    }
}

/// Creation and modification stamps, written by the inventory manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created: Timestamp,
    pub created_by: String,
    pub modified: Timestamp,
    pub modified_by: String,
}

impl Audit {
    /// Stamps for a freshly created entity.
    pub fn created(now: Timestamp, actor: &str) -> Self {
        Self {
            created: now,
            created_by: actor.to_string(),
            modified: now,
            modified_by: actor.to_string(),
        }
    }

    /// Refresh the modification stamps, leaving `created*` untouched.
    pub fn touch(&mut self, now: Timestamp, actor: &str) {
        self.modified = now;
        self.modified_by = actor.to_string();
    }
}

// ---------------------------------------------------------------------------
// Shared contract
// ---------------------------------------------------------------------------

/// Behaviour shared by every allocatable inventory entity.
pub trait InventoryEntity: Clone + Send + Sync + 'static {
    const CATEGORY: EntityCategory;

    fn id(&self) -> DbId;
    fn set_id(&mut self, id: DbId);
    fn tenant_id(&self) -> TenantId;
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;

    /// `None` for kinds without a health concept (accounts).
    fn health(&self) -> Option<Health> {
        None
    }

    /// Every capability type string the entity declares, in declaration order.
    fn types(&self) -> &[String];

    fn lease(&self) -> Option<&Lease>;
    fn set_lease(&mut self, lease: Option<Lease>);

    fn variables(&self) -> &Variables;
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;

    fn is_locked(&self) -> bool {
        self.lease().is_some()
    }

    fn lock_owner(&self) -> Option<&str> {
        self.lease().map(|lease| lease.owner.as_str())
    }

    fn has_type(&self, wanted: &str) -> bool {
        self.types().iter().any(|t| t == wanted)
    }

    /// Whether the two entities declare at least one common type.
    fn shares_type_with(&self, other: &Self) -> bool {
        self.types().iter().any(|t| other.has_type(t))
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A test account (email, SSO user, API tenant, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Free-text origin label. Not the lease owner.
    pub owner: String,
    pub account_type: String,
    pub sub_type: Option<String>,
    pub enabled: bool,
    pub lease: Option<Lease>,
    pub variables: Variables,
    pub audit: Audit,
}

impl Account {
    /// An unsaved, enabled, unlocked account.
    pub fn new(tenant_id: TenantId, name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            tenant_id,
            name: name.into(),
            owner: String::new(),
            account_type: account_type.into(),
            sub_type: None,
            enabled: true,
            lease: None,
            variables: Variables::new(),
            audit: Audit::default(),
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = Some(sub_type.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl InventoryEntity for Account {
    const CATEGORY: EntityCategory = EntityCategory::Account;

    fn id(&self) -> DbId {
        self.id
    }

    fn set_id(&mut self, id: DbId) {
        self.id = id;
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn types(&self) -> &[String] {
        std::slice::from_ref(&self.account_type)
    }

    fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    fn set_lease(&mut self, lease: Option<Lease>) {
        self.lease = lease;
    }

    fn variables(&self) -> &Variables {
        &self.variables
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A physical or virtual test resource. One resource may satisfy several
/// capability types at once (a phone that is also a calculator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Free-text origin label. Not the lease owner.
    pub owner: String,
    /// Identifier of the resource in the external source that reported it.
    pub resource_key: String,
    pub types: Vec<String>,
    pub health: Health,
    pub enabled: bool,
    pub lease: Option<Lease>,
    pub variables: Variables,
    pub audit: Audit,
}

impl Resource {
    /// An unsaved, healthy, enabled, unlocked resource.
    ///
    /// Duplicate type strings are dropped; first occurrence order is kept.
    pub fn new<I, S>(tenant_id: TenantId, name: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: UNSAVED_ID,
            tenant_id,
            name: name.into(),
            owner: String::new(),
            resource_key: String::new(),
            types: dedup_types(types),
            health: Health::Healthy,
            enabled: true,
            lease: None,
            variables: Variables::new(),
            audit: Audit::default(),
        }
    }

    pub fn with_source(mut self, owner: impl Into<String>, resource_key: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.resource_key = resource_key.into();
        self
    }

    pub fn with_health(mut self, health: Health) -> Self {
        self.health = health;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

impl InventoryEntity for Resource {
    const CATEGORY: EntityCategory = EntityCategory::Resource;

    fn id(&self) -> DbId {
        self.id
    }

    fn set_id(&mut self, id: DbId) {
        self.id = id;
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn health(&self) -> Option<Health> {
        Some(self.health)
    }

    fn types(&self) -> &[String] {
        &self.types
    }

    fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    fn set_lease(&mut self, lease: Option<Lease>) {
        self.lease = lease;
    }

    fn variables(&self) -> &Variables {
        &self.variables
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }
}

/// Collapse a type list into an order-preserving set.
pub fn dedup_types<I, S>(types: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for t in types {
        let t = t.into();
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}
