//! Row structs for the inventory tables.
//!
//! Each submodule contains a `FromRow` struct matching the table columns and
//! the conversion into the corresponding `testbed_core` entity.

pub mod account;
pub mod resource;

use testbed_core::inventory::Lease;
use testbed_core::types::Timestamp;

use crate::error::StoreError;

/// Rebuild the lease from its two nullable columns.
pub(crate) fn lease_from_columns(
    lock_owner: Option<String>,
    lock_expires_at: Option<Timestamp>,
) -> Result<Option<Lease>, StoreError> {
    match (lock_owner, lock_expires_at) {
        (Some(owner), Some(expires)) => Ok(Some(Lease { owner, expires })),
        (None, None) => Ok(None),
        _ => Err(StoreError::Serialization(
            "lock_owner and lock_expires_at must be set together".to_string(),
        )),
    }
}
