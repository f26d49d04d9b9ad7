use testbed_core::error::CoreError;
use testbed_db::StoreError;

/// Errors returned by the lease engine's caller-facing operations.
#[derive(Debug, thiserror::Error)]
pub enum LeasingError {
    /// Argument, authorization and not-found failures. Raised before any
    /// storage write.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Propagated unchanged from the inventory store.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,
}
