//! Storage error type shared by every inventory store.

/// Errors raised by inventory stores.
///
/// Propagated unmodified by the lease engine; there is no retry layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back to a domain entity.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<testbed_core::error::CoreError> for StoreError {
    fn from(err: testbed_core::error::CoreError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
