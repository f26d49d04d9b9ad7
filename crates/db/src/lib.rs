//! Inventory persistence for the lease engine.
//!
//! - [`repositories::InventoryRepository`]: the storage contract used by the
//!   allocator, the release sweep and the inventory manager.
//! - [`memory::InMemoryInventory`]: process-local store, used by tests and
//!   embedded runners.
//! - [`repositories::PgAccountRepo`] / [`repositories::PgResourceRepo`]:
//!   PostgreSQL stores with compare-and-set lease writes.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod repositories;

pub use error::StoreError;
pub use pagination::Page;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool is usable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded inventory migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
