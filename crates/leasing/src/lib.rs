//! Orchestration layer of the lease engine.
//!
//! - [`manager::InventoryManager`]: permission-gated administration of the
//!   inventory, including reconciliation against external sources.
//! - [`allocator::DependencyAllocator`]: turns an execution context's demand
//!   list into a [`Bag`](testbed_core::bag::Bag) of leased entities.
//! - [`release::LeaseReleaser`]: clears every lease a run holds in a tenant.
//! - [`reaper`]: optional background sweep of expired leases.

pub mod allocator;
pub mod config;
pub mod error;
pub mod manager;
pub mod reaper;
pub mod release;

pub use allocator::DependencyAllocator;
pub use config::LeasingConfig;
pub use error::LeasingError;
pub use manager::{InventoryManager, ReconciliationSummary};
pub use release::LeaseReleaser;
