//! Inventory change notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`InventoryEvent`]: the event envelope published by inventory managers.

pub mod bus;

pub use bus::{EventBus, InventoryEvent};
