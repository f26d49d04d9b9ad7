//! Pure domain logic for the test dependency allocation & lease engine.
//!
//! Nothing in this crate performs I/O. Storage lives in `testbed-db`, the
//! orchestration (permission gate, allocation, release) in `testbed-leasing`.

pub mod bag;
pub mod caller;
pub mod clock;
pub mod dependency;
pub mod error;
pub mod execution;
pub mod inventory;
pub mod reconcile;
pub mod specification;
pub mod types;
