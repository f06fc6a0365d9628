//! # corral-testing
//!
//! In-process test infrastructure for pool development: a mock
//! connection factory with deterministic ids, creation/release counters,
//! and failure injection. No external service required.

pub mod mock;

pub use mock::{MockConnection, MockFactory};
