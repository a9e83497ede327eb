//! Persistence layer for activity instances
//!
//! This module provides:
//! - [`ActivityStore`] trait with version-checked saves
//! - [`InMemoryActivityStore`] for testing
//! - [`PostgresActivityStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryActivityStore;
pub use postgres::PostgresActivityStore;
pub use store::{ActivityStore, StoreError, Versioned};
