//! ActivityStore trait definition

use async_trait::async_trait;
use uuid::Uuid;

use crate::activity::{ActivityInstance, ActivityKey};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Activity instance not found
    #[error("activity not found: {0}")]
    NotFound(ActivityKey),

    /// Activity instance already exists
    #[error("activity already exists: {0}")]
    AlreadyExists(ActivityKey),

    /// Concurrency conflict (optimistic locking failed)
    #[error("concurrency conflict: expected version {expected}, got {actual}")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// An instance together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub instance: ActivityInstance,
}

/// Durable storage for activity instances
///
/// Every write is conditional on the version the caller read. A save that
/// loses the race returns [`StoreError::ConcurrencyConflict`] and changes
/// nothing, which lets the engine roll back the effects registered for the
/// losing transition and retry from a fresh read.
#[async_trait]
pub trait ActivityStore: Send + Sync + 'static {
    /// Persist a new instance at version 1
    async fn insert(&self, instance: &ActivityInstance) -> Result<u64, StoreError>;

    /// Load the latest committed state
    async fn load(&self, key: &ActivityKey) -> Result<Versioned, StoreError>;

    /// Replace the instance if it is still at `expected_version`
    ///
    /// Returns the new version.
    async fn save(
        &self,
        instance: &ActivityInstance,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// All instances of one workflow, ordered by activity id
    async fn list(&self, workflow_id: Uuid) -> Result<Vec<ActivityInstance>, StoreError>;
}
