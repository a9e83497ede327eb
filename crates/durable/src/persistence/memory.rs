//! In-memory implementation of ActivityStore for testing

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::{ActivityStore, StoreError, Versioned};
use crate::activity::{ActivityInstance, ActivityKey};

/// In-memory implementation of ActivityStore
///
/// This is primarily for testing. It provides the same optimistic
/// versioning semantics as the PostgreSQL implementation.
///
/// # Example
///
/// ```
/// use relay_durable::InMemoryActivityStore;
///
/// let store = InMemoryActivityStore::new();
/// assert_eq!(store.len(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryActivityStore {
    instances: RwLock<BTreeMap<ActivityKey, Versioned>>,
    failing_saves: AtomicUsize,
    conflicting_saves: AtomicUsize,
}

impl InMemoryActivityStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Fail the next `n` saves with a database error (for testing)
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` saves lose the version race (for testing)
    ///
    /// Each forced conflict bumps the stored version, as a concurrent
    /// writer would.
    pub fn conflict_next_saves(&self, n: usize) {
        self.conflicting_saves.store(n, Ordering::SeqCst);
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.instances.write().clear();
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn insert(&self, instance: &ActivityInstance) -> Result<u64, StoreError> {
        let mut instances = self.instances.write();
        if instances.contains_key(&instance.key) {
            return Err(StoreError::AlreadyExists(instance.key.clone()));
        }
        instances.insert(
            instance.key.clone(),
            Versioned {
                version: 1,
                instance: instance.clone(),
            },
        );
        Ok(1)
    }

    async fn load(&self, key: &ActivityKey) -> Result<Versioned, StoreError> {
        self.instances
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn save(
        &self,
        instance: &ActivityInstance,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        if Self::take_one(&self.failing_saves) {
            return Err(StoreError::Database("injected save failure".to_string()));
        }

        let mut instances = self.instances.write();
        let stored = instances
            .get_mut(&instance.key)
            .ok_or_else(|| StoreError::NotFound(instance.key.clone()))?;

        if Self::take_one(&self.conflicting_saves) {
            stored.version += 1;
        }

        if stored.version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_version,
                actual: stored.version,
            });
        }

        stored.version += 1;
        stored.instance = instance.clone();
        Ok(stored.version)
    }

    async fn list(&self, workflow_id: Uuid) -> Result<Vec<ActivityInstance>, StoreError> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|v| v.instance.key.workflow_id == workflow_id)
            .map(|v| v.instance.clone())
            .collect())
    }
}
