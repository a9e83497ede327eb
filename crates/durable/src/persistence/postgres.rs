//! PostgreSQL implementation of ActivityStore
//!
//! Each instance is one row: the full state as JSONB plus a few
//! denormalized columns for operators, guarded by a version counter.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::{ActivityStore, StoreError, Versioned};
use crate::activity::{ActivityInstance, ActivityKey};

/// PostgreSQL implementation of ActivityStore
///
/// # Example
///
/// ```ignore
/// use relay_durable::PostgresActivityStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/mydb").await?;
/// let store = PostgresActivityStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresActivityStore {
    pool: PgPool,
}

impl PostgresActivityStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl ActivityStore for PostgresActivityStore {
    #[instrument(skip(self, instance), fields(key = %instance.key))]
    async fn insert(&self, instance: &ActivityInstance) -> Result<u64, StoreError> {
        let state = serde_json::to_value(instance)?;

        let result = sqlx::query(
            r#"
            INSERT INTO durable_activity_instances
                (workflow_id, activity_id, activity_type, status, attempt, paused, state, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
            ON CONFLICT (workflow_id, activity_id) DO NOTHING
            "#,
        )
        .bind(instance.key.workflow_id)
        .bind(&instance.key.activity_id)
        .bind(&instance.activity_type)
        .bind(instance.status.as_str())
        .bind(instance.attempt as i32)
        .bind(instance.paused)
        .bind(&state)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert activity: {}", e);
            StoreError::Database(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(instance.key.clone()));
        }

        debug!("inserted activity");
        Ok(1)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn load(&self, key: &ActivityKey) -> Result<Versioned, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT state, version
            FROM durable_activity_instances
            WHERE workflow_id = $1 AND activity_id = $2
            "#,
        )
        .bind(key.workflow_id)
        .bind(&key.activity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load activity: {}", e);
            StoreError::Database(e.to_string())
        })?
        .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let state: serde_json::Value = row.get("state");
        let version: i64 = row.get("version");
        Ok(Versioned {
            version: version as u64,
            instance: serde_json::from_value(state)?,
        })
    }

    #[instrument(skip(self, instance), fields(key = %instance.key))]
    async fn save(
        &self,
        instance: &ActivityInstance,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let state = serde_json::to_value(instance)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        // Lock the row and check the version
        let row = sqlx::query(
            r#"
            SELECT version FROM durable_activity_instances
            WHERE workflow_id = $1 AND activity_id = $2
            FOR UPDATE
            "#,
        )
        .bind(instance.key.workflow_id)
        .bind(&instance.key.activity_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(instance.key.clone()))?;

        let current_version = row.get::<i64, _>("version") as u64;
        if current_version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_version,
                actual: current_version,
            });
        }

        let new_version = current_version + 1;
        sqlx::query(
            r#"
            UPDATE durable_activity_instances
            SET status = $3, attempt = $4, paused = $5, state = $6,
                version = $7, updated_at = NOW()
            WHERE workflow_id = $1 AND activity_id = $2
            "#,
        )
        .bind(instance.key.workflow_id)
        .bind(&instance.key.activity_id)
        .bind(instance.status.as_str())
        .bind(instance.attempt as i32)
        .bind(instance.paused)
        .bind(&state)
        .bind(new_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(new_version, status = %instance.status, "saved activity");
        Ok(new_version)
    }

    #[instrument(skip(self))]
    async fn list(&self, workflow_id: Uuid) -> Result<Vec<ActivityInstance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT state FROM durable_activity_instances
            WHERE workflow_id = $1
            ORDER BY activity_id
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list activities: {}", e);
            StoreError::Database(e.to_string())
        })?;

        rows.into_iter()
            .map(|row| {
                let state: serde_json::Value = row.get("state");
                serde_json::from_value(state).map_err(StoreError::from)
            })
            .collect()
    }
}
