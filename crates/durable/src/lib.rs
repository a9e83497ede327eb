//! # Durable Activity Engine
//!
//! The activity-attempt core of a workflow orchestration engine: attempts are
//! retried with backoff, and operators can pause, unpause, reset or cancel
//! them while the engine keeps at most one execution in flight.
//!
//! ## Features
//!
//! - **Attempt state machine**: schedule, start, complete, fail, pause, unpause, reset, cancel
//! - **Retry policies**: exponential backoff with caps, attempt limits and non-retryable types
//! - **Effect ledger**: timers and dispatches are released only after the transition commits
//! - **Optimistic persistence**: version-checked saves, in memory or in PostgreSQL
//! - **In-process runtime**: tokio timers, channel dispatch and an activity worker
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ActivityEngine                          │
//! │  (load → AttemptMachine → versioned save → commit effects)   │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐     ┌──────────────────────────────┐
//! │      ActivityStore       │     │  UnitOfWork / EffectLedger   │
//! │ (memory, PostgreSQL)     │     │ (on_commit / on_rollback)    │
//! └──────────────────────────┘     └──────────────────────────────┘
//!                                                │ committed effects
//!                                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          TimerService / Dispatcher → ActivityWorker          │
//! │  (arms backoff timers, delivers tasks, runs handlers)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use relay_durable::prelude::*;
//!
//! let store = Arc::new(InMemoryActivityStore::new());
//! let (engine, worker) = in_process(store, EngineConfig::default(), Arc::new(SystemClock));
//!
//! worker.register_handler("send_email", |ctx| async move {
//!     send(ctx.input).await.map_err(|e| FailureDetail::new(e.to_string()))
//! });
//! worker.start()?;
//!
//! let snapshot = engine
//!     .schedule(ScheduleActivity::new(workflow_id, "welcome", "send_email", json!({})))
//!     .await?;
//! ```

pub mod activity;
pub mod clock;
pub mod config;
pub mod effect;
pub mod engine;
pub mod metrics;
pub mod persistence;
pub mod reliability;
pub mod runtime;

mod serde_util;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{
        ActivityKey, ActivityOptions, ActivitySnapshot, ActivityStatus, Collaborators,
        DispatchTask, FailureDetail, ScheduleActivity, TimerToken,
    };
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{EngineConfig, RuntimeMetricsConfig, WorkerConfig};
    pub use crate::effect::{EffectLedger, Outcome, UnitOfWork};
    pub use crate::engine::{ActivityEngine, EngineError};
    pub use crate::persistence::{
        ActivityStore, InMemoryActivityStore, PostgresActivityStore, StoreError,
    };
    pub use crate::reliability::{RetryPolicy, TimeoutConfig};
    pub use crate::runtime::{in_process, ActivityWorker, AttemptContext, WorkerError};
}

// Re-export key types at crate root
pub use activity::{
    ActivityKey, ActivityOptions, ActivitySnapshot, ActivityStatus, FailureDetail,
    ScheduleActivity,
};
pub use config::EngineConfig;
pub use effect::{EffectLedger, UnitOfWork};
pub use engine::{ActivityEngine, EngineError};
pub use persistence::{ActivityStore, InMemoryActivityStore, PostgresActivityStore, StoreError};
pub use reliability::RetryPolicy;
