//! Activity engine: the control surface over persisted activity instances
//!
//! Every operation follows the same shape:
//!
//! 1. load the instance and its version
//! 2. open a [`UnitOfWork`] and run the transition on the
//!    [`AttemptMachine`], which registers effects on the unit's ledger
//! 3. save conditionally on the version read
//! 4. commit the unit if the save succeeded, roll it back otherwise
//!
//! A save that loses the version race is retried from step 1, so
//! concurrent operations on one instance serialize without locks and the
//! losers' effects never run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::activity::{
    ActivityInstance, ActivityKey, ActivitySnapshot, ActivityStatus, AttemptMachine,
    Collaborators, DispatchTask, FailOutcome, FailureDetail, Operation, ScheduleActivity,
    TimerOutcome, TimerToken, TransitionError,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::effect::{ResolutionReport, UnitOfWork};
use crate::metrics::{EngineMetrics, EngineMetricsSnapshot};
use crate::persistence::{ActivityStore, StoreError, Versioned};
use crate::reliability::{RetryPolicyError, TimeoutType};

/// Errors returned by engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("activity not found: {0}")]
    NotFound(ActivityKey),

    #[error("activity already exists: {0}")]
    AlreadyExists(ActivityKey),

    #[error("cannot {operation} activity in status {status}")]
    InvalidStateTransition {
        operation: Operation,
        status: ActivityStatus,
    },

    /// Dispatch task superseded by a later scheduling decision
    #[error("stale dispatch for {key}: task stamp {task}, current stamp {current}")]
    StaleDispatch {
        key: ActivityKey,
        task: u32,
        current: u32,
    },

    #[error("activity {key} exceeded its {timeout} deadline ({deadline})")]
    DeadlineExceeded {
        key: ActivityKey,
        timeout: TimeoutType,
        deadline: DateTime<Utc>,
    },

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(#[from] RetryPolicyError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("activity {key}: gave up after {attempts} conflicting saves")]
    ConflictRetriesExhausted { key: ActivityKey, attempts: u32 },
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::AlreadyExists(key) => Self::AlreadyExists(key),
            other => Self::Store(other),
        }
    }
}

impl EngineError {
    fn from_transition(key: &ActivityKey, e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidState { operation, status } => {
                Self::InvalidStateTransition { operation, status }
            }
            TransitionError::StaleDispatch { task, current } => Self::StaleDispatch {
                key: key.clone(),
                task,
                current,
            },
        }
    }

    fn deadline_exceeded(instance: &ActivityInstance) -> Self {
        let timeout = instance
            .timeout_type
            .unwrap_or(TimeoutType::ScheduleToClose);
        Self::DeadlineExceeded {
            key: instance.key.clone(),
            timeout,
            deadline: instance
                .deadlines
                .get(timeout)
                .unwrap_or(instance.updated_at),
        }
    }
}

/// Outcome of running a transition against a loaded instance
enum Applied<T> {
    Done(T),
    TimedOut(TimeoutType),
}

/// Durable control surface for activity instances
///
/// # Example
///
/// ```ignore
/// use relay_durable::prelude::*;
///
/// let engine = ActivityEngine::new(store, collaborators, EngineConfig::default());
/// let snapshot = engine
///     .schedule(ScheduleActivity::new(workflow_id, "charge", "charge_card", input))
///     .await?;
/// engine.pause(&snapshot.key).await?;
/// engine.reset(&snapshot.key, true).await?;
/// ```
#[derive(Clone)]
pub struct ActivityEngine {
    store: Arc<dyn ActivityStore>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
}

impl ActivityEngine {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            collaborators,
            clock: Arc::new(SystemClock),
            config,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Create an instance and make attempt 1 eligible to run
    #[instrument(skip(self, request), fields(key = %request.key, activity_type = %request.activity_type))]
    pub async fn schedule(
        &self,
        request: ScheduleActivity,
    ) -> Result<ActivitySnapshot, EngineError> {
        let policy = request
            .options
            .retry_policy
            .clone()
            .unwrap_or_else(|| self.config.default_retry_policy.clone());
        policy.validate()?;

        let now = self.clock.now();
        let mut instance = ActivityInstance::new(request, policy, now);
        let mut uow = self.begin(&instance.key, Operation::Schedule);
        let mut machine =
            AttemptMachine::new(&mut instance, uow.effects(), &self.collaborators, now);
        if let Err(e) = machine.schedule() {
            uow.rollback();
            return Err(EngineError::from_transition(&instance.key, e));
        }

        let inserted = self.store.insert(&instance).await;
        let report = uow.settle(&inserted);
        self.observe(&report);
        inserted?;

        self.metrics.record_scheduled();
        info!(paused = instance.paused, "activity scheduled");
        Ok(instance.snapshot())
    }

    /// A worker picked up `task`; the attempt becomes in flight
    #[instrument(skip(self, task), fields(key = %task.key, attempt = task.attempt))]
    pub async fn start(&self, task: &DispatchTask) -> Result<ActivitySnapshot, EngineError> {
        let stamp = task.stamp;
        let ((), snapshot) = self
            .transition(&task.key, Operation::Start, |m| m.start(stamp))
            .await?;
        self.metrics.record_started();
        debug!("attempt started");
        Ok(snapshot)
    }

    #[instrument(skip(self, result), fields(key = %key))]
    pub async fn complete(
        &self,
        key: &ActivityKey,
        result: serde_json::Value,
    ) -> Result<ActivitySnapshot, EngineError> {
        let ((), snapshot) = self
            .transition(key, Operation::Complete, move |m| m.complete(result.clone()))
            .await?;
        self.metrics.record_completed();
        info!(attempt = snapshot.attempt, "activity completed");
        Ok(snapshot)
    }

    /// Report a failed attempt; schedules a retry or fails the activity
    #[instrument(skip(self, failure), fields(key = %key))]
    pub async fn fail(
        &self,
        key: &ActivityKey,
        failure: FailureDetail,
    ) -> Result<ActivitySnapshot, EngineError> {
        let (outcome, snapshot) = self
            .transition(key, Operation::Fail, move |m| m.fail(failure.clone()))
            .await?;

        match outcome {
            FailOutcome::Retrying { attempt, delay } => {
                self.metrics.record_retried();
                info!(attempt, ?delay, paused = snapshot.paused, "attempt failed, retry scheduled");
            }
            FailOutcome::Exhausted(reason) => {
                self.metrics.record_failed();
                warn!(attempt = snapshot.attempt, %reason, "activity failed");
            }
        }
        Ok(snapshot)
    }

    /// Suppress scheduling of further attempts; idempotent
    #[instrument(skip(self), fields(key = %key))]
    pub async fn pause(&self, key: &ActivityKey) -> Result<ActivitySnapshot, EngineError> {
        let (changed, snapshot) = self.transition(key, Operation::Pause, |m| m.pause()).await?;
        if changed {
            self.metrics.record_paused();
        }
        info!(status = %snapshot.status, "activity paused");
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(key = %key))]
    pub async fn unpause(&self, key: &ActivityKey) -> Result<ActivitySnapshot, EngineError> {
        let ((), snapshot) = self
            .transition(key, Operation::Unpause, |m| m.unpause())
            .await?;
        self.metrics.record_unpaused();
        info!(status = %snapshot.status, "activity unpaused");
        Ok(snapshot)
    }

    /// Restart the attempt series at attempt 1
    #[instrument(skip(self), fields(key = %key))]
    pub async fn reset(
        &self,
        key: &ActivityKey,
        keep_paused: bool,
    ) -> Result<ActivitySnapshot, EngineError> {
        let ((), snapshot) = self
            .transition(key, Operation::Reset, |m| m.reset(keep_paused))
            .await?;
        self.metrics.record_reset();
        info!(status = %snapshot.status, paused = snapshot.paused, "activity reset");
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(key = %key))]
    pub async fn cancel(&self, key: &ActivityKey) -> Result<ActivitySnapshot, EngineError> {
        let ((), snapshot) = self
            .transition(key, Operation::Cancel, |m| m.cancel())
            .await?;
        self.metrics.record_cancelled();
        info!("activity cancelled");
        Ok(snapshot)
    }

    /// A backoff timer fired for `key`
    #[instrument(skip(self), fields(key = %key, %token))]
    pub async fn attempt_due(
        &self,
        key: &ActivityKey,
        token: TimerToken,
    ) -> Result<ActivitySnapshot, EngineError> {
        let (outcome, snapshot) = self
            .transition(key, Operation::AttemptDue, |m| Ok(m.attempt_due(token)))
            .await?;
        match outcome {
            TimerOutcome::Dispatched => debug!(attempt = snapshot.attempt, "retry dispatched"),
            TimerOutcome::Ignored(reason) => debug!(?reason, "timer fire ignored"),
        }
        Ok(snapshot)
    }

    pub async fn describe(&self, key: &ActivityKey) -> Result<ActivitySnapshot, EngineError> {
        Ok(self.store.load(key).await?.instance.snapshot())
    }

    /// Snapshots of every activity of one workflow execution
    pub async fn list(&self, workflow_id: Uuid) -> Result<Vec<ActivitySnapshot>, EngineError> {
        Ok(self
            .store
            .list(workflow_id)
            .await?
            .iter()
            .map(ActivityInstance::snapshot)
            .collect())
    }

    /// Run `apply` against the latest state until a save sticks
    async fn transition<T, F>(
        &self,
        key: &ActivityKey,
        operation: Operation,
        mut apply: F,
    ) -> Result<(T, ActivitySnapshot), EngineError>
    where
        F: FnMut(&mut AttemptMachine<'_>) -> Result<T, TransitionError> + Send,
        T: Send,
    {
        let mut conflicts = 0u32;
        loop {
            let Versioned { version, instance } = self.store.load(key).await?;
            if instance.status == ActivityStatus::TimedOut {
                return Err(EngineError::deadline_exceeded(&instance));
            }

            let now = self.clock.now();
            let mut next = instance.clone();
            let mut uow = self.begin(key, operation);
            let applied = {
                let mut machine =
                    AttemptMachine::new(&mut next, uow.effects(), &self.collaborators, now);
                match machine.enforce_deadlines() {
                    Some(kind) => Ok(Applied::TimedOut(kind)),
                    None => apply(&mut machine).map(Applied::Done),
                }
            };

            let applied = match applied {
                Ok(applied) => applied,
                Err(e) => {
                    uow.rollback();
                    return Err(EngineError::from_transition(key, e));
                }
            };

            if next == instance {
                // Nothing to persist
                self.observe(&uow.commit());
                return match applied {
                    Applied::Done(value) => Ok((value, next.snapshot())),
                    Applied::TimedOut(_) => Err(EngineError::deadline_exceeded(&next)),
                };
            }

            match self.store.save(&next, version).await {
                Ok(_) => {
                    self.observe(&uow.commit());
                    return match applied {
                        Applied::Done(value) => Ok((value, next.snapshot())),
                        Applied::TimedOut(kind) => {
                            self.metrics.record_timed_out();
                            warn!(%key, timeout = %kind, %operation, "activity timed out");
                            Err(EngineError::deadline_exceeded(&next))
                        }
                    };
                }
                Err(e) if e.is_conflict() => {
                    uow.rollback();
                    self.metrics.record_conflict();
                    conflicts += 1;
                    if conflicts > self.config.max_conflict_retries {
                        warn!(%key, %operation, conflicts, "giving up on conflicting transition");
                        return Err(EngineError::ConflictRetriesExhausted {
                            key: key.clone(),
                            attempts: conflicts,
                        });
                    }
                    debug!(%key, %operation, conflicts, "version conflict, retrying from read");
                }
                Err(e) => {
                    uow.rollback();
                    return Err(e.into());
                }
            }
        }
    }

    /// Open a unit of work that counts and logs its own rollback
    fn begin(&self, key: &ActivityKey, operation: Operation) -> UnitOfWork {
        let mut uow = UnitOfWork::begin();
        let metrics = Arc::clone(&self.metrics);
        let key = key.clone();
        uow.effects().on_rollback(move || {
            metrics.record_rolled_back();
            debug!(%key, %operation, "transition not persisted, effects discarded");
            Ok(())
        });
        uow
    }

    fn observe(&self, report: &ResolutionReport) {
        if !report.is_clean() {
            self.metrics.record_effect_failures(report.failures.len());
        }
    }
}

impl std::fmt::Debug for ActivityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityOptions, RecordingDispatcher, RecordingTimers, TimerCall};
    use crate::clock::ManualClock;
    use crate::persistence::InMemoryActivityStore;
    use crate::reliability::RetryPolicy;
    use std::time::Duration;

    struct Fixture {
        engine: ActivityEngine,
        store: Arc<InMemoryActivityStore>,
        timers: Arc<RecordingTimers>,
        dispatcher: Arc<RecordingDispatcher>,
        clock: ManualClock,
    }

    fn fixture_with(config: EngineConfig) -> Fixture {
        let store = Arc::new(InMemoryActivityStore::new());
        let timers = Arc::new(RecordingTimers::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let clock = ManualClock::default();
        let engine = ActivityEngine::new(
            store.clone(),
            Collaborators::new(timers.clone(), dispatcher.clone()),
            config,
        )
        .with_clock(Arc::new(clock.clone()));
        Fixture {
            engine,
            store,
            timers,
            dispatcher,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            EngineConfig::default()
                .with_default_retry_policy(RetryPolicy::fixed(Duration::from_secs(5), 0)),
        )
    }

    fn request(options: ActivityOptions) -> ScheduleActivity {
        ScheduleActivity::new(
            Uuid::now_v7(),
            "charge",
            "charge_card",
            serde_json::json!({"amount": 42}),
        )
        .with_options(options)
    }

    /// Schedule, start and fail once so the instance sits in backoff
    async fn in_backoff(f: &Fixture) -> ActivityKey {
        let snapshot = f.engine.schedule(request(ActivityOptions::default())).await.unwrap();
        let task = f.dispatcher.take().remove(0);
        f.engine.start(&task).await.unwrap();
        f.engine
            .fail(&snapshot.key, FailureDetail::new("declined"))
            .await
            .unwrap();
        snapshot.key
    }

    #[tokio::test]
    async fn test_schedule_dispatches_attempt_one() {
        let f = fixture();
        let snapshot = f.engine.schedule(request(ActivityOptions::default())).await.unwrap();

        assert_eq!(snapshot.status, ActivityStatus::Scheduled);
        assert_eq!(snapshot.attempt, 1);
        let tasks = f.dispatcher.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].key, snapshot.key);
        assert_eq!(f.engine.metrics().scheduled, 1);
    }

    #[tokio::test]
    async fn test_schedule_duplicate_rejected_without_dispatch() {
        let f = fixture();
        let req = request(ActivityOptions::default());
        f.engine.schedule(req.clone()).await.unwrap();
        f.dispatcher.take();

        let err = f.engine.schedule(req).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
        assert!(f.dispatcher.is_empty());
        assert_eq!(f.engine.metrics().rolled_back, 1);
    }

    #[tokio::test]
    async fn test_schedule_rejects_invalid_policy() {
        let f = fixture();
        let options = ActivityOptions::default()
            .with_retry(RetryPolicy::default().with_backoff_coefficient(0.5));
        let err = f.engine.schedule(request(options)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidPolicy(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_retry_flow() {
        let f = fixture();
        let key = in_backoff(&f).await;

        let snapshot = f.engine.describe(&key).await.unwrap();
        assert_eq!(snapshot.status, ActivityStatus::Scheduled);
        assert_eq!(snapshot.attempt, 2);
        assert!(snapshot.timer_pending);

        let (token, fire_at) = f.timers.armed()[0];
        assert_eq!(fire_at, f.clock.now() + chrono::Duration::seconds(5));

        f.clock.advance(Duration::from_secs(5));
        f.engine.attempt_due(&key, token).await.unwrap();
        let tasks = f.dispatcher.take();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].attempt, 2);

        f.engine.start(&tasks[0]).await.unwrap();
        let done = f
            .engine
            .complete(&key, serde_json::json!({"charged": true}))
            .await
            .unwrap();
        assert_eq!(done.status, ActivityStatus::Completed);
        assert_eq!(f.engine.metrics().retried, 1);
    }

    #[tokio::test]
    async fn test_failed_save_discards_effects() {
        let f = fixture();
        let key = in_backoff(&f).await;
        let before = f.store.load(&key).await.unwrap();
        f.timers.take();

        f.store.fail_next_saves(1);
        let err = f.engine.pause(&key).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Database(_))));
        assert!(f.timers.calls().is_empty());
        assert_eq!(f.store.load(&key).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_conflicts_retry_from_read() {
        let f = fixture();
        let key = in_backoff(&f).await;
        f.timers.take();

        f.store.conflict_next_saves(2);
        let snapshot = f.engine.pause(&key).await.unwrap();
        assert_eq!(snapshot.status, ActivityStatus::Paused);
        assert_eq!(f.engine.metrics().conflicts, 2);
        // Only the winning attempt's cancel ran
        assert_eq!(f.timers.cancelled().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_retries_exhausted() {
        let f = fixture_with(EngineConfig::default().with_max_conflict_retries(1));
        let key = in_backoff(&f).await;
        f.timers.take();

        f.store.conflict_next_saves(5);
        let err = f.engine.pause(&key).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConflictRetriesExhausted { attempts: 2, .. }
        ));
        assert!(f.timers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_pause_does_not_write() {
        let f = fixture();
        let key = in_backoff(&f).await;
        f.engine.pause(&key).await.unwrap();
        let version = f.store.load(&key).await.unwrap().version;

        f.engine.pause(&key).await.unwrap();
        assert_eq!(f.store.load(&key).await.unwrap().version, version);
    }

    #[tokio::test]
    async fn test_repeated_pause_counted_once() {
        let f = fixture();
        let key = in_backoff(&f).await;
        f.engine.pause(&key).await.unwrap();
        f.engine.pause(&key).await.unwrap();
        assert_eq!(f.engine.metrics().paused, 1);

        f.engine.unpause(&key).await.unwrap();
        f.engine.pause(&key).await.unwrap();
        assert_eq!(f.engine.metrics().paused, 2);
    }

    #[tokio::test]
    async fn test_start_to_close_deadline() {
        let f = fixture();
        let options = ActivityOptions::default().with_start_to_close_timeout(Duration::from_secs(5));
        let snapshot = f.engine.schedule(request(options)).await.unwrap();
        let task = f.dispatcher.take().remove(0);
        f.engine.start(&task).await.unwrap();

        f.clock.advance(Duration::from_secs(6));
        let err = f
            .engine
            .complete(&snapshot.key, serde_json::json!(null))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::DeadlineExceeded {
                timeout: TimeoutType::StartToClose,
                ..
            }
        ));

        let described = f.engine.describe(&snapshot.key).await.unwrap();
        assert_eq!(described.status, ActivityStatus::TimedOut);
        assert_eq!(described.timeout_type, Some(TimeoutType::StartToClose));

        let err = f.engine.reset(&snapshot.key, false).await.unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
        assert_eq!(f.engine.metrics().timed_out, 1);
    }

    #[tokio::test]
    async fn test_schedule_to_close_cancels_pending_timer() {
        let f = fixture();
        let options =
            ActivityOptions::default().with_schedule_to_close_timeout(Duration::from_secs(60));
        let snapshot = f.engine.schedule(request(options)).await.unwrap();
        let task = f.dispatcher.take().remove(0);
        f.engine.start(&task).await.unwrap();
        f.engine
            .fail(&snapshot.key, FailureDetail::new("declined"))
            .await
            .unwrap();
        let (token, _) = f.timers.armed()[0];

        f.clock.advance(Duration::from_secs(61));
        let err = f.engine.attempt_due(&snapshot.key, token).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::DeadlineExceeded {
                timeout: TimeoutType::ScheduleToClose,
                ..
            }
        ));
        assert!(f.timers.calls().contains(&TimerCall::Cancel { token }));
        assert!(f.dispatcher.is_empty());
    }

    #[tokio::test]
    async fn test_stale_dispatch_after_reset() {
        let f = fixture();
        let snapshot = f.engine.schedule(request(ActivityOptions::default())).await.unwrap();
        let stale = f.dispatcher.take().remove(0);

        f.engine.reset(&snapshot.key, false).await.unwrap();
        let fresh = f.dispatcher.take().remove(0);

        let err = f.engine.start(&stale).await.unwrap_err();
        assert!(matches!(err, EngineError::StaleDispatch { .. }));
        f.engine.start(&fresh).await.unwrap();

        // A duplicate delivery of the live task is rejected too
        let err = f.engine.start(&fresh).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidStateTransition {
                operation: Operation::Start,
                status: ActivityStatus::Started
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_rejects_late_completion() {
        let f = fixture();
        let snapshot = f.engine.schedule(request(ActivityOptions::default())).await.unwrap();
        let task = f.dispatcher.take().remove(0);
        f.engine.start(&task).await.unwrap();

        let cancelled = f.engine.cancel(&snapshot.key).await.unwrap();
        assert_eq!(cancelled.status, ActivityStatus::Cancelled);

        let err = f
            .engine
            .complete(&snapshot.key, serde_json::json!(null))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidStateTransition {
                operation: Operation::Complete,
                status: ActivityStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let f = fixture();
        let key = ActivityKey::new(Uuid::now_v7(), "missing");
        assert!(matches!(
            f.engine.pause(&key).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_workflow_activities() {
        let f = fixture();
        let workflow_id = Uuid::now_v7();
        for id in ["b", "a"] {
            f.engine
                .schedule(ScheduleActivity::new(
                    workflow_id,
                    id,
                    "noop",
                    serde_json::json!({}),
                ))
                .await
                .unwrap();
        }

        let listed = f.engine.list(workflow_id).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.key.activity_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
