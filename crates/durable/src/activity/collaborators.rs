//! Timer and dispatch collaborators driven by committed transitions
//!
//! The attempt machine never calls these directly. It registers commit
//! callbacks that call them, so a timer is armed or a task enqueued only
//! once the transition that requested it is durable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::instance::{ActivityKey, TimerToken};

/// Error raised by a collaborator when it cannot accept a request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("timer service unavailable: {0}")]
    TimerUnavailable(String),

    #[error("dispatcher unavailable: {0}")]
    DispatcherUnavailable(String),
}

/// Work item handed to workers for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub key: ActivityKey,
    pub activity_type: String,
    pub input: serde_json::Value,
    pub attempt: u32,

    /// Scheduling stamp at the time of dispatch; `start` rejects a mismatch
    pub stamp: u32,
}

/// Notification that a backoff timer elapsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub key: ActivityKey,
    pub token: TimerToken,
}

/// Arms and cancels backoff timers
pub trait TimerService: Send + Sync + 'static {
    /// Fire `token` for `key` at `fire_at`
    fn arm(
        &self,
        key: &ActivityKey,
        token: TimerToken,
        fire_at: DateTime<Utc>,
    ) -> Result<(), CollaboratorError>;

    /// Cancel an outstanding timer; unknown tokens are ignored
    fn cancel(&self, token: TimerToken) -> Result<(), CollaboratorError>;
}

/// Accepts attempts ready for execution
pub trait Dispatcher: Send + Sync + 'static {
    fn enqueue(&self, task: DispatchTask) -> Result<(), CollaboratorError>;
}

/// Handles the machine registers effects against
#[derive(Clone)]
pub struct Collaborators {
    pub timers: Arc<dyn TimerService>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl Collaborators {
    pub fn new(timers: Arc<dyn TimerService>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { timers, dispatcher }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Call observed by [`RecordingTimers`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCall {
    Arm {
        key: ActivityKey,
        token: TimerToken,
        fire_at: DateTime<Utc>,
    },
    Cancel {
        token: TimerToken,
    },
}

/// Timer service that only records calls
///
/// Useful for driving the engine deterministically: tests inspect the
/// armed tokens and feed them back through `attempt_due`.
#[derive(Debug, Default)]
pub struct RecordingTimers {
    calls: Mutex<Vec<TimerCall>>,
}

impl RecordingTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TimerCall> {
        self.calls.lock().clone()
    }

    /// Drain recorded calls
    pub fn take(&self) -> Vec<TimerCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Tokens armed so far, in order
    pub fn armed(&self) -> Vec<(TimerToken, DateTime<Utc>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TimerCall::Arm { token, fire_at, .. } => Some((*token, *fire_at)),
                TimerCall::Cancel { .. } => None,
            })
            .collect()
    }

    pub fn cancelled(&self) -> Vec<TimerToken> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TimerCall::Cancel { token } => Some(*token),
                TimerCall::Arm { .. } => None,
            })
            .collect()
    }
}

impl TimerService for RecordingTimers {
    fn arm(
        &self,
        key: &ActivityKey,
        token: TimerToken,
        fire_at: DateTime<Utc>,
    ) -> Result<(), CollaboratorError> {
        self.calls.lock().push(TimerCall::Arm {
            key: key.clone(),
            token,
            fire_at,
        });
        Ok(())
    }

    fn cancel(&self, token: TimerToken) -> Result<(), CollaboratorError> {
        self.calls.lock().push(TimerCall::Cancel { token });
        Ok(())
    }
}

/// Dispatcher that only records tasks
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<DispatchTask>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<DispatchTask> {
        self.tasks.lock().clone()
    }

    pub fn take(&self) -> Vec<DispatchTask> {
        std::mem::take(&mut *self.tasks.lock())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn enqueue(&self, task: DispatchTask) -> Result<(), CollaboratorError> {
        self.tasks.lock().push(task);
        Ok(())
    }
}
