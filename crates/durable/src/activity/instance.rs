//! Activity instance data model

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reliability::{Deadlines, RetryPolicy, TimeoutConfig, TimeoutType};

/// Address of one activity within one workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityKey {
    pub workflow_id: Uuid,
    pub activity_id: String,
}

impl ActivityKey {
    pub fn new(workflow_id: Uuid, activity_id: impl Into<String>) -> Self {
        Self {
            workflow_id,
            activity_id: activity_id.into(),
        }
    }
}

impl std::fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.activity_id)
    }
}

/// Observable activity status
///
/// `Paused` is reported when the pause flag is set and no attempt is in
/// flight. A paused instance whose attempt is still running stays
/// `Started` with the flag recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Waiting for dispatch or for a backoff timer
    Scheduled,
    /// Dispatched, execution in flight
    Started,
    /// Scheduling suppressed until unpaused
    Paused,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl ActivityStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "scheduled" => Self::Scheduled,
            "started" => Self::Started,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "timed_out" => Self::TimedOut,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt failed, as reported by the executing worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub message: String,

    /// Application failure type, matched against the policy's non-retryable list
    #[serde(default)]
    pub error_type: Option<String>,

    /// Never retry this failure
    #[serde(default)]
    pub non_retryable: bool,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            non_retryable: false,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            non_retryable: true,
            ..Self::new(message)
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

impl std::fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_type {
            Some(t) => write!(f, "{t}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Opaque handle to an outstanding backoff timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerToken(pub Uuid);

impl TimerToken {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TimerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Options for activity execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    /// Retry policy (engine default when unset)
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Create the instance paused: no dispatch until unpaused
    #[serde(default)]
    pub start_paused: bool,
}

impl ActivityOptions {
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.schedule_to_close = Some(timeout);
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.start_to_close = Some(timeout);
        self
    }

    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }
}

/// Request to create and schedule a new activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleActivity {
    pub key: ActivityKey,

    /// Type of activity to execute (used by workers to pick a handler)
    pub activity_type: String,

    pub input: serde_json::Value,

    #[serde(default)]
    pub options: ActivityOptions,
}

impl ScheduleActivity {
    pub fn new(
        workflow_id: Uuid,
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            key: ActivityKey::new(workflow_id, activity_id),
            activity_type: activity_type.into(),
            input,
            options: ActivityOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ActivityOptions) -> Self {
        self.options = options;
        self
    }
}

/// One activity attempt-series belonging to one workflow execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityInstance {
    pub key: ActivityKey,
    pub activity_type: String,
    pub input: serde_json::Value,

    pub status: ActivityStatus,

    /// Attempts started since the last reset (1-based)
    pub attempt: u32,

    /// Bumped by every scheduling decision; dispatch tasks carry it so a
    /// task issued before a reset or unpause cannot start a second execution
    pub stamp: u32,

    /// Suppresses scheduling; independent of the scheduling sub-state
    pub paused: bool,

    pub retry_policy: RetryPolicy,
    pub timeouts: TimeoutConfig,
    pub deadlines: Deadlines,

    pub first_scheduled_at: DateTime<Utc>,
    pub last_started_at: Option<DateTime<Utc>>,

    /// When the current backoff interval elapses
    pub backoff_until: Option<DateTime<Utc>>,
    pub pending_timer: Option<TimerToken>,

    pub last_failure: Option<FailureDetail>,
    pub result: Option<serde_json::Value>,
    pub timeout_type: Option<TimeoutType>,

    pub updated_at: DateTime<Utc>,
}

impl ActivityInstance {
    /// Fresh instance for attempt 1, not yet dispatched
    pub fn new(request: ScheduleActivity, retry_policy: RetryPolicy, now: DateTime<Utc>) -> Self {
        let timeouts = request.options.timeouts;
        let paused = request.options.start_paused;
        Self {
            key: request.key,
            activity_type: request.activity_type,
            input: request.input,
            status: if paused {
                ActivityStatus::Paused
            } else {
                ActivityStatus::Scheduled
            },
            attempt: 1,
            stamp: 0,
            paused,
            retry_policy,
            deadlines: Deadlines {
                schedule_to_close: timeouts.schedule_to_close_deadline(now),
                start_to_close: None,
            },
            timeouts,
            first_scheduled_at: now,
            last_started_at: None,
            backoff_until: None,
            pending_timer: None,
            last_failure: None,
            result: None,
            timeout_type: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// An execution is logically running
    pub fn in_flight(&self) -> bool {
        self.status == ActivityStatus::Started
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            key: self.key.clone(),
            activity_type: self.activity_type.clone(),
            status: self.status,
            attempt: self.attempt,
            paused: self.paused,
            timer_pending: self.pending_timer.is_some(),
            next_attempt_at: self.backoff_until,
            last_failure: self.last_failure.clone(),
            result: self.result.clone(),
            timeout_type: self.timeout_type,
            updated_at: self.updated_at,
        }
    }
}

/// Observable view of an instance returned by every control operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivitySnapshot {
    pub key: ActivityKey,
    pub activity_type: String,
    pub status: ActivityStatus,
    pub attempt: u32,
    pub paused: bool,
    pub timer_pending: bool,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureDetail>,
    pub result: Option<serde_json::Value>,
    pub timeout_type: Option<TimeoutType>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_instance() {
        let now = Utc::now();
        let request = ScheduleActivity::new(
            Uuid::now_v7(),
            "step-1",
            "charge_card",
            serde_json::json!({}),
        )
        .with_options(
            ActivityOptions::default().with_schedule_to_close_timeout(Duration::from_secs(60)),
        );

        let instance = ActivityInstance::new(request, RetryPolicy::default(), now);
        assert_eq!(instance.status, ActivityStatus::Scheduled);
        assert_eq!(instance.attempt, 1);
        assert!(!instance.paused);
        assert_eq!(
            instance.deadlines.schedule_to_close,
            Some(now + chrono::Duration::seconds(60))
        );
    }

    #[test]
    fn test_start_paused() {
        let request = ScheduleActivity::new(Uuid::now_v7(), "a", "t", serde_json::json!(null))
            .with_options(ActivityOptions::default().paused());
        let instance = ActivityInstance::new(request, RetryPolicy::default(), Utc::now());
        assert_eq!(instance.status, ActivityStatus::Paused);
        assert!(instance.paused);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            ActivityStatus::Scheduled,
            ActivityStatus::Started,
            ActivityStatus::Paused,
            ActivityStatus::Completed,
            ActivityStatus::Failed,
            ActivityStatus::TimedOut,
            ActivityStatus::Cancelled,
        ] {
            assert_eq!(ActivityStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ActivityStatus::parse("running"), None);
    }

    #[test]
    fn test_failure_display() {
        let failure = FailureDetail::new("card declined").with_type("PAYMENT");
        assert_eq!(failure.to_string(), "PAYMENT: card declined");
    }
}
